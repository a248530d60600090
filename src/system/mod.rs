//! Detection runtime: handlers, their context, the result boundary and the
//! threaded system that serializes everything through one queue.

pub mod context;
pub mod messages;
pub mod node;
pub mod runtime;
pub mod shared_state;
pub mod sink;
pub mod sync;

pub use context::DetectionContext;
pub use messages::InboundMsg;
pub use node::Depthtection;
pub use runtime::DepthtectionSystem;
pub use shared_state::{SharedState, Snapshot};
pub use sink::{Recording, RecordingSink, ResultSink};
pub use sync::{ExactTimeSynchronizer, SyncedInputs};
