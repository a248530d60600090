//! Candidate tracking: association of 3D observations, best-candidate
//! selection and the detection phase machine.

pub mod candidate;
pub mod selection;
pub mod state;
pub mod store;
pub mod types;

pub use candidate::Candidate;
pub use selection::{HighestConfidence, MostRecentlyCreated, SelectionPolicy, SelectionPolicyKind};
pub use state::{Phase, PhaseMachine};
pub use store::{CandidateStore, MatchKind, TrackingConfig};
pub use types::CandidateId;
