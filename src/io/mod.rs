//! Offline input: recorded sessions for replay.

pub mod session;

pub use session::{FileEntry, ReplaySession, SessionEvent};
