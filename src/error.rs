//! Error types for the detection core.
//!
//! Every error here is per-message: handlers report it and drop the message.
//! None of them is fatal to the process.

use thiserror::Error;

/// Errors produced while handling a single inbound message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DepthtectionError {
    /// No camera calibration has been received yet.
    #[error("no camera calibration available")]
    NoCalibration,

    /// The named image stream has not delivered a frame yet.
    #[error("no {0} image available")]
    NoImage(&'static str),

    /// Pixel lies outside the depth image.
    #[error("pixel ({u}, {v}) outside {width}x{height} depth image")]
    OutOfBounds {
        u: i64,
        v: i64,
        width: usize,
        height: usize,
    },

    /// Depth sample at the pixel is zero or non-finite.
    #[error("no depth measurement at pixel ({u}, {v})")]
    NoDepth { u: i64, v: i64 },

    /// No transform path between two frames at the requested time.
    #[error("could not transform `{from}` to `{to}` at {stamp_ns} ns: {reason}")]
    FrameUnavailable {
        from: String,
        to: String,
        stamp_ns: u64,
        reason: String,
    },

    /// Too few cloud points survived the region-of-interest filter.
    #[error("only {found} points near the candidate, need {required}")]
    InsufficientSupport { found: usize, required: usize },

    /// Refinement requested but no candidate is selected.
    #[error("no best candidate selected")]
    NoBestCandidate,

    /// Image buffer does not match its declared dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Phase command that names no known phase.
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),

    /// Transition requested out of the terminal phase.
    #[error("phase is terminal, ignoring request for {0}")]
    TerminalPhase(String),

    /// The runtime worker is gone.
    #[error("message queue closed")]
    QueueClosed,

    /// The runtime worker panicked before draining its queue.
    #[error("detection worker panicked: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, DepthtectionError>;
