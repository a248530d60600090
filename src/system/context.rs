//! Mutable detection state threaded through every handler.

use crate::config::DepthtectionConfig;
use crate::sensors::{CameraModel, ColorImage, DepthImage, StampedPoint};
use crate::tracking::{Candidate, CandidateId, CandidateStore, Phase, PhaseMachine};

use super::sync::ExactTimeSynchronizer;

/// Phase, candidates and latest sensor data for one run.
///
/// Owned by a single handler thread; nothing in here is shared.
pub struct DetectionContext {
    pub phase: PhaseMachine,
    pub candidates: CandidateStore,
    pub best: Option<CandidateId>,

    /// Set by the first calibration message, never replaced.
    pub camera: Option<CameraModel>,

    pub color: Option<ColorImage>,
    pub depth: Option<DepthImage>,
    pub ground_truth: Option<StampedPoint>,
    pub synchronizer: ExactTimeSynchronizer,

    /// A cloud-path transform failure has already been reported.
    pub cloud_frame_error_logged: bool,
}

impl DetectionContext {
    pub fn new(config: &DepthtectionConfig) -> Self {
        Self {
            phase: PhaseMachine::new(config.initial_phase),
            candidates: CandidateStore::new(&config.tracking),
            best: None,
            camera: None,
            color: None,
            depth: None,
            ground_truth: None,
            synchronizer: ExactTimeSynchronizer::new(config.sync_queue_size),
            cloud_frame_error_logged: false,
        }
    }

    pub fn current_phase(&self) -> Phase {
        self.phase.phase()
    }

    pub fn best_candidate(&self) -> Option<&Candidate> {
        self.best.and_then(|id| self.candidates.get(id))
    }

    /// Re-run best-candidate selection.
    pub fn reselect_best(&mut self) -> Option<CandidateId> {
        self.best = self.candidates.select_best();
        self.best
    }
}
