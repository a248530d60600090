//! Result publication boundary.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::sensors::PointCloud;
use crate::tracking::{Candidate, Phase};

/// Receives everything the detection core publishes.
pub trait ResultSink: Send {
    /// Best candidate after a detection message or a refinement. The raw,
    /// filtered and compensated positions are all carried by `candidate`.
    fn publish_candidate(&mut self, candidate: &Candidate);

    /// Point-cloud subset that supported a refinement, global frame.
    fn publish_filtered_cloud(&mut self, cloud: &PointCloud);

    /// Back-projected depth crop of a target detection, depth frame.
    fn publish_depth_crop_cloud(&mut self, _cloud: &PointCloud) {}

    fn publish_phase(&mut self, _phase: Phase) {}
}

/// Everything published so far.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub candidates: Vec<Candidate>,
    pub filtered_clouds: Vec<PointCloud>,
    pub depth_crop_clouds: Vec<PointCloud>,
    pub phases: Vec<Phase>,
}

/// Sink that keeps every publication in memory.
///
/// Clones share the same recording, so one handle can be given to the
/// runtime and another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Recording {
        self.inner.lock().clone()
    }

    pub fn last_candidate(&self) -> Option<Candidate> {
        self.inner.lock().candidates.last().cloned()
    }
}

impl ResultSink for RecordingSink {
    fn publish_candidate(&mut self, candidate: &Candidate) {
        self.inner.lock().candidates.push(candidate.clone());
    }

    fn publish_filtered_cloud(&mut self, cloud: &PointCloud) {
        self.inner.lock().filtered_clouds.push(cloud.clone());
    }

    fn publish_depth_crop_cloud(&mut self, cloud: &PointCloud) {
        self.inner.lock().depth_crop_clouds.push(cloud.clone());
    }

    fn publish_phase(&mut self, phase: Phase) {
        self.inner.lock().phases.push(phase);
    }
}
