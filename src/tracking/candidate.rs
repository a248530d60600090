//! Candidate - a tracked hypothesis for the target's location.

use nalgebra::Vector3;

use crate::sensors::StampedPoint;

use super::types::CandidateId;

/// A tracked 3D hypothesis for the target.
///
/// All positional fields are expressed in the global frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: CandidateId,

    /// Running average of observation scores, in [0, 1].
    pub confidence: f64,

    pub class_label: String,

    /// Latest unfiltered observation.
    pub raw_point: StampedPoint,

    /// Observation after noise/bias correction. No correction stage exists
    /// yet, so this mirrors `raw_point`.
    pub filtered_point: StampedPoint,

    /// Position after point-cloud refinement; reset to the observation on
    /// every visual update. This is the candidate's current position.
    pub compensated_point: StampedPoint,

    /// Detection cycle in which the candidate was last observed.
    pub last_seen_cycle: u64,

    /// Number of visual observations merged into this candidate.
    pub observations: u32,
}

impl Candidate {
    pub fn new(
        id: CandidateId,
        confidence: f64,
        class_label: impl Into<String>,
        point: StampedPoint,
        cycle: u64,
    ) -> Self {
        Self {
            id,
            confidence,
            class_label: class_label.into(),
            raw_point: point.clone(),
            filtered_point: point.clone(),
            compensated_point: point,
            last_seen_cycle: cycle,
            observations: 1,
        }
    }

    /// Current best position estimate.
    #[inline]
    pub fn position(&self) -> &Vector3<f64> {
        &self.compensated_point.point
    }

    pub fn distance_to(&self, p: &Vector3<f64>) -> f64 {
        (self.position() - p).norm()
    }

    /// Merge a new visual observation.
    pub fn observe(&mut self, score: f64, point: StampedPoint, cycle: u64) {
        self.confidence = (self.confidence + score) / 2.0;
        self.raw_point = point.clone();
        self.filtered_point = point.clone();
        self.compensated_point = point;
        self.last_seen_cycle = cycle;
        self.observations += 1;
    }

    /// Overwrite the refined position.
    pub fn set_compensated(&mut self, point: StampedPoint) {
        self.compensated_point = point;
    }
}
