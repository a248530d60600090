//! Candidate store and nearest-match association.

use serde::Deserialize;
use tracing::info;

use crate::sensors::StampedPoint;

use super::candidate::Candidate;
use super::selection::{SelectionPolicy, SelectionPolicyKind};
use super::types::CandidateId;

/// Configuration for candidate tracking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Policy choosing the best candidate.
    pub selection_policy: SelectionPolicyKind,

    /// Evict candidates not observed for more than this many detection
    /// cycles. `None` keeps every candidate for the whole run.
    pub max_unseen_cycles: Option<u64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            selection_policy: SelectionPolicyKind::HighestConfidence,
            max_unseen_cycles: None,
        }
    }
}

/// Whether an observation updated an existing candidate or created one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Updated,
    Created,
}

/// All candidates tracked during the run.
pub struct CandidateStore {
    candidates: Vec<Candidate>,
    next_id: u64,
    cycle: u64,
    max_unseen_cycles: Option<u64>,
    policy: Box<dyn SelectionPolicy>,
}

impl CandidateStore {
    pub fn new(config: &TrackingConfig) -> Self {
        Self::with_policy(config.selection_policy.build(), config.max_unseen_cycles)
    }

    pub fn with_policy(policy: Box<dyn SelectionPolicy>, max_unseen_cycles: Option<u64>) -> Self {
        Self {
            candidates: Vec::new(),
            next_id: 1,
            cycle: 0,
            max_unseen_cycles,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn get(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CandidateId) -> Option<&mut Candidate> {
        self.candidates.iter_mut().find(|c| c.id == id)
    }

    /// Current detection cycle.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Start a new detection cycle and evict stale candidates.
    ///
    /// Returns the ids evicted by this call.
    pub fn begin_cycle(&mut self) -> Vec<CandidateId> {
        self.cycle += 1;
        let Some(max_unseen) = self.max_unseen_cycles else {
            return Vec::new();
        };

        let cycle = self.cycle;
        let mut evicted = Vec::new();
        self.candidates.retain(|c| {
            let stale = cycle.saturating_sub(c.last_seen_cycle) > max_unseen;
            if stale {
                evicted.push(c.id);
            }
            !stale
        });
        for id in &evicted {
            info!("Evicted candidate {} after {} unseen cycles", id, max_unseen);
        }
        evicted
    }

    /// Nearest same-class candidate strictly closer than `threshold`.
    pub fn find_match(&self, class_label: &str, point: &StampedPoint, threshold: f64) -> Option<CandidateId> {
        self.find_match_index(class_label, point, threshold)
            .map(|idx| self.candidates[idx].id)
    }

    fn find_match_index(&self, class_label: &str, point: &StampedPoint, threshold: f64) -> Option<usize> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.class_label == class_label)
            .map(|(idx, c)| (idx, c.distance_to(&point.point)))
            .filter(|(_, d)| *d < threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    /// Merge the observation into the nearest matching candidate, or create
    /// a new one. Never fails.
    pub fn match_or_create(
        &mut self,
        class_label: &str,
        score: f64,
        point: StampedPoint,
        threshold: f64,
    ) -> (MatchKind, &Candidate) {
        let cycle = self.cycle;

        if let Some(idx) = self.find_match_index(class_label, &point, threshold) {
            let candidate = &mut self.candidates[idx];
            candidate.observe(score, point, cycle);
            info!(
                "Update candidate {} ({}) confidence {:.3} at [{:.3}, {:.3}, {:.3}]",
                candidate.id,
                candidate.class_label,
                candidate.confidence,
                candidate.raw_point.point.x,
                candidate.raw_point.point.y,
                candidate.raw_point.point.z
            );
            return (MatchKind::Updated, &self.candidates[idx]);
        }

        let id = CandidateId::new(self.next_id);
        self.next_id += 1;
        let candidate = Candidate::new(id, score, class_label, point, cycle);
        info!(
            "New candidate {} ({}) confidence {:.3} at [{:.3}, {:.3}, {:.3}]",
            candidate.id,
            candidate.class_label,
            candidate.confidence,
            candidate.raw_point.point.x,
            candidate.raw_point.point.y,
            candidate.raw_point.point.z
        );
        self.candidates.push(candidate);
        (MatchKind::Created, &self.candidates[self.candidates.len() - 1])
    }

    /// Best candidate under the configured policy.
    pub fn select_best(&self) -> Option<CandidateId> {
        self.policy.select(&self.candidates).map(|c| c.id)
    }
}
