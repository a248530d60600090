//! Best-candidate selection policies.
//!
//! Every policy is deterministic; ties break by lowest id.

use serde::Deserialize;

use super::candidate::Candidate;

/// Picks the candidate handed to refinement and publication.
pub trait SelectionPolicy: Send {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// Highest confidence wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestConfidence;

impl SelectionPolicy for HighestConfidence {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.iter().fold(None, |best: Option<&Candidate>, c| match best {
            Some(b) if b.confidence > c.confidence => Some(b),
            Some(b) if b.confidence == c.confidence && b.id < c.id => Some(b),
            _ => Some(c),
        })
    }
}

/// Most recently created candidate (highest id) wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostRecentlyCreated;

impl SelectionPolicy for MostRecentlyCreated {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.iter().max_by_key(|c| c.id)
    }
}

/// Policy named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicyKind {
    #[default]
    HighestConfidence,
    MostRecentlyCreated,
}

impl SelectionPolicyKind {
    pub fn build(self) -> Box<dyn SelectionPolicy> {
        match self {
            Self::HighestConfidence => Box::new(HighestConfidence),
            Self::MostRecentlyCreated => Box::new(MostRecentlyCreated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Header, StampedPoint};
    use crate::tracking::CandidateId;
    use nalgebra::Vector3;

    fn candidate(id: u64, confidence: f64) -> Candidate {
        let p = StampedPoint::new(Header::new(0, "earth"), Vector3::new(id as f64, 0.0, 0.0));
        Candidate::new(CandidateId::new(id), confidence, "person", p, 0)
    }

    #[test]
    fn test_highest_confidence() {
        let cs = vec![candidate(1, 0.4), candidate(2, 0.9), candidate(3, 0.6)];
        assert_eq!(HighestConfidence.select(&cs).unwrap().id, CandidateId::new(2));
    }

    #[test]
    fn test_confidence_tie_breaks_by_lowest_id() {
        let cs = vec![candidate(3, 0.8), candidate(1, 0.8), candidate(2, 0.5)];
        assert_eq!(HighestConfidence.select(&cs).unwrap().id, CandidateId::new(1));
    }

    #[test]
    fn test_most_recently_created() {
        let cs = vec![candidate(1, 0.9), candidate(4, 0.1), candidate(2, 0.5)];
        assert_eq!(MostRecentlyCreated.select(&cs).unwrap().id, CandidateId::new(4));
    }

    #[test]
    fn test_empty_store_selects_nothing() {
        assert!(SelectionPolicyKind::default().build().select(&[]).is_none());
    }
}
