//! Candidate identifiers.

/// Unique identifier for a tracked Candidate.
///
/// CandidateIds are assigned sequentially starting at 1 and are never
/// reused within a run, even after a candidate is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub u64);

impl CandidateId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_id_display() {
        assert_eq!(format!("{}", CandidateId::new(7)), "C7");
    }

    #[test]
    fn test_candidate_id_ordering() {
        assert!(CandidateId::new(1) < CandidateId::new(2));
    }
}
