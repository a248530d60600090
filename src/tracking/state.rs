//! Detection phase state machine.
//!
//! ```text
//! NoDetection ─▶ VisualDetectionWithoutDepth ─▶ VisualDetectionWithDepth
//!                                                        │ (external command)
//!                                                        ▼
//!                                              OnlyDepthDetection ─▶ TooNearToDetect
//! ```
//!
//! `TooNearToDetect` is terminal.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{DepthtectionError, Result};

/// Which detection modality is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No target observed yet.
    NoDetection,
    /// A 2D detection exists but no usable depth sample.
    VisualDetectionWithoutDepth,
    /// A 2D detection with a valid depth-derived 3D point exists.
    VisualDetectionWithDepth,
    /// Vision no longer relied upon; point-cloud refinement is authoritative.
    OnlyDepthDetection,
    /// Vehicle is too close to the target to keep detecting.
    TooNearToDetect,
}

impl Default for Phase {
    fn default() -> Self {
        Self::NoDetection
    }
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::NoDetection,
        Phase::VisualDetectionWithoutDepth,
        Phase::VisualDetectionWithDepth,
        Phase::OnlyDepthDetection,
        Phase::TooNearToDetect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NoDetection => "NO_DETECTION",
            Phase::VisualDetectionWithoutDepth => "VISUAL_DETECTION_WITHOUT_DEPTH",
            Phase::VisualDetectionWithDepth => "VISUAL_DETECTION_WITH_DEPTH",
            Phase::OnlyDepthDetection => "ONLY_DEPTH_DETECTION",
            Phase::TooNearToDetect => "TOO_NEAR_TO_DETECT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::TooNearToDetect)
    }

    /// Detection messages are processed in this phase.
    pub fn accepts_detections(&self) -> bool {
        matches!(
            self,
            Phase::NoDetection | Phase::VisualDetectionWithoutDepth | Phase::VisualDetectionWithDepth
        )
    }

    /// Point clouds are processed in this phase.
    pub fn accepts_point_clouds(&self) -> bool {
        *self == Phase::OnlyDepthDetection
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = DepthtectionError;

    /// Accepts `ONLY_DEPTH_DETECTION`, `OnlyDepthDetection` or any casing.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().replace('_', "").to_ascii_lowercase() == key)
            .ok_or_else(|| DepthtectionError::UnknownPhase(s.to_string()))
    }
}

/// Holds the single active phase and enforces its transition rules.
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    phase: Phase,
}

impl PhaseMachine {
    pub fn new(initial: Phase) -> Self {
        Self { phase: initial }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance after a visual observation. Never downgrades.
    ///
    /// Returns the new phase if it changed.
    pub fn on_visual_detection(&mut self, has_depth: bool) -> Option<Phase> {
        let next = match (self.phase, has_depth) {
            (Phase::NoDetection, false) => Phase::VisualDetectionWithoutDepth,
            (Phase::NoDetection | Phase::VisualDetectionWithoutDepth, true) => {
                Phase::VisualDetectionWithDepth
            }
            _ => return None,
        };
        self.phase = next;
        Some(next)
    }

    /// Externally requested transition.
    ///
    /// Any phase may be requested except that nothing leaves the terminal
    /// phase. Returns true if the phase changed.
    pub fn request(&mut self, target: Phase) -> Result<bool> {
        if self.phase.is_terminal() {
            if target.is_terminal() {
                return Ok(false);
            }
            return Err(DepthtectionError::TerminalPhase(target.to_string()));
        }
        let changed = self.phase != target;
        self.phase = target;
        Ok(changed)
    }

    /// Enter the terminal phase. Returns true only on the first call.
    pub fn mark_too_near(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = Phase::TooNearToDetect;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        assert_eq!(PhaseMachine::default().phase(), Phase::NoDetection);
    }

    #[test]
    fn test_visual_progression_never_downgrades() {
        let mut m = PhaseMachine::default();
        assert_eq!(m.on_visual_detection(false), Some(Phase::VisualDetectionWithoutDepth));
        assert_eq!(m.on_visual_detection(false), None);
        assert_eq!(m.on_visual_detection(true), Some(Phase::VisualDetectionWithDepth));
        assert_eq!(m.on_visual_detection(false), None);
        assert_eq!(m.phase(), Phase::VisualDetectionWithDepth);
    }

    #[test]
    fn test_visual_detection_ignored_after_handover() {
        let mut m = PhaseMachine::new(Phase::OnlyDepthDetection);
        assert_eq!(m.on_visual_detection(true), None);
        assert_eq!(m.phase(), Phase::OnlyDepthDetection);
    }

    #[test]
    fn test_too_near_is_entered_once() {
        let mut m = PhaseMachine::new(Phase::OnlyDepthDetection);
        assert!(m.mark_too_near());
        assert!(!m.mark_too_near());
        assert_eq!(m.phase(), Phase::TooNearToDetect);
    }

    #[test]
    fn test_terminal_rejects_requests() {
        let mut m = PhaseMachine::new(Phase::TooNearToDetect);
        assert!(matches!(
            m.request(Phase::OnlyDepthDetection),
            Err(DepthtectionError::TerminalPhase(_))
        ));
        assert_eq!(m.request(Phase::TooNearToDetect), Ok(false));
        assert_eq!(m.phase(), Phase::TooNearToDetect);
    }

    #[test]
    fn test_request_handover() {
        let mut m = PhaseMachine::new(Phase::VisualDetectionWithDepth);
        assert_eq!(m.request(Phase::OnlyDepthDetection), Ok(true));
        assert_eq!(m.request(Phase::OnlyDepthDetection), Ok(false));
    }

    #[test]
    fn test_gating() {
        for p in Phase::ALL {
            assert_eq!(p.accepts_point_clouds(), p == Phase::OnlyDepthDetection);
        }
        assert!(!Phase::TooNearToDetect.accepts_detections());
        assert!(!Phase::OnlyDepthDetection.accepts_detections());
        assert!(Phase::NoDetection.accepts_detections());
    }

    #[test]
    fn test_parse_phase() {
        assert_eq!("ONLY_DEPTH_DETECTION".parse::<Phase>(), Ok(Phase::OnlyDepthDetection));
        assert_eq!("OnlyDepthDetection".parse::<Phase>(), Ok(Phase::OnlyDepthDetection));
        assert_eq!(" too_near_to_detect ".parse::<Phase>(), Ok(Phase::TooNearToDetect));
        assert!(matches!(
            "HOVER".parse::<Phase>(),
            Err(DepthtectionError::UnknownPhase(_))
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        for p in Phase::ALL {
            assert_eq!(p.to_string().parse::<Phase>(), Ok(p));
        }
    }
}
