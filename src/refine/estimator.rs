//! Estimators reducing the supporting points to one refined position.

use nalgebra::Vector3;
use serde::Deserialize;

use crate::geometry::elevation;

/// Reduces the points surviving the region-of-interest filter to a single
/// refined estimate. Returns `None` for an empty input.
pub trait RefinedPointEstimator: Send {
    fn estimate(&self, points: &[Vector3<f64>]) -> Option<Vector3<f64>>;
}

/// Point with the greatest elevation (global up axis).
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestPoint;

impl RefinedPointEstimator for HighestPoint {
    fn estimate(&self, points: &[Vector3<f64>]) -> Option<Vector3<f64>> {
        points
            .iter()
            .max_by(|a, b| elevation(a).total_cmp(&elevation(b)))
            .copied()
    }
}

/// Mean of all supporting points.
#[derive(Debug, Clone, Copy, Default)]
pub struct Centroid;

impl RefinedPointEstimator for Centroid {
    fn estimate(&self, points: &[Vector3<f64>]) -> Option<Vector3<f64>> {
        if points.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = points.iter().sum();
        Some(sum / points.len() as f64)
    }
}

/// Estimator named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    HighestPoint,
    Centroid,
}

impl EstimatorKind {
    pub fn build(self) -> Box<dyn RefinedPointEstimator> {
        match self {
            Self::HighestPoint => Box::new(HighestPoint),
            Self::Centroid => Box::new(Centroid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_highest_point() {
        let pts = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.1, 0.0, 1.4),
            Vector3::new(0.0, 0.2, 0.9),
        ];
        assert_relative_eq!(HighestPoint.estimate(&pts).unwrap(), Vector3::new(0.1, 0.0, 1.4));
    }

    #[test]
    fn test_centroid() {
        let pts = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 4.0, -2.0)];
        assert_relative_eq!(Centroid.estimate(&pts).unwrap(), Vector3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn test_empty_input() {
        assert!(HighestPoint.estimate(&[]).is_none());
        assert!(EstimatorKind::Centroid.build().estimate(&[]).is_none());
    }
}
