//! Point-cloud refinement of the best candidate.
//!
//! ```text
//! cloud (sensor) ──T_global_sensor──▶ cloud (global)
//!        │                                  │ keep |p - candidate| <= r
//!        │                                  ▼
//!        │                         support >= min_support ?
//!        │                                  │ estimator
//!        ▼                                  ▼
//! T_body_sensor ──▶ vehicle position ──▶ |vehicle - refined| < near radius ?
//! ```

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::{DepthtectionError, Result};
use crate::sensors::{Header, PointCloud, StampedPoint};
use crate::tracking::Candidate;
use crate::transform::TransformLookup;

use super::estimator::{EstimatorKind, RefinedPointEstimator};

/// Configuration for point-cloud refinement.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Points farther than this from the candidate are discarded (metres).
    pub inclusion_radius: f64,

    /// Minimum number of surviving points for a refinement to be accepted.
    pub min_support_points: usize,

    /// Vehicle closer than this to the refined candidate ends detection (metres).
    pub near_termination_radius: f64,

    pub estimator: EstimatorKind,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            inclusion_radius: 0.5,
            min_support_points: 20,
            near_termination_radius: 0.5,
            estimator: EstimatorKind::HighestPoint,
        }
    }
}

/// Result of one accepted refinement.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// New compensated position, stamped with the cloud time, global frame.
    pub point: StampedPoint,

    /// Points that survived the region-of-interest filter, global frame.
    pub filtered: PointCloud,

    /// Vehicle body origin in the global frame.
    pub vehicle_position: Vector3<f64>,

    /// Distance from the vehicle to the refined point.
    pub vehicle_distance: f64,

    /// Vehicle is within the near-termination radius.
    pub too_near: bool,
}

impl Refinement {
    pub fn support(&self) -> usize {
        self.filtered.len()
    }
}

/// Narrows a raw cloud to the region around the best candidate and derives
/// a refined position from it.
pub struct PointCloudRefiner {
    config: RefinerConfig,
    estimator: Box<dyn RefinedPointEstimator>,
}

impl PointCloudRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        let estimator = config.estimator.build();
        Self { config, estimator }
    }

    pub fn with_estimator(config: RefinerConfig, estimator: Box<dyn RefinedPointEstimator>) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refine `candidate` with `cloud`.
    ///
    /// On success the candidate's compensated point is overwritten. On any
    /// error the candidate is left untouched:
    /// - `FrameUnavailable` if either sensor transform cannot be resolved
    /// - `InsufficientSupport` if too few points lie near the candidate
    pub fn refine(
        &self,
        cloud: &PointCloud,
        candidate: &mut Candidate,
        tf: &dyn TransformLookup,
        global_frame: &str,
        base_frame: &str,
    ) -> Result<Refinement> {
        let sensor_frame = cloud.header.frame_id.as_str();
        let stamp_ns = cloud.header.stamp_ns;

        // Both transforms first so a failure leaves no partial state.
        let t_global_sensor = tf.lookup(global_frame, sensor_frame, stamp_ns)?;
        let t_body_sensor = tf.lookup(base_frame, sensor_frame, stamp_ns)?;

        let center = *candidate.position();
        let radius = self.config.inclusion_radius;
        let support: Vec<Vector3<f64>> = cloud
            .points
            .iter()
            .map(|p| t_global_sensor.transform_point(p))
            .filter(|p| p.iter().all(|c| c.is_finite()))
            .filter(|p| (p - center).norm() <= radius)
            .collect();

        if support.len() < self.config.min_support_points {
            return Err(DepthtectionError::InsufficientSupport {
                found: support.len(),
                required: self.config.min_support_points,
            });
        }
        let refined = self
            .estimator
            .estimate(&support)
            .ok_or(DepthtectionError::InsufficientSupport {
                found: 0,
                required: self.config.min_support_points,
            })?;

        let header = Header::new(stamp_ns, global_frame);
        let point = StampedPoint::new(header.clone(), refined);
        candidate.set_compensated(point.clone());

        let t_global_body = t_global_sensor.compose(&t_body_sensor.inverse());
        let vehicle_position = t_global_body.translation;
        let vehicle_distance = (vehicle_position - refined).norm();

        Ok(Refinement {
            point,
            filtered: PointCloud::new(header, support),
            vehicle_position,
            vehicle_distance,
            too_near: vehicle_distance < self.config.near_termination_radius,
        })
    }
}

impl Default for PointCloudRefiner {
    fn default() -> Self {
        Self::new(RefinerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::tracking::CandidateId;
    use crate::transform::TransformBuffer;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    const STAMP: u64 = 5_000_000_000;
    const LIDAR_HEIGHT: f64 = 0.25;

    fn candidate_at(p: Vector3<f64>) -> Candidate {
        let sp = StampedPoint::new(Header::new(1, "earth"), p);
        Candidate::new(CandidateId::new(1), 0.9, "person", sp, 0)
    }

    /// earth -> base_link at `vehicle`, lidar mounted above the body.
    fn tree(vehicle: Vector3<f64>) -> TransformBuffer {
        let mut buf = TransformBuffer::default();
        buf.set_static("earth", "base_link", SE3::from_translation(vehicle));
        buf.set_static("base_link", "lidar", SE3::from_translation(lidar_offset()));
        buf
    }

    fn lidar_offset() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, LIDAR_HEIGHT)
    }

    /// `n` points scattered within `spread` of `center`, in the lidar frame
    /// of a vehicle at `vehicle`.
    fn cluster(center: Vector3<f64>, vehicle: Vector3<f64>, n: usize, spread: f64) -> PointCloud {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let lidar_origin = vehicle + lidar_offset();
        let points = (0..n)
            .map(|_| {
                let offset = Vector3::new(
                    rng.gen_range(-spread..spread),
                    rng.gen_range(-spread..spread),
                    rng.gen_range(-spread..spread),
                );
                center + offset - lidar_origin
            })
            .collect();
        PointCloud::new(Header::new(STAMP, "lidar"), points)
    }

    #[test]
    fn test_refines_to_highest_supporting_point() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let vehicle = Vector3::zeros();
        let mut cloud = cluster(target, vehicle, 40, 0.2);
        // Highest in-radius point, plus one higher point outside the radius.
        cloud.points.push(target + Vector3::new(0.0, 0.0, 0.375) - lidar_offset());
        cloud.points.push(target + Vector3::new(0.0, 0.0, 2.0) - lidar_offset());

        let mut c = candidate_at(target);
        let r = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(vehicle), "earth", "base_link")
            .unwrap();

        assert_relative_eq!(r.point.point, Vector3::new(5.0, 0.0, 1.375), epsilon = 1e-9);
        assert_eq!(c.compensated_point, r.point);
        assert_eq!(c.compensated_point.header, Header::new(STAMP, "earth"));
        assert_eq!(r.support(), 41);
        assert_eq!(r.filtered.header.frame_id, "earth");
        assert!(!r.too_near);
        assert_relative_eq!(r.vehicle_position, vehicle, epsilon = 1e-9);
    }

    #[test]
    fn test_nineteen_points_leave_candidate_unchanged() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let cloud = cluster(target, Vector3::zeros(), 19, 0.2);
        let mut c = candidate_at(target);
        let before = c.clone();

        let err = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(Vector3::zeros()), "earth", "base_link")
            .unwrap_err();

        assert_eq!(err, DepthtectionError::InsufficientSupport { found: 19, required: 20 });
        assert_eq!(c, before);
    }

    #[test]
    fn test_inclusion_radius_is_inclusive() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let vehicle = Vector3::zeros();
        let lidar = lidar_offset();
        // Exactly on the sphere, all 20 count.
        let points = (0..20)
            .map(|_| target + Vector3::new(0.0, 0.0, 0.5) - lidar)
            .collect();
        let cloud = PointCloud::new(Header::new(STAMP, "lidar"), points);
        let mut c = candidate_at(target);

        let r = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(vehicle), "earth", "base_link")
            .unwrap();
        assert_eq!(r.support(), 20);
    }

    #[test]
    fn test_non_finite_points_are_dropped() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let mut cloud = cluster(target, Vector3::zeros(), 19, 0.2);
        cloud.points.push(Vector3::new(f64::NAN, 0.0, 0.0));
        cloud.points.push(Vector3::new(f64::INFINITY, 0.0, 0.0));
        let mut c = candidate_at(target);

        let err = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(Vector3::zeros()), "earth", "base_link")
            .unwrap_err();
        assert!(matches!(err, DepthtectionError::InsufficientSupport { found: 19, .. }));
    }

    #[test]
    fn test_vehicle_close_to_target_is_too_near() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let vehicle = Vector3::new(4.8, 0.0, 1.0);
        let cloud = cluster(target, vehicle, 30, 0.1);
        let mut c = candidate_at(target);

        let r = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(vehicle), "earth", "base_link")
            .unwrap();

        assert!(r.too_near);
        assert!(r.vehicle_distance < 0.5);
    }

    #[test]
    fn test_missing_transform_leaves_candidate_unchanged() {
        let target = Vector3::new(5.0, 0.0, 1.0);
        let mut cloud = cluster(target, Vector3::zeros(), 30, 0.1);
        cloud.header.frame_id = "radar".to_string();
        let mut c = candidate_at(target);
        let before = c.clone();

        let err = PointCloudRefiner::default()
            .refine(&cloud, &mut c, &tree(Vector3::zeros()), "earth", "base_link")
            .unwrap_err();

        assert!(matches!(err, DepthtectionError::FrameUnavailable { .. }));
        assert_eq!(c, before);
    }

    #[test]
    fn test_centroid_estimator() {
        let target = Vector3::new(2.0, 1.0, 0.0);
        let vehicle = Vector3::zeros();
        let lidar = lidar_offset();
        let points = (0..20)
            .map(|i| {
                let dz = if i % 2 == 0 { 0.1 } else { -0.1 };
                target + Vector3::new(0.0, 0.0, dz) - lidar
            })
            .collect();
        let cloud = PointCloud::new(Header::new(STAMP, "lidar"), points);
        let mut c = candidate_at(target);
        let refiner = PointCloudRefiner::new(RefinerConfig {
            estimator: EstimatorKind::Centroid,
            ..Default::default()
        });

        let r = refiner.refine(&cloud, &mut c, &tree(vehicle), "earth", "base_link").unwrap();
        assert_relative_eq!(r.point.point, target, epsilon = 1e-9);
    }
}
