//! Frame transform adapter.
//!
//! [`TransformLookup`] is the contract the detection core needs from a
//! frame-transform service: resolve `T_target_source` at a timestamp, or
//! fail with `FrameUnavailable`. Lookups never block.

pub mod buffer;

use nalgebra::Vector3;

use crate::error::Result;
use crate::geometry::SE3;
use crate::sensors::{Header, PointCloud, StampedPoint};

pub use buffer::{TransformBuffer, TransformBufferConfig};

/// Timestamp meaning "latest available transform".
pub const LATEST: u64 = 0;

/// Resolves rigid transforms between named frames.
pub trait TransformLookup {
    /// `T_target_source` at `stamp_ns` ([`LATEST`] for most recent).
    fn lookup(&self, target: &str, source: &str, stamp_ns: u64) -> Result<SE3>;

    /// Express `point` (given in its header frame) in `target`.
    fn transform_point(&self, point: &StampedPoint, target: &str) -> Result<StampedPoint> {
        let t = self.lookup(target, &point.header.frame_id, point.header.stamp_ns)?;
        Ok(StampedPoint::new(
            Header::new(point.header.stamp_ns, target),
            t.transform_point(&point.point),
        ))
    }

    /// Express every point of `cloud` in `target`.
    fn transform_cloud(&self, cloud: &PointCloud, target: &str) -> Result<PointCloud> {
        let t = self.lookup(target, &cloud.header.frame_id, cloud.header.stamp_ns)?;
        let points: Vec<Vector3<f64>> = cloud.points.iter().map(|p| t.transform_point(p)).collect();
        Ok(PointCloud::new(
            Header::new(cloud.header.stamp_ns, target),
            points,
        ))
    }
}

impl<T: TransformLookup + ?Sized> TransformLookup for &T {
    fn lookup(&self, target: &str, source: &str, stamp_ns: u64) -> Result<SE3> {
        (**self).lookup(target, source, stamp_ns)
    }
}
