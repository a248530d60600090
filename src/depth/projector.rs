//! Per-detection depth back-projection.
//!
//! ```text
//! x = (u - cx) * d / fx
//! y = (v - cy) * d / fy
//! z = d
//! ```
//!
//! Distortion is not corrected on this path; only the bulk
//! depth-crop cloud undistorts pixels.

use nalgebra::Vector3;

use crate::error::{DepthtectionError, Result};
use crate::sensors::{BoundingBox2D, CameraModel, DepthImage};

/// Point returned when the depth sample carries no measurement.
pub const NO_MEASUREMENT: Vector3<f64> = Vector3::new(0.0, 0.0, 0.0);

/// True if `point` is the no-measurement sentinel.
#[inline]
pub fn is_no_measurement(point: &Vector3<f64>) -> bool {
    *point == NO_MEASUREMENT
}

/// True if a raw depth sample is usable.
///
/// Zero and +inf are the sensor's "no return" encodings; NaN and -inf are
/// rejected as well.
#[inline]
pub fn is_valid_depth(depth: f32) -> bool {
    depth != 0.0 && depth.is_finite()
}

/// Back-project pixel (u, v) with an explicit depth value.
#[inline]
pub fn backproject(camera: &CameraModel, u: f64, v: f64, depth: f64) -> Vector3<f64> {
    Vector3::new(
        (u - camera.cx) * depth / camera.fx,
        (v - camera.cy) * depth / camera.fy,
        depth,
    )
}

/// Pixel the detection is sampled at: the box center, rounded.
///
/// A non-finite center is `OutOfBounds` for `depth`.
pub fn detection_pixel(bbox: &BoundingBox2D, depth: &DepthImage) -> Result<(i64, i64)> {
    let (u, v) = (bbox.center_x.round() as i64, bbox.center_y.round() as i64);
    if !bbox.center_x.is_finite() || !bbox.center_y.is_finite() {
        return Err(DepthtectionError::OutOfBounds {
            u,
            v,
            width: depth.width,
            height: depth.height,
        });
    }
    Ok((u, v))
}

/// 3D point in the depth sensor's optical frame for pixel (u, v).
///
/// Fails with `OutOfBounds` outside the image. Returns [`NO_MEASUREMENT`]
/// when the sample is zero or non-finite; the caller must discard it.
pub fn point_from_depth(
    depth: &DepthImage,
    u: i64,
    v: i64,
    camera: &CameraModel,
) -> Result<Vector3<f64>> {
    let d = depth.at(u, v)?;
    if !is_valid_depth(d) {
        return Ok(NO_MEASUREMENT);
    }
    Ok(backproject(camera, u as f64, v as f64, d as f64))
}
