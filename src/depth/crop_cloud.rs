//! Bulk point cloud from the depth pixels under a detection box.
//!
//! Unlike the per-detection projector, every pixel is undistorted before
//! back-projection.

use nalgebra::Vector3;

use crate::sensors::{BoundingBox2D, CameraModel, DepthImage, PointCloud};

use super::projector::is_valid_depth;

/// Integer pixel window, half-open on the right/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub u0: usize,
    pub v0: usize,
    pub u1: usize,
    pub v1: usize,
}

impl PixelRect {
    /// Window covered by `bbox`, clipped to a `width` x `height` image.
    pub fn from_bbox(bbox: &BoundingBox2D, width: usize, height: usize) -> Self {
        let clip = |x: f64, max: usize| x.max(0.0).min(max as f64) as usize;
        Self {
            u0: clip((bbox.center_x - bbox.size_x / 2.0).floor(), width),
            v0: clip((bbox.center_y - bbox.size_y / 2.0).floor(), height),
            u1: clip((bbox.center_x + bbox.size_x / 2.0).ceil(), width),
            v1: clip((bbox.center_y + bbox.size_y / 2.0).ceil(), height),
        }
    }

    pub fn area(&self) -> usize {
        self.u1.saturating_sub(self.u0) * self.v1.saturating_sub(self.v0)
    }
}

/// Back-project every measured pixel inside `roi`.
///
/// The cloud keeps the depth image's header.
pub fn cloud_from_depth_region(
    depth: &DepthImage,
    camera: &CameraModel,
    roi: PixelRect,
) -> PointCloud {
    let mut points = Vec::with_capacity(roi.area());
    for v in roi.v0..roi.v1.min(depth.height) {
        let row = &depth.data[v * depth.width..(v + 1) * depth.width];
        for u in roi.u0..roi.u1.min(depth.width) {
            let d = row[u];
            if !is_valid_depth(d) {
                continue;
            }
            let n = camera
                .distortion
                .undistort(&camera.normalize(u as f64, v as f64));
            let d = d as f64;
            points.push(Vector3::new(n.x * d, n.y * d, d));
        }
    }
    PointCloud::new(depth.header.clone(), points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Distortion, Header};
    use approx::assert_relative_eq;

    fn depth_with_hole() -> DepthImage {
        let mut data = vec![1.5f32; 8 * 6];
        data[2 * 8 + 3] = 0.0;
        data[2 * 8 + 4] = f32::INFINITY;
        DepthImage::new(Header::new(7, "camera_optical"), 8, 6, data).unwrap()
    }

    #[test]
    fn test_roi_is_clipped_to_image() {
        let bbox = BoundingBox2D {
            center_x: 1.0,
            center_y: 5.0,
            size_x: 6.0,
            size_y: 4.0,
        };
        let roi = PixelRect::from_bbox(&bbox, 8, 6);
        assert_eq!(roi, PixelRect { u0: 0, v0: 3, u1: 4, v1: 6 });
    }

    #[test]
    fn test_skips_missing_depth() {
        let cam = CameraModel::new(4.0, 4.0, 4.0, 3.0, 8, 6);
        let roi = PixelRect { u0: 2, v0: 1, u1: 6, v1: 4 };
        let cloud = cloud_from_depth_region(&depth_with_hole(), &cam, roi);

        assert_eq!(cloud.len(), roi.area() - 2);
        assert_eq!(cloud.header.stamp_ns, 7);
        assert!(cloud.points.iter().all(|p| p.z == 1.5));
    }

    #[test]
    fn test_undistorts_pixels() {
        let d = Distortion::from_coefficients(&[0.2, 0.0, 0.0, 0.0, 0.0]);
        let cam = CameraModel::new(4.0, 4.0, 4.0, 3.0, 8, 6).with_distortion(d);
        let roi = PixelRect { u0: 7, v0: 3, u1: 8, v1: 4 };
        let cloud = cloud_from_depth_region(&depth_with_hole(), &cam, roi);

        // Positive k1 pushes pixels outwards, so undistortion pulls them in.
        let raw_x = (7.0 - 4.0) / 4.0 * 1.5;
        assert_eq!(cloud.len(), 1);
        assert!(cloud.points[0].x < raw_x);
        assert_relative_eq!(cloud.points[0].y, 0.0, epsilon = 1e-12);
    }
}
