//! In-memory records delivered by the sensor, calibration, detection and
//! transform sources.

use nalgebra::Vector3;

use crate::error::{DepthtectionError, Result};
use crate::geometry::SE3;

/// Capture timestamp and frame of a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// Timestamp in nanoseconds.
    pub stamp_ns: u64,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp_ns: u64, frame_id: impl Into<String>) -> Self {
        Self {
            stamp_ns,
            frame_id: frame_id.into(),
        }
    }
}

/// A 3D point tagged with the time and frame it is expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedPoint {
    pub header: Header,
    pub point: Vector3<f64>,
}

impl StampedPoint {
    pub fn new(header: Header, point: Vector3<f64>) -> Self {
        Self { header, point }
    }
}

/// Single-channel floating point depth image, row-major, metres.
#[derive(Debug, Clone)]
pub struct DepthImage {
    pub header: Header,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthImage {
    pub fn new(header: Header, width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(DepthtectionError::InvalidImage(format!(
                "depth buffer has {} samples, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            header,
            width,
            height,
            data,
        })
    }

    /// Depth sample at pixel (u, v), bounds-checked.
    pub fn at(&self, u: i64, v: i64) -> Result<f32> {
        if u < 0 || v < 0 || u as usize >= self.width || v as usize >= self.height {
            return Err(DepthtectionError::OutOfBounds {
                u,
                v,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.data[v as usize * self.width + u as usize])
    }
}

/// Decoded 8-bit RGB color image.
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub header: Header,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl ColorImage {
    pub fn new(header: Header, width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != width * height * 3 {
            return Err(DepthtectionError::InvalidImage(format!(
                "rgb buffer has {} bytes, expected {}x{}x3",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            header,
            width,
            height,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Intrinsic calibration as delivered by the calibration source.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    /// Row-major 3x3 intrinsic matrix.
    pub k: [f64; 9],
    /// Distortion coefficients, plumb-bob order (k1, k2, p1, p2, k3).
    pub d: Vec<f64>,
}

/// Axis-aligned 2D box in pixels, given by its center and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox2D {
    pub center_x: f64,
    pub center_y: f64,
    pub size_x: f64,
    pub size_y: f64,
}

/// Class hypothesis attached to a detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHypothesis {
    pub class_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection2D {
    pub id: String,
    pub bbox: BoundingBox2D,
    /// Hypotheses ordered by the detector; only the first is used.
    pub results: Vec<ObjectHypothesis>,
}

impl Detection2D {
    pub fn top_hypothesis(&self) -> Option<&ObjectHypothesis> {
        self.results.first()
    }
}

/// All detections computed on one image.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionArray {
    pub header: Header,
    pub detections: Vec<Detection2D>,
}

/// Unordered 3D point set.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub header: Header,
    pub points: Vec<Vector3<f64>>,
}

impl PointCloud {
    pub fn new(header: Header, points: Vec<Vector3<f64>>) -> Self {
        Self { header, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Transform `T_parent_child` valid at `stamp_ns`.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedTransform {
    pub stamp_ns: u64,
    pub parent: String,
    pub child: String,
    pub transform: SE3,
    /// Static links are valid at every timestamp.
    pub is_static: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_image_rejects_wrong_size() {
        let err = DepthImage::new(Header::default(), 4, 3, vec![0.0; 11]).unwrap_err();
        assert!(matches!(err, DepthtectionError::InvalidImage(_)));
    }

    #[test]
    fn test_depth_image_at_is_row_major() {
        let data: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let img = DepthImage::new(Header::default(), 4, 3, data).unwrap();

        assert_eq!(img.at(0, 0).unwrap(), 0.0);
        assert_eq!(img.at(3, 0).unwrap(), 3.0);
        assert_eq!(img.at(1, 2).unwrap(), 9.0);
    }

    #[test]
    fn test_depth_image_out_of_bounds() {
        let img = DepthImage::new(Header::default(), 4, 3, vec![1.0; 12]).unwrap();

        assert!(matches!(
            img.at(4, 0),
            Err(DepthtectionError::OutOfBounds { u: 4, v: 0, .. })
        ));
        assert!(matches!(
            img.at(0, -1),
            Err(DepthtectionError::OutOfBounds { .. })
        ));
    }
}
