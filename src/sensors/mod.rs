//! Sensor-side data: message records and the camera model.

pub mod camera;
pub mod messages;

pub use camera::{CameraModel, Distortion};
pub use messages::{
    BoundingBox2D, CameraInfo, ColorImage, DepthImage, Detection2D, DetectionArray, Header,
    ObjectHypothesis, PointCloud, StampedPoint, StampedTransform,
};
