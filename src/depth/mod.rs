//! Depth image to 3D: single-pixel projection and bulk region clouds.

pub mod crop_cloud;
pub mod projector;

pub use crop_cloud::{cloud_from_depth_region, PixelRect};
pub use projector::{
    backproject, detection_pixel, is_no_measurement, point_from_depth, NO_MEASUREMENT,
};
