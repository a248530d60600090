//! Geometry utilities: SE3 transforms and frame conventions.

pub mod frames;
pub mod se3;

pub use frames::{elevation, DEFAULT_BASE_FRAME, DEFAULT_GLOBAL_FRAME, UP_AXIS};
pub use se3::SE3;
