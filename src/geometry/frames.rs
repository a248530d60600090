//! Coordinate frame conventions.
//!
//! # Frame Conventions
//!
//! ## Optical Frame (RDF - camera / depth sensor convention)
//! ```text
//!        +Y (down)
//!         |
//!         +------ +X (right)
//!        /
//!      +Z (forward, optical axis)
//! ```
//! Depth back-projection produces points in this frame.
//!
//! ## Body Frame (FLU - vehicle convention)
//! ```text
//!        +Z (up)
//!         |
//!         +------ +Y (left)
//!        /
//!      +X (forward)
//! ```
//!
//! ## Global Frame (ENU, named `earth` by default)
//! Fixed, Z-up. All candidate positions are stored here and "elevation"
//! always means the global Z coordinate.
//!
//! # Transformation Naming Convention
//!
//! `T_target_source` maps a point from `source` to `target`:
//! ```text
//! p_global = T_global_sensor * p_sensor
//! ```

use nalgebra::{Matrix3, Vector3};

use super::SE3;

/// Default name of the fixed global frame.
pub const DEFAULT_GLOBAL_FRAME: &str = "earth";

/// Default name of the vehicle body frame.
pub const DEFAULT_BASE_FRAME: &str = "base_link";

/// Index of the "up" axis in the global frame.
pub const UP_AXIS: usize = 2;

/// Elevation of a global-frame point.
#[inline]
pub fn elevation(p: &Vector3<f64>) -> f64 {
    p[UP_AXIS]
}

/// Fixed rotation from Optical frame (RDF) to Body frame (FLU).
///
/// Maps:
/// - Optical +Z (forward) → Body +X (forward)
/// - Optical +X (right)   → Body -Y (left)
/// - Optical +Y (down)    → Body -Z (up)
#[rustfmt::skip]
pub fn rotation_body_optical() -> Matrix3<f64> {
    Matrix3::new(
        0.0,  0.0, 1.0,  // Body X = Optical Z
       -1.0,  0.0, 0.0,  // Body Y = -Optical X
        0.0, -1.0, 0.0,  // Body Z = -Optical Y
    )
}

/// Fixed rotation from Body frame (FLU) to Optical frame (RDF).
pub fn rotation_optical_body() -> Matrix3<f64> {
    rotation_body_optical().transpose()
}

/// Mount transform `T_body_optical` for a forward-looking sensor placed at
/// `offset` (body frame).
pub fn forward_optical_mount(offset: Vector3<f64>) -> SE3 {
    SE3::from_rt(rotation_body_optical(), offset)
}
