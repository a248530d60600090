//! Pinhole camera model with Brown–Conrady distortion.

use nalgebra::{Matrix3, Vector2, Vector3};

use super::messages::CameraInfo;

/// Iterations used when inverting the distortion model.
const UNDISTORT_ITERATIONS: u32 = 8;

/// Brown–Conrady radial/tangential distortion (plumb-bob order).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Build from plumb-bob coefficients; missing trailing terms are zero and
    /// extra terms (rational model) are ignored.
    pub fn from_coefficients(d: &[f64]) -> Self {
        let at = |i: usize| d.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Distort a normalized image point.
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Undistort a normalized image point by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *n_dist;
        }
        let mut n = *n_dist;
        for _ in 0..UNDISTORT_ITERATIONS {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Intrinsics of the depth-aligned color camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            distortion: Distortion::default(),
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn from_camera_info(info: &CameraInfo) -> Self {
        let k = &info.k;
        Self::new(k[0], k[4], k[2], k[5], info.width, info.height)
            .with_distortion(Distortion::from_coefficients(&info.d))
    }

    #[rustfmt::skip]
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0,     self.cx,
            0.0,     self.fy, self.cy,
            0.0,     0.0,     1.0,
        )
    }

    /// Pixel (u, v) to normalized image coordinates, no distortion handling.
    #[inline]
    pub fn normalize(&self, u: f64, v: f64) -> Vector2<f64> {
        Vector2::new((u - self.cx) / self.fx, (v - self.cy) / self.fy)
    }

    /// Project an optical-frame point onto the undistorted image plane.
    ///
    /// Returns None for points at or behind the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Vector2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }
}
