//! SE3: rigid-body transformation (rotation + translation).

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// Rigid transform `T_target_source`.
///
/// Transforms points as: p' = R * p + t
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    ///
    /// The quaternion is normalized, so slightly denormalized input from
    /// text files is accepted.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    pub fn from_matrix(m: Matrix4<f64>) -> Self {
        let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Self::from_rt(r, t)
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.to_rotation_matrix().into_inner());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose `self * other`, i.e. apply `other` first.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Interpolate between `self` (t = 0) and `other` (t = 1).
    ///
    /// Rotation is slerped, translation linearly interpolated.
    pub fn interpolate(&self, other: &SE3, t: f64) -> Self {
        let rotation = self
            .rotation
            .try_slerp(&other.rotation, t, 1e-9)
            .unwrap_or(if t < 0.5 { self.rotation } else { other.rotation });
        Self {
            rotation,
            translation: self.translation.lerp(&other.translation, t),
        }
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn yaw(angle: f64, t: Vector3<f64>) -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
            translation: t,
        }
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let t = yaw(0.7, Vector3::new(1.0, -2.0, 0.5));
        let id = t.compose(&t.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let a = yaw(FRAC_PI_2, Vector3::zeros());
        let b = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));

        // b moves x to (1,0,0), then a rotates it onto +y.
        let p = a.compose(&b).transform_point(&Vector3::zeros());
        assert_relative_eq!(p, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_conversion() {
        let t = yaw(-0.3, Vector3::new(4.0, 5.0, 6.0));
        let back = SE3::from_matrix(t.to_matrix());

        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&t.rotation), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = yaw(0.0, Vector3::new(0.0, 0.0, 0.0));
        let b = yaw(1.0, Vector3::new(2.0, 0.0, 0.0));
        let mid = a.interpolate(&b, 0.5);

        assert_relative_eq!(mid.translation, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(mid.rotation.angle(), 0.5, epsilon = 1e-9);
    }
}
