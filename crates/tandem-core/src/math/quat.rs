// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::{Vec3, EPSILON};

/// Quaternion stored as `(x, y, z, w)`.
///
/// Rotations are unit quaternions; [`Quat::normalize`] restores unit length
/// after long multiplication chains.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quat {
    data: [f64; 4],
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    /// Creates a quaternion from components.
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { data: [x, y, z, w] }
    }

    /// Returns the identity quaternion.
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Returns the quaternion as an array.
    pub fn to_array(self) -> [f64; 4] {
        self.data
    }

    fn component(&self, idx: usize) -> f64 {
        self.data[idx]
    }

    /// Constructs a quaternion from a rotation axis and angle in radians.
    ///
    /// Returns the identity quaternion when the axis length is ≤ `EPSILON`.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let len_sq = axis.length_squared();
        if len_sq <= EPSILON * EPSILON {
            return Self::identity();
        }
        let norm_axis = axis.scale(1.0 / len_sq.sqrt());
        let (sin_half, cos_half) = (angle * 0.5).sin_cos();
        let scaled = norm_axis.scale(sin_half);
        Self::new(
            scaled.component(0),
            scaled.component(1),
            scaled.component(2),
            cos_half,
        )
    }

    /// Rotation that maps the X axis onto `x_axis` and the Y axis into the
    /// plane spanned by `x_axis` and `y_axis`.
    ///
    /// The inputs need not be unit length or orthogonal; `y_axis` is
    /// re-orthogonalised against `x_axis`.
    pub fn from_base_vectors(x_axis: Vec3, y_axis: Vec3) -> Self {
        let x = x_axis.normalize();
        let z = x.cross(&y_axis).normalize();
        let y = z.cross(&x);
        Self::from_rotation_columns(x, y, z)
    }

    /// Shortest rotation carrying direction `from` onto direction `to`.
    ///
    /// Antiparallel inputs rotate half a turn about any axis orthogonal to `from`.
    pub fn rotate_from_to(from: Vec3, to: Vec3) -> Self {
        let a = from.normalize();
        let b = to.normalize();
        let cos = a.dot(&b).clamp(-1.0, 1.0);
        let axis = a.cross(&b);
        if axis.length_squared() > EPSILON * EPSILON {
            return Self::from_axis_angle(axis, cos.acos());
        }
        if cos > 0.0 {
            return Self::identity();
        }
        let helper = if a.component(0).abs() < 0.9 {
            Vec3::UNIT_X
        } else {
            Vec3::UNIT_Y
        };
        Self::from_axis_angle(a.cross(&helper), std::f64::consts::PI)
    }

    /// Converts an orthonormal basis (matrix columns) into a quaternion.
    fn from_rotation_columns(x: Vec3, y: Vec3, z: Vec3) -> Self {
        let (m00, m10, m20) = (x.component(0), x.component(1), x.component(2));
        let (m01, m11, m21) = (y.component(0), y.component(1), y.component(2));
        let (m02, m12, m22) = (z.component(0), z.component(1), z.component(2));
        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    /// Hamilton product `self * other`: applies `other` first, then `self`.
    pub fn multiply(&self, other: &Self) -> Self {
        let ax = self.component(0);
        let ay = self.component(1);
        let az = self.component(2);
        let aw = self.component(3);

        let bx = other.component(0);
        let by = other.component(1);
        let bz = other.component(2);
        let bw = other.component(3);

        Self::new(
            aw * bx + ax * bw + ay * bz - az * by,
            aw * by - ax * bz + ay * bw + az * bx,
            aw * bz + ax * by - ay * bx + az * bw,
            aw * bw - ax * bx - ay * by - az * bz,
        )
    }

    /// Conjugate; the inverse rotation for unit quaternions.
    pub fn conjugate(&self) -> Self {
        Self::new(
            -self.component(0),
            -self.component(1),
            -self.component(2),
            self.component(3),
        )
    }

    /// Euclidean norm of the four components.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Normalises the quaternion; returns identity when norm is ~0.
    pub fn normalize(&self) -> Self {
        let len = self.norm();
        if !(len > EPSILON && len.is_finite()) {
            return Self::identity();
        }
        let inv = 1.0 / len;
        Self::new(
            self.component(0) * inv,
            self.component(1) * inv,
            self.component(2) * inv,
            self.component(3) * inv,
        )
    }

    /// Rotates a vector: `q * v * q⁻¹` for unit `q`.
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        let u = Vec3::new(self.component(0), self.component(1), self.component(2));
        let w = self.component(3);
        // v + 2w(u × v) + 2u × (u × v)
        let uv = u.cross(v);
        let uuv = u.cross(&uv);
        v.add(&uv.scale(2.0 * w)).add(&uuv.scale(2.0))
    }

    /// True when both represent the same rotation within `tol` (q and -q are equal).
    pub fn approx_same_rotation(&self, other: &Self, tol: f64) -> bool {
        let dot: f64 = (0..4).map(|i| self.component(i) * other.component(i)).sum();
        (1.0 - dot.abs()) <= tol
    }
}

/// Components are taken verbatim as `(x, y, z, w)`; normalization is not enforced.
impl From<[f64; 4]> for Quat {
    fn from(value: [f64; 4]) -> Self {
        Self { data: value }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn quarter_turn_about_z_maps_x_to_y() {
        let q = Quat::from_axis_angle(Vec3::UNIT_Z, FRAC_PI_2);
        assert!(q.rotate(&Vec3::UNIT_X).approx_eq(&Vec3::UNIT_Y, 1e-12));
    }

    #[test]
    fn base_vectors_reproduce_axes() {
        let q = Quat::from_base_vectors(Vec3::UNIT_Y, Vec3::UNIT_X.neg());
        assert!(q.rotate(&Vec3::UNIT_X).approx_eq(&Vec3::UNIT_Y, 1e-12));
        assert!(q.rotate(&Vec3::UNIT_Y).approx_eq(&Vec3::UNIT_X.neg(), 1e-12));
        assert!(q.rotate(&Vec3::UNIT_Z).approx_eq(&Vec3::UNIT_Z, 1e-12));
    }

    #[test]
    fn base_vectors_handle_half_turns() {
        // 180° about Z: trace is -1, exercising the non-trace branch.
        let q = Quat::from_base_vectors(Vec3::UNIT_X.neg(), Vec3::UNIT_Y.neg());
        assert!(q.rotate(&Vec3::UNIT_X).approx_eq(&Vec3::UNIT_X.neg(), 1e-12));
        assert!((q.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotate_from_to_aligns_directions() {
        let from = Vec3::new(1.0, 1.0, 0.0);
        let to = Vec3::new(0.0, 0.0, 2.0);
        let q = Quat::rotate_from_to(from, to);
        assert!(q.rotate(&from.normalize()).approx_eq(&Vec3::UNIT_Z, 1e-12));

        let flip = Quat::rotate_from_to(Vec3::UNIT_Z, Vec3::UNIT_Z.neg());
        assert!(flip
            .rotate(&Vec3::UNIT_Z)
            .approx_eq(&Vec3::UNIT_Z.neg(), 1e-12));
        assert_eq!(Quat::rotate_from_to(Vec3::UNIT_X, Vec3::UNIT_X), Quat::identity());
    }

    #[test]
    fn zero_quaternion_normalizes_to_identity() {
        assert_eq!(Quat::new(0.0, 0.0, 0.0, 0.0).normalize(), Quat::identity());
    }
}
