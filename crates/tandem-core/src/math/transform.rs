// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use tandem_proto::WireTransform;

use crate::math::{Quat, Vec3};

/// Smallest scale factor a renormalized transform may carry.
pub const MIN_SCALE: f64 = 1e-12;
/// Largest scale factor a renormalized transform may carry.
pub const MAX_SCALE: f64 = 1e12;

/// Orthogonal similarity transform: `p ↦ translation + scale · rotation(p)`.
///
/// Maps navigational (model) coordinates to physical (display) coordinates
/// when used as the navigation transform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NavTransform {
    /// Translation applied last.
    pub translation: Vec3,
    /// Rotation applied after scaling.
    pub rotation: Quat,
    /// Uniform scale factor applied first.
    pub scale: f64,
}

impl Default for NavTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl NavTransform {
    /// The identity transform.
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::identity(),
            scale: 1.0,
        }
    }

    /// Pure translation by `offset`.
    pub fn translate(offset: Vec3) -> Self {
        Self {
            translation: offset,
            ..Self::identity()
        }
    }

    /// Translation that moves the origin onto `point`.
    pub fn translate_from_origin_to(point: Vec3) -> Self {
        Self::translate(point)
    }

    /// Translation that moves `point` onto the origin.
    pub fn translate_to_origin_from(point: Vec3) -> Self {
        Self::translate(point.neg())
    }

    /// Pure rotation.
    pub fn rotate(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    /// Pure uniform scaling about the origin.
    pub fn scale(scale: f64) -> Self {
        Self {
            scale,
            ..Self::identity()
        }
    }

    /// True when this is exactly the identity.
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Composition `self ∘ other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            translation: self
                .translation
                .add(&self.rotation.rotate(&other.translation).scale(self.scale)),
            rotation: self.rotation.multiply(&other.rotation),
            scale: self.scale * other.scale,
        }
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.conjugate();
        let inv_scale = 1.0 / self.scale;
        Self {
            translation: inv_rot.rotate(&self.translation).scale(-inv_scale),
            rotation: inv_rot,
            scale: inv_scale,
        }
    }

    /// Restores a unit rotation and clamps the scale into `[MIN_SCALE, MAX_SCALE]`.
    pub fn renormalize(&self) -> Self {
        let scale = if self.scale.is_nan() {
            1.0
        } else {
            self.scale.clamp(MIN_SCALE, MAX_SCALE)
        };
        Self {
            translation: self.translation,
            rotation: self.rotation.normalize(),
            scale,
        }
    }

    /// Maps a point.
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.translation
            .add(&self.rotation.rotate(p).scale(self.scale))
    }

    /// Maps a direction (ignores translation).
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.rotate(v).scale(self.scale)
    }

    /// Approximate equality on the mapped result of translation, rotation, and scale.
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.translation.approx_eq(&other.translation, tol)
            && self.rotation.approx_same_rotation(&other.rotation, tol)
            && (self.scale - other.scale).abs() <= tol * self.scale.abs().max(1.0)
    }

    /// Wire representation.
    pub fn to_wire(&self) -> WireTransform {
        WireTransform {
            translation: self.translation.to_array(),
            rotation: self.rotation.to_array(),
            scale: self.scale,
        }
    }

    /// Rebuilds a transform from its wire representation.
    pub fn from_wire(wire: &WireTransform) -> Self {
        Self {
            translation: Vec3::from(wire.translation),
            rotation: Quat::from(wire.rotation),
            scale: wire.scale,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_3;

    fn sample() -> NavTransform {
        NavTransform {
            translation: Vec3::new(1.0, -2.0, 0.5),
            rotation: Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), FRAC_PI_3),
            scale: 2.5,
        }
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = sample();
        let p = Vec3::new(0.3, 4.0, -1.0);
        let back = t.inverse().transform_point(&t.transform_point(&p));
        assert!(back.approx_eq(&p, 1e-12));
        assert!(t.compose(&t.inverse()).approx_eq(&NavTransform::identity(), 1e-12));
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let a = NavTransform::translate(Vec3::UNIT_X);
        let b = NavTransform::scale(3.0);
        let p = Vec3::UNIT_Y;
        let ab = a.compose(&b).transform_point(&p);
        assert!(ab.approx_eq(&Vec3::new(1.0, 3.0, 0.0), 1e-12));
    }

    #[test]
    fn renormalize_clamps_scale_and_rotation() {
        let t = NavTransform {
            rotation: Quat::new(0.0, 0.0, 0.0, 2.0),
            scale: 1e20,
            ..NavTransform::identity()
        }
        .renormalize();
        assert_eq!(t.scale, MAX_SCALE);
        assert_eq!(t.rotation, Quat::identity());
    }
}
