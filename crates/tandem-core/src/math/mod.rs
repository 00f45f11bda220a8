// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Double-precision math for navigation: vectors, unit quaternions,
//! orthogonal (rotate + uniform scale + translate) transforms, and the
//! replicated pseudo-random generator.

mod prng;
mod quat;
mod transform;
mod vec3;

pub use prng::Prng;
pub use quat::Quat;
pub use transform::{NavTransform, MAX_SCALE, MIN_SCALE};
pub use vec3::Vec3;

/// Global epsilon used by math routines when detecting degenerate values.
pub const EPSILON: f64 = 1e-12;
