// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-frame payload broadcast from the master to every slave.
//!
//! Field order is fixed:
//!
//! ```text
//! frame_time          f64
//! median_frame_time   f64
//! dirty_mask          i32
//! if TRANSFORM:         translation f64[3], rotation f64[4], scale f64
//! if DISPLAY_GEOMETRY:  center f64[3], size f64
//! if TOOL_ANCHOR:       anchor f64[3]
//! input sub-message   (see [`crate::input`])
//! ```
//!
//! The optional groups are present iff their mask bit is set. [`FramePayload`]
//! derives the mask from which groups are populated, so an encoder cannot
//! produce a mask that disagrees with the body.

use std::ops::{BitOr, BitOrAssign};

use bytes::{Buf, BufMut};

use crate::input::InputFrame;
use crate::scalar::{get_array, put_array, Scalar};
use crate::WireError;

/// Bitset of optional state groups changed since the last broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirtyMask(u8);

impl DirtyMask {
    /// No group changed.
    pub const EMPTY: Self = Self(0);
    /// Navigation transform changed.
    pub const TRANSFORM: Self = Self(0x1);
    /// Display center/size changed.
    pub const DISPLAY_GEOMETRY: Self = Self(0x2);
    /// Tool placement anchor moved.
    pub const TOOL_ANCHOR: Self = Self(0x4);
    /// Every defined group.
    pub const ALL: Self = Self(0x7);

    /// Validates raw wire bits; undefined bits are an error.
    pub fn from_bits(bits: i32) -> Result<Self, WireError> {
        if bits & !i32::from(Self::ALL.0) != 0 {
            return Err(WireError::InvalidDirtyMask(bits));
        }
        // Range checked above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(Self(bits as u8))
    }

    /// Raw wire bits.
    pub fn bits(self) -> i32 {
        i32::from(self.0)
    }

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// True when no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DirtyMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Navigation transform as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireTransform {
    /// Translation vector.
    pub translation: [f64; 3],
    /// Rotation quaternion `(x, y, z, w)`.
    pub rotation: [f64; 4],
    /// Uniform scale factor.
    pub scale: f64,
}

/// Display center and size as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireDisplay {
    /// Display center in physical coordinates.
    pub center: [f64; 3],
    /// Display size (radius of the interesting region).
    pub size: f64,
}

/// The complete state delta for one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePayload {
    /// Application time of the frame, seconds since start.
    pub frame_time: f64,
    /// Median-filtered frame duration.
    pub median_frame_time: f64,
    /// New navigation transform, if it changed.
    pub transform: Option<WireTransform>,
    /// New display geometry, if it changed.
    pub display: Option<WireDisplay>,
    /// New tool anchor, if it moved.
    pub tool_anchor: Option<[f64; 3]>,
    /// Device commands, poses, and UI events.
    pub input: InputFrame,
}

impl FramePayload {
    /// Mask describing which optional groups this payload carries.
    pub fn dirty_mask(&self) -> DirtyMask {
        let mut mask = DirtyMask::EMPTY;
        if self.transform.is_some() {
            mask |= DirtyMask::TRANSFORM;
        }
        if self.display.is_some() {
            mask |= DirtyMask::DISPLAY_GEOMETRY;
        }
        if self.tool_anchor.is_some() {
            mask |= DirtyMask::TOOL_ANCHOR;
        }
        mask
    }

    /// Appends the encoding of this payload to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), WireError> {
        self.frame_time.put(buf);
        self.median_frame_time.put(buf);
        self.dirty_mask().bits().put(buf);
        if let Some(t) = &self.transform {
            put_array(buf, &t.translation);
            put_array(buf, &t.rotation);
            t.scale.put(buf);
        }
        if let Some(d) = &self.display {
            put_array(buf, &d.center);
            d.size.put(buf);
        }
        if let Some(anchor) = &self.tool_anchor {
            put_array(buf, anchor);
        }
        self.input.encode(buf)
    }

    /// Encodes into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(64);
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Consumes one payload from `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        let frame_time = f64::get(buf)?;
        let median_frame_time = f64::get(buf)?;
        let mask = DirtyMask::from_bits(i32::get(buf)?)?;
        let transform = if mask.contains(DirtyMask::TRANSFORM) {
            Some(WireTransform {
                translation: get_array(buf)?,
                rotation: get_array(buf)?,
                scale: f64::get(buf)?,
            })
        } else {
            None
        };
        let display = if mask.contains(DirtyMask::DISPLAY_GEOMETRY) {
            Some(WireDisplay {
                center: get_array(buf)?,
                size: f64::get(buf)?,
            })
        } else {
            None
        };
        let tool_anchor = if mask.contains(DirtyMask::TOOL_ANCHOR) {
            Some(get_array(buf)?)
        } else {
            None
        };
        let input = InputFrame::decode(buf)?;
        Ok(Self {
            frame_time,
            median_frame_time,
            transform,
            display,
            tool_anchor,
            input,
        })
    }

    /// Decodes a payload that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut rd = bytes;
        let payload = Self::decode(&mut rd)?;
        if !rd.is_empty() {
            return Err(WireError::TrailingBytes(rd.len()));
        }
        Ok(payload)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_only_payload_is_twenty_bytes_plus_empty_input() {
        let payload = FramePayload {
            frame_time: 1.5,
            median_frame_time: 0.016,
            ..FramePayload::default()
        };
        let bytes = payload.to_bytes().unwrap();
        // 8 + 8 + 4 header, three empty u32 counts.
        assert_eq!(bytes.len(), 20 + 12);
        assert_eq!(&bytes[0..8], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[16..20], &0i32.to_le_bytes());
    }

    #[test]
    fn mask_bits_follow_populated_groups() {
        let payload = FramePayload {
            display: Some(WireDisplay {
                center: [0.0, 0.0, 1.0],
                size: 2.0,
            }),
            tool_anchor: Some([1.0, 2.0, 3.0]),
            ..FramePayload::default()
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(&bytes[16..20], &0x6i32.to_le_bytes());
        // header + display(32) + anchor(24) + empty input(12)
        assert_eq!(bytes.len(), 20 + 32 + 24 + 12);
        assert_eq!(FramePayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn transform_group_layout_is_translation_rotation_scale() {
        let payload = FramePayload {
            transform: Some(WireTransform {
                translation: [1.0, 2.0, 3.0],
                rotation: [0.0, 0.0, 0.0, 1.0],
                scale: 4.0,
            }),
            ..FramePayload::default()
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(&bytes[20..28], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[44..52], &0.0f64.to_le_bytes());
        assert_eq!(&bytes[68..76], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[76..84], &4.0f64.to_le_bytes());
    }

    #[test]
    fn undefined_mask_bits_are_rejected() {
        let mut bytes = FramePayload::default().to_bytes().unwrap();
        bytes[16..20].copy_from_slice(&0x10i32.to_le_bytes());
        assert_eq!(
            FramePayload::from_bytes(&bytes),
            Err(WireError::InvalidDirtyMask(0x10))
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = FramePayload::default().to_bytes().unwrap();
        bytes.push(0);
        assert_eq!(
            FramePayload::from_bytes(&bytes),
            Err(WireError::TrailingBytes(1))
        );
    }
}
