// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved viewpoints.
//!
//! Binary layout: the 25-byte tag `"Vrui viewpoint file v1.0\n"` (no
//! terminator), then little-endian `f64` values in this order: center (3),
//! size (1), forward (3), up (3). Existing files depend on this layout.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tandem_proto::scalar::{get_array, put_array};
use tandem_proto::{Scalar, WireError};
use thiserror::Error;

use crate::math::{NavTransform, Quat, Vec3};
use crate::nav::DisplayFrame;

/// File tag identifying format version 1.0.
pub const VIEWPOINT_HEADER: &[u8; 25] = b"Vrui viewpoint file v1.0\n";

/// Encoded size of a viewpoint record.
pub const VIEWPOINT_LEN: usize = VIEWPOINT_HEADER.len() + 10 * f64::WIDTH;

/// Errors reading or writing viewpoint files.
#[derive(Debug, Error)]
pub enum ViewpointError {
    /// Filesystem failure.
    #[error("viewpoint io: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with the expected tag.
    #[error("not a viewpoint file (bad header)")]
    BadHeader,
    /// The file ended before all fields were read.
    #[error("viewpoint file truncated")]
    Truncated,
}

/// Center, size and orientation of the view, in navigational coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    /// Point shown at the display center.
    pub center: Vec3,
    /// Navigational length shown as the display size.
    pub size: f64,
    /// Direction shown as the display forward direction.
    pub forward: Vec3,
    /// Direction shown as the display up direction.
    pub up: Vec3,
}

impl Viewpoint {
    /// Describes what `nav` currently shows on `display`.
    pub fn capture(nav: &NavTransform, display: &DisplayFrame) -> Self {
        let inv = nav.inverse();
        Self {
            center: inv.transform_point(&display.center),
            size: display.size * inv.scale,
            forward: inv.transform_vector(&display.forward).normalize(),
            up: inv.transform_vector(&display.up).normalize(),
        }
    }

    /// Navigation transform that shows this viewpoint on `display`.
    pub fn to_navigation(&self, display: &DisplayFrame) -> NavTransform {
        let display_frame =
            Quat::from_base_vectors(display.forward.cross(&display.up), display.forward);
        let view_frame = Quat::from_base_vectors(self.forward.cross(&self.up), self.forward);
        NavTransform::translate_from_origin_to(display.center)
            .compose(&NavTransform::rotate(display_frame))
            .compose(&NavTransform::scale(display.size / self.size))
            .compose(&NavTransform::rotate(view_frame.conjugate()))
            .compose(&NavTransform::translate_to_origin_from(self.center))
            .renormalize()
    }

    /// Serialized record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(VIEWPOINT_LEN);
        out.extend_from_slice(VIEWPOINT_HEADER);
        put_array(&mut out, &self.center.to_array());
        self.size.put(&mut out);
        put_array(&mut out, &self.forward.to_array());
        put_array(&mut out, &self.up.to_array());
        out
    }

    /// Parses a record; bytes after the record are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ViewpointError> {
        let tag_len = VIEWPOINT_HEADER.len().min(bytes.len());
        if bytes[..tag_len] != VIEWPOINT_HEADER[..tag_len] {
            return Err(ViewpointError::BadHeader);
        }
        if bytes.len() < VIEWPOINT_HEADER.len() {
            return Err(ViewpointError::Truncated);
        }
        let mut rd = &bytes[VIEWPOINT_HEADER.len()..];
        Self::decode_fields(&mut rd).map_err(|_| ViewpointError::Truncated)
    }

    fn decode_fields(rd: &mut &[u8]) -> Result<Self, WireError> {
        let center = get_array::<f64, 3>(rd)?;
        let size = f64::get(rd)?;
        let forward = get_array::<f64, 3>(rd)?;
        let up = get_array::<f64, 3>(rd)?;
        Ok(Self {
            center: center.into(),
            size,
            forward: forward.into(),
            up: up.into(),
        })
    }

    /// Reads a record from `reader`.
    pub fn read_from(reader: &mut impl Read) -> Result<Self, ViewpointError> {
        let mut bytes = Vec::with_capacity(VIEWPOINT_LEN);
        reader
            .take(VIEWPOINT_LEN as u64)
            .read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Writes a record to `writer`.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), ViewpointError> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Loads a viewpoint file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ViewpointError> {
        let mut file = fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Saves a viewpoint file, replacing any existing one.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ViewpointError> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }
}
