// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for Tandem render clusters.
//!
//! A cluster is one master and N slaves running the same application. Every
//! frame the master broadcasts a [`frame::FramePayload`] (timing, navigation
//! deltas, input) that slaves apply verbatim. Payload bodies use the
//! fixed-width little-endian scalar codec in [`scalar`]; transports wrap
//! them in checksummed [`wire::Packet`]s. Connection setup uses small CBOR
//! handshake messages defined here.

use serde::{Deserialize, Serialize};

pub mod frame;
pub mod input;
pub mod scalar;
pub mod wire;

pub use frame::{DirtyMask, FramePayload, WireDisplay, WireTransform};
pub use input::{DeviceCommand, DeviceState, InputFrame, UiEvent};
pub use scalar::Scalar;
pub use wire::{Packet, PacketHeader, PacketKind};

/// Protocol version carried in the handshake; bumped on any payload layout change.
pub const PROTOCOL_VERSION: u16 = 1;

/// Which side of the cluster a node runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    /// Authoritative node: samples time and input, broadcasts every frame.
    #[default]
    Master,
    /// Mirror node: applies whatever the master broadcasts.
    Slave,
}

impl ClusterRole {
    /// True for [`ClusterRole::Master`].
    pub fn is_master(self) -> bool {
        matches!(self, Self::Master)
    }
}

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Fewer bytes remained than the next field needs.
    #[error("truncated input: needed {needed} bytes, {got} remaining")]
    Truncated {
        /// Bytes required by the field.
        needed: usize,
        /// Bytes that were available.
        got: usize,
    },
    /// A count or length exceeded its protocol bound.
    #[error("{what} count {got} exceeds limit {limit}")]
    LimitExceeded {
        /// Which field overflowed.
        what: &'static str,
        /// Allowed maximum.
        limit: usize,
        /// Observed value.
        got: usize,
    },
    /// A string field was not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    /// A tagged union carried an unknown discriminant.
    #[error("unknown {what} tag {tag}")]
    UnknownTag {
        /// Which union was being decoded.
        what: &'static str,
        /// The offending tag.
        tag: u8,
    },
    /// The dirty mask had bits outside the defined groups.
    #[error("invalid dirty mask {0:#x}")]
    InvalidDirtyMask(i32),
    /// Packet did not start with the protocol magic.
    #[error("bad packet magic")]
    BadMagic,
    /// Packet version is not supported by this build.
    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u16),
    /// Packet kind field is not known.
    #[error("unknown packet kind {0}")]
    UnknownKind(u16),
    /// Declared payload length exceeds [`wire::MAX_PAYLOAD`].
    #[error("payload length {0} exceeds maximum")]
    PayloadTooLarge(usize),
    /// Checksum did not match header and payload.
    #[error("packet checksum mismatch")]
    ChecksumMismatch,
    /// Bytes were left over after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    /// CBOR encode/decode failure in a handshake message.
    #[error("cbor: {0}")]
    Cbor(String),
}

/// Slave → master greeting sent once after connecting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Index of this slave, `0..num_slaves`.
    pub node_index: u32,
    /// Must equal [`PROTOCOL_VERSION`] on both ends.
    pub protocol_version: u16,
    /// Implementation version (not wire version).
    pub client_version: u32,
}

/// Status enumeration for [`HelloAck`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AckStatus {
    /// Slave accepted into the cluster.
    #[serde(rename = "OK")]
    Ok,
    /// Slave rejected; see `message`.
    #[serde(rename = "ERROR")]
    Error,
}

/// Master → slave reply to [`Hello`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloAck {
    /// Whether the slave was accepted.
    pub status: AckStatus,
    /// Total slaves the master expects.
    pub num_slaves: u32,
    /// Reason for rejection, if any.
    pub message: Option<String>,
}

impl HelloAck {
    /// Successful acknowledgement.
    pub fn ok(num_slaves: u32) -> Self {
        Self {
            status: AckStatus::Ok,
            num_slaves,
            message: None,
        }
    }

    /// Rejection with a human-readable reason.
    pub fn reject(num_slaves: u32, message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            num_slaves,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod integrity_tests {
    use super::*;

    #[test]
    fn hello_survives_a_packet() {
        let hello = Hello {
            node_index: 3,
            protocol_version: PROTOCOL_VERSION,
            client_version: 7,
        };
        let bytes = wire::encode_cbor(PacketKind::Hello, 0, &hello).unwrap();
        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.header.kind, PacketKind::Hello);
        let back: Hello = wire::from_cbor(&packet.payload).unwrap();
        assert_eq!(back, hello);
    }

    #[test]
    fn ack_status_uses_upper_case_names() {
        let ack = HelloAck::reject(2, "index taken");
        let mut raw = Vec::new();
        ciborium::into_writer(&ack, &mut raw).unwrap();
        let value: ciborium::value::Value = ciborium::from_reader(raw.as_slice()).unwrap();
        let text = format!("{value:?}");
        assert!(text.contains("ERROR"), "{text}");
    }
}
