// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Checksummed packet framing shared by every transport.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || KIND(2) || SEQ(8) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * Header fields are big-endian; payload bodies carry their own encoding.
//! * `SEQ` increases by one per packet on a stream; receivers treat gaps and
//!   replays as fatal.
//! * CHECKSUM = blake3-256 over HEADER (first 20 bytes) || PAYLOAD

use blake3::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::WireError;

/// Protocol magic constant "TNDM".
pub const MAGIC: [u8; 4] = *b"TNDM";
/// Framing version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Header length in bytes.
pub const HEADER_LEN: usize = 20;
/// Checksum length in bytes.
pub const CHECKSUM_LEN: usize = 32;
/// Largest payload a receiver will buffer.
pub const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Scalar stream bytes written through a pipe.
    Data,
    /// CBOR [`crate::Hello`].
    Hello,
    /// CBOR [`crate::HelloAck`].
    HelloAck,
    /// Empty lock-step acknowledgement from a slave.
    Barrier,
}

impl PacketKind {
    fn to_wire(self) -> u16 {
        match self {
            Self::Data => 0,
            Self::Hello => 1,
            Self::HelloAck => 2,
            Self::Barrier => 3,
        }
    }

    fn from_wire(raw: u16) -> Result<Self, WireError> {
        match raw {
            0 => Ok(Self::Data),
            1 => Ok(Self::Hello),
            2 => Ok(Self::HelloAck),
            3 => Ok(Self::Barrier),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload kind.
    pub kind: PacketKind,
    /// Per-stream sequence number.
    pub seq: u64,
    /// Payload length in bytes.
    pub len: usize,
}

impl PacketHeader {
    /// Serializes the header into its fixed 20-byte form.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_LEN], WireError> {
        if self.len > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(self.len));
        }
        // Bounded by MAX_PAYLOAD above.
        #[allow(clippy::cast_possible_truncation)]
        let len = self.len as u32;
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&self.kind.to_wire().to_be_bytes());
        header[8..16].copy_from_slice(&self.seq.to_be_bytes());
        header[16..20].copy_from_slice(&len.to_be_bytes());
        Ok(header)
    }

    /// Validates and parses a header; stream readers call this before
    /// reading `len + CHECKSUM_LEN` more bytes.
    pub fn parse(header: &[u8; HEADER_LEN]) -> Result<Self, WireError> {
        if header[0..4] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let kind = PacketKind::from_wire(u16::from_be_bytes([header[6], header[7]]))?;
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&header[8..16]);
        let len = u32::from_be_bytes([header[16], header[17], header[18], header[19]]) as usize;
        if len > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(len));
        }
        Ok(Self {
            kind,
            seq: u64::from_be_bytes(seq),
            len,
        })
    }
}

/// A full packet (header + payload); the checksum is computed on encode and
/// verified on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Parsed header.
    pub header: PacketHeader,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Builds a packet around `payload`.
    pub fn new(kind: PacketKind, seq: u64, payload: Vec<u8>) -> Self {
        Self {
            header: PacketHeader {
                kind,
                seq,
                len: payload.len(),
            },
            payload,
        }
    }

    /// Encodes header, payload, and checksum into one buffer.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let header = PacketHeader {
            len: self.payload.len(),
            ..self.header
        }
        .to_bytes()?;
        let checksum = checksum(&header, &self.payload);
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&checksum);
        Ok(out)
    }

    /// Decodes exactly one packet spanning all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(WireError::Truncated {
                needed: HEADER_LEN + CHECKSUM_LEN,
                got: bytes.len(),
            });
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = PacketHeader::parse(&raw)?;
        Self::decode_body(header, &raw, &bytes[HEADER_LEN..])
    }

    /// Completes decoding given an already parsed header and the bytes that
    /// follow it (`payload || checksum`, nothing more).
    pub fn decode_body(
        header: PacketHeader,
        raw_header: &[u8; HEADER_LEN],
        rest: &[u8],
    ) -> Result<Self, WireError> {
        let needed = header.len + CHECKSUM_LEN;
        if rest.len() < needed {
            return Err(WireError::Truncated {
                needed,
                got: rest.len(),
            });
        }
        if rest.len() > needed {
            return Err(WireError::TrailingBytes(rest.len() - needed));
        }
        let (payload, sum) = rest.split_at(header.len);
        if checksum(raw_header, payload).as_slice() != sum {
            return Err(WireError::ChecksumMismatch);
        }
        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }
}

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Encode to CBOR bytes using ciborium.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| WireError::Cbor(e.to_string()))?;
    Ok(out)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(bytes).map_err(|e| WireError::Cbor(e.to_string()))
}

/// CBOR-encodes `value` and frames it as one packet.
pub fn encode_cbor<T: Serialize>(kind: PacketKind, seq: u64, value: &T) -> Result<Vec<u8>, WireError> {
    Packet::new(kind, seq, to_cbor(value)?).encode()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_offset_table() {
        let bytes = Packet::new(PacketKind::Data, 0x0102, vec![9, 8, 7]).encode().unwrap();
        assert_eq!(&bytes[0..4], b"TNDM");
        assert_eq!(&bytes[4..6], &[0, 1]);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 3]);
        assert_eq!(&bytes[20..23], &[9, 8, 7]);
        assert_eq!(bytes.len(), HEADER_LEN + 3 + CHECKSUM_LEN);
    }

    #[test]
    fn checksum_matches_blake3_of_header_and_payload() {
        let bytes = Packet::new(PacketKind::Barrier, 5, Vec::new()).encode().unwrap();
        let expect = blake3::hash(&bytes[..HEADER_LEN]);
        assert_eq!(
            hex::encode(&bytes[HEADER_LEN..]),
            hex::encode(expect.as_bytes())
        );
    }

    #[test]
    fn flipped_payload_bit_fails_checksum() {
        let mut bytes = Packet::new(PacketKind::Data, 1, vec![1, 2, 3, 4]).encode().unwrap();
        bytes[HEADER_LEN + 2] ^= 0x10;
        assert_eq!(Packet::decode(&bytes), Err(WireError::ChecksumMismatch));
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        let good = Packet::new(PacketKind::Data, 1, vec![1]).encode().unwrap();
        let mut bad = good.clone();
        bad[0] = b'X';
        assert_eq!(Packet::decode(&bad), Err(WireError::BadMagic));
        let mut bad = good;
        bad[5] = 9;
        assert_eq!(Packet::decode(&bad), Err(WireError::UnsupportedVersion(9)));
    }

    #[test]
    fn oversized_length_is_rejected_from_header_alone() {
        let mut raw = PacketHeader {
            kind: PacketKind::Data,
            seq: 0,
            len: 0,
        }
        .to_bytes()
        .unwrap();
        raw[16..20].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            PacketHeader::parse(&raw),
            Err(WireError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn trailing_bytes_after_checksum_are_rejected() {
        let mut bytes = Packet::new(PacketKind::Data, 1, vec![1]).encode().unwrap();
        bytes.push(0);
        assert_eq!(Packet::decode(&bytes), Err(WireError::TrailingBytes(1)));
    }
}
