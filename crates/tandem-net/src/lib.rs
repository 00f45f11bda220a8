// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cluster transports for Tandem, plus the ordered scalar [`Pipe`] that the
//! frame loop writes and reads through.
//!
//! A [`Transport`] moves encoded packets: the master sends one copy to every
//! slave, slaves receive them in order, and both ends meet at a lock-step
//! barrier once per frame. Two implementations ship here:
//!
//! * [`loopback`]: in-process channels, used by tests and single-host demos.
//! * [`tcp`]: blocking std sockets with read/write timeouts.

use std::time::Duration;

use tandem_proto::{ClusterRole, PacketKind, WireError};

pub mod loopback;
pub mod pipe;
pub mod tcp;

pub use pipe::Pipe;

/// Errors surfaced by transports and the pipe.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A blocking operation exceeded its timeout.
    #[error("transport timed out")]
    Timeout,
    /// The peer went away.
    #[error("peer disconnected")]
    Disconnected,
    /// Socket-level failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed packet or payload.
    #[error("wire: {0}")]
    Wire(#[from] WireError),
    /// A packet arrived with the wrong sequence number.
    #[error("out-of-order packet: expected seq {expected}, got {got}")]
    OutOfOrder {
        /// Next sequence number the receiver expected.
        expected: u64,
        /// Sequence number that arrived.
        got: u64,
    },
    /// A packet of the wrong kind arrived.
    #[error("unexpected {0:?} packet")]
    Unexpected(PacketKind),
    /// Connection setup failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Operation is only valid on the other role.
    #[error("operation not valid on a {0:?} node")]
    WrongRole(ClusterRole),
}

impl TransportError {
    /// Maps socket errors so that timeouts and closed peers get their own variants.
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::Disconnected,
            _ => Self::Io(err),
        }
    }

    /// True when the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Packet transport between one master and its slaves.
///
/// Packets are opaque encoded [`tandem_proto::Packet`] bytes; ordering and
/// checksum validation happen in [`Pipe`].
pub trait Transport: Send {
    /// Role of this end.
    fn role(&self) -> ClusterRole;

    /// Number of slaves in the cluster.
    fn num_slaves(&self) -> usize;

    /// Master: queue `packet` for every slave.
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;

    /// Slave: block until the next packet arrives or the timeout expires.
    fn recv(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Push queued packets onto the wire.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Lock-step rendezvous. Slaves acknowledge; the master returns only
    /// once every slave has acknowledged.
    fn barrier(&mut self) -> Result<(), TransportError>;

    /// Timeout applied to every subsequent blocking call.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn role(&self) -> ClusterRole {
        (**self).role()
    }

    fn num_slaves(&self) -> usize {
        (**self).num_slaves()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(packet)
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).recv()
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        (**self).barrier()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_timeout(timeout)
    }
}

/// Checks a barrier acknowledgement packet against the expected round.
pub(crate) fn check_barrier(raw: &[u8], round: u64) -> Result<(), TransportError> {
    let packet = tandem_proto::Packet::decode(raw)?;
    if packet.header.kind != PacketKind::Barrier {
        return Err(TransportError::Unexpected(packet.header.kind));
    }
    if packet.header.seq != round {
        return Err(TransportError::OutOfOrder {
            expected: round,
            got: packet.header.seq,
        });
    }
    Ok(())
}

/// Encodes the acknowledgement a slave sends for barrier `round`.
pub(crate) fn barrier_packet(round: u64) -> Result<Vec<u8>, TransportError> {
    Ok(tandem_proto::Packet::new(PacketKind::Barrier, round, Vec::new()).encode()?)
}
