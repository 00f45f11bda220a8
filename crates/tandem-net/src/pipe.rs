// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered scalar stream over a [`Transport`].
//!
//! The master writes scalars into an outgoing buffer and [`Pipe::flush`]
//! seals it into one data packet. Slaves read scalars back in the same
//! order, pulling the next packet when the current one is exhausted. Data
//! packets carry a sequence number that starts at zero and increases by one;
//! anything else is [`TransportError::OutOfOrder`].

use tandem_proto::scalar::get_array;
use tandem_proto::{ClusterRole, FramePayload, Packet, PacketKind, Scalar, WireError};
use tracing::trace;

use crate::{Transport, TransportError};

/// Sequenced scalar stream.
pub struct Pipe<T: Transport> {
    transport: T,
    outgoing: Vec<u8>,
    incoming: Vec<u8>,
    cursor: usize,
    send_seq: u64,
    recv_seq: u64,
}

impl<T: Transport> Pipe<T> {
    /// Wraps a connected transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            cursor: 0,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    /// Role of the underlying transport.
    pub fn role(&self) -> ClusterRole {
        self.transport.role()
    }

    /// Shorthand for `role().is_master()`.
    pub fn is_master(&self) -> bool {
        self.role().is_master()
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport (e.g. to adjust its timeout).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn require(&self, role: ClusterRole) -> Result<(), TransportError> {
        let actual = self.role();
        if actual == role {
            Ok(())
        } else {
            Err(TransportError::WrongRole(actual))
        }
    }

    /// Master: appends one scalar to the outgoing packet.
    pub fn write<S: Scalar>(&mut self, value: S) -> Result<(), TransportError> {
        self.require(ClusterRole::Master)?;
        value.put(&mut self.outgoing);
        Ok(())
    }

    /// Master: appends a run of scalars.
    pub fn write_slice<S: Scalar>(&mut self, values: &[S]) -> Result<(), TransportError> {
        self.require(ClusterRole::Master)?;
        for &value in values {
            value.put(&mut self.outgoing);
        }
        Ok(())
    }

    /// Slave: reads the next scalar, blocking for the next packet if needed.
    pub fn read<S: Scalar>(&mut self) -> Result<S, TransportError> {
        self.require(ClusterRole::Slave)?;
        self.fill()?;
        let mut rd = &self.incoming[self.cursor..];
        let value = S::get(&mut rd)?;
        self.cursor = self.incoming.len() - rd.len();
        Ok(value)
    }

    /// Slave: reads a fixed-size array of scalars from the current packet.
    pub fn read_array<S: Scalar + Default, const N: usize>(
        &mut self,
    ) -> Result<[S; N], TransportError> {
        self.require(ClusterRole::Slave)?;
        self.fill()?;
        let mut rd = &self.incoming[self.cursor..];
        let values = get_array::<S, N>(&mut rd)?;
        self.cursor = self.incoming.len() - rd.len();
        Ok(values)
    }

    /// Master writes `*value`; slaves overwrite `*value` with what the master wrote.
    pub fn broadcast<S: Scalar>(&mut self, value: &mut S) -> Result<(), TransportError> {
        if self.is_master() {
            self.write(*value)
        } else {
            *value = self.read()?;
            Ok(())
        }
    }

    /// Master: seals buffered scalars into a packet and pushes it onto the wire.
    /// No-op on slaves.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        if !self.is_master() {
            return Ok(());
        }
        if !self.outgoing.is_empty() {
            let payload = std::mem::take(&mut self.outgoing);
            self.send_packet(payload)?;
        }
        self.transport.flush()
    }

    /// Master: sends one frame payload as its own packet.
    ///
    /// Any scalars still buffered go out first so stream order is preserved.
    pub fn send_frame(&mut self, frame: &FramePayload) -> Result<(), TransportError> {
        self.require(ClusterRole::Master)?;
        if !self.outgoing.is_empty() {
            let pending = std::mem::take(&mut self.outgoing);
            self.send_packet(pending)?;
        }
        let body = frame.to_bytes()?;
        self.send_packet(body)?;
        self.transport.flush()
    }

    /// Slave: receives and fully decodes the next frame payload.
    ///
    /// Nothing is returned until the whole packet has arrived and decoded, so
    /// a timeout mid-frame leaves the caller's state untouched.
    pub fn recv_frame(&mut self) -> Result<FramePayload, TransportError> {
        self.require(ClusterRole::Slave)?;
        if self.cursor < self.incoming.len() {
            return Err(WireError::TrailingBytes(self.incoming.len() - self.cursor).into());
        }
        let body = self.next_packet()?;
        Ok(FramePayload::from_bytes(&body)?)
    }

    /// Lock-step rendezvous for the current frame.
    pub fn barrier(&mut self) -> Result<(), TransportError> {
        self.flush()?;
        self.transport.barrier()
    }

    fn send_packet(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let seq = self.send_seq;
        let bytes = Packet::new(PacketKind::Data, seq, payload).encode()?;
        self.transport.send(&bytes)?;
        self.send_seq += 1;
        trace!(seq, len = bytes.len(), "data packet sent");
        Ok(())
    }

    fn next_packet(&mut self) -> Result<Vec<u8>, TransportError> {
        let raw = self.transport.recv()?;
        let packet = Packet::decode(&raw)?;
        if packet.header.kind != PacketKind::Data {
            return Err(TransportError::Unexpected(packet.header.kind));
        }
        if packet.header.seq != self.recv_seq {
            return Err(TransportError::OutOfOrder {
                expected: self.recv_seq,
                got: packet.header.seq,
            });
        }
        self.recv_seq += 1;
        trace!(seq = packet.header.seq, len = packet.payload.len(), "data packet received");
        Ok(packet.payload)
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        if self.cursor >= self.incoming.len() {
            self.incoming = self.next_packet()?;
            self.cursor = 0;
        }
        Ok(())
    }
}
