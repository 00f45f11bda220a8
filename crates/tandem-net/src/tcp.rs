// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocking TCP transport.
//!
//! The master listens and accepts exactly `num_slaves` connections; each
//! slave opens with a CBOR [`Hello`] and is answered with a [`HelloAck`].
//! Sockets run with `TCP_NODELAY` and read/write timeouts, so a stalled peer
//! surfaces as [`TransportError::Timeout`].

use std::io::{BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use tandem_proto::wire::{self, CHECKSUM_LEN, HEADER_LEN};
use tandem_proto::{
    AckStatus, ClusterRole, Hello, HelloAck, Packet, PacketHeader, PacketKind, PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use crate::{barrier_packet, check_barrier, Transport, TransportError};

const CLIENT_VERSION: u32 = 1;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reads one full packet (header, payload, checksum) from a stream.
///
/// Reads until a full frame header is buffered so short reads cannot
/// desynchronize framing.
pub fn read_packet(stream: &mut impl Read) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .map_err(TransportError::from_io)?;
    let parsed = PacketHeader::parse(&header)?;
    let mut packet = vec![0u8; HEADER_LEN + parsed.len + CHECKSUM_LEN];
    packet[..HEADER_LEN].copy_from_slice(&header);
    stream
        .read_exact(&mut packet[HEADER_LEN..])
        .map_err(TransportError::from_io)?;
    Ok(packet)
}

fn configure(stream: &TcpStream, timeout: Duration) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(())
}

/// Master end: one socket per slave, ordered by slave node index.
pub struct TcpMaster {
    writers: Vec<BufWriter<TcpStream>>,
    readers: Vec<TcpStream>,
    round: u64,
}

impl TcpMaster {
    /// Binds `addr` and waits up to `accept_timeout` for every slave to connect
    /// and complete the handshake.
    pub fn listen(
        addr: impl ToSocketAddrs,
        num_slaves: usize,
        accept_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = ?listener.local_addr().ok(), num_slaves, "cluster master listening");
        Self::accept_all(&listener, num_slaves, accept_timeout, timeout)
    }

    /// Same as [`TcpMaster::listen`] on an already bound listener.
    pub fn accept_all(
        listener: &TcpListener,
        num_slaves: usize,
        accept_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        listener.set_nonblocking(true)?;
        let expected = u32::try_from(num_slaves)
            .map_err(|_| TransportError::Handshake(format!("too many slaves: {num_slaves}")))?;
        let deadline = Instant::now() + accept_timeout;
        let mut slots: Vec<Option<TcpStream>> = (0..num_slaves).map(|_| None).collect();
        let mut joined = 0usize;
        while joined < num_slaves {
            let (mut stream, peer) = match listener.accept() {
                Ok(conn) => conn,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            stream.set_nonblocking(false)?;
            configure(&stream, timeout)?;
            let hello: Hello = match read_packet(&mut stream).and_then(|raw| {
                let packet = Packet::decode(&raw)?;
                if packet.header.kind != PacketKind::Hello {
                    return Err(TransportError::Unexpected(packet.header.kind));
                }
                Ok(wire::from_cbor::<Hello>(&packet.payload)?)
            }) {
                Ok(hello) => hello,
                Err(err) => {
                    warn!(%peer, error = %err, "dropping connection without a valid hello");
                    continue;
                }
            };
            let index = hello.node_index as usize;
            let reject = if hello.protocol_version != PROTOCOL_VERSION {
                Some(format!(
                    "protocol version {} != {}",
                    hello.protocol_version, PROTOCOL_VERSION
                ))
            } else if index >= num_slaves {
                Some(format!("node index {index} out of range 0..{num_slaves}"))
            } else if slots[index].is_some() {
                Some(format!("node index {index} already joined"))
            } else {
                None
            };
            if let Some(reason) = reject {
                warn!(%peer, %reason, "rejecting slave");
                let ack =
                    wire::encode_cbor(PacketKind::HelloAck, 0, &HelloAck::reject(expected, reason))?;
                let _ = stream.write_all(&ack);
                continue;
            }
            stream.write_all(&wire::encode_cbor(
                PacketKind::HelloAck,
                0,
                &HelloAck::ok(expected),
            )?)?;
            debug!(%peer, node_index = index, client_version = hello.client_version, "slave joined");
            slots[index] = Some(stream);
            joined += 1;
        }

        let mut writers = Vec::with_capacity(num_slaves);
        let mut readers = Vec::with_capacity(num_slaves);
        for stream in slots.into_iter().flatten() {
            readers.push(stream.try_clone()?);
            writers.push(BufWriter::new(stream));
        }
        info!(num_slaves, "all slaves joined");
        Ok(Self {
            writers,
            readers,
            round: 0,
        })
    }
}

impl Transport for TcpMaster {
    fn role(&self) -> ClusterRole {
        ClusterRole::Master
    }

    fn num_slaves(&self) -> usize {
        self.writers.len()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        for writer in &mut self.writers {
            writer.write_all(packet).map_err(TransportError::from_io)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::WrongRole(ClusterRole::Master))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        for writer in &mut self.writers {
            writer.flush().map_err(TransportError::from_io)?;
        }
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.flush()?;
        for reader in &mut self.readers {
            let raw = read_packet(reader)?;
            check_barrier(&raw, self.round)?;
        }
        self.round += 1;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        for (index, reader) in self.readers.iter().enumerate() {
            configure(reader, timeout).inspect_err(|err| {
                warn!(slave = index, error = %err, "failed to apply socket timeout");
            })?;
        }
        Ok(())
    }
}

/// Slave end: a single socket to the master.
pub struct TcpSlave {
    stream: TcpStream,
    num_slaves: usize,
    round: u64,
}

impl TcpSlave {
    /// Connects to the master, retrying until `connect_timeout` elapses
    /// (slaves may start before the master), then performs the handshake.
    pub fn connect(
        addr: impl ToSocketAddrs,
        node_index: u32,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        let deadline = Instant::now() + connect_timeout;
        let mut stream = loop {
            let attempt = addrs
                .iter()
                .find_map(|a| TcpStream::connect_timeout(a, POLL_INTERVAL.max(timeout)).ok());
            if let Some(stream) = attempt {
                break stream;
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        };
        configure(&stream, timeout)?;

        let hello = Hello {
            node_index,
            protocol_version: PROTOCOL_VERSION,
            client_version: CLIENT_VERSION,
        };
        stream.write_all(&wire::encode_cbor(PacketKind::Hello, 0, &hello)?)?;
        let raw = read_packet(&mut stream)?;
        let packet = Packet::decode(&raw)?;
        if packet.header.kind != PacketKind::HelloAck {
            return Err(TransportError::Unexpected(packet.header.kind));
        }
        let ack: HelloAck = wire::from_cbor(&packet.payload)?;
        if ack.status != AckStatus::Ok {
            return Err(TransportError::Handshake(
                ack.message.unwrap_or_else(|| "rejected by master".into()),
            ));
        }
        info!(node_index, num_slaves = ack.num_slaves, "joined cluster");
        Ok(Self {
            stream,
            num_slaves: ack.num_slaves as usize,
            round: 0,
        })
    }
}

impl Transport for TcpSlave {
    fn role(&self) -> ClusterRole {
        ClusterRole::Slave
    }

    fn num_slaves(&self) -> usize {
        self.num_slaves
    }

    fn send(&mut self, _packet: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::WrongRole(ClusterRole::Slave))
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        read_packet(&mut self.stream)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.stream.flush().map_err(TransportError::from_io)
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.stream
            .write_all(&barrier_packet(self.round)?)
            .map_err(TransportError::from_io)?;
        self.round += 1;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        configure(&self.stream, timeout).inspect_err(|err| {
            warn!(error = %err, "failed to apply socket timeout");
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spawn_master(
        num_slaves: usize,
    ) -> (SocketAddr, thread::JoinHandle<Result<TcpMaster, TransportError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            TcpMaster::accept_all(
                &listener,
                num_slaves,
                Duration::from_secs(5),
                Duration::from_secs(5),
            )
        });
        (addr, handle)
    }

    #[test]
    fn packets_and_barrier_cross_a_real_socket() {
        let (addr, handle) = spawn_master(1);
        let mut slave =
            TcpSlave::connect(addr, 0, Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let mut master = handle.join().unwrap().unwrap();
        assert_eq!(slave.num_slaves(), 1);

        let pkt = Packet::new(PacketKind::Data, 0, vec![1, 2, 3]).encode().unwrap();
        master.send(&pkt).unwrap();
        master.flush().unwrap();
        assert_eq!(slave.recv().unwrap(), pkt);

        slave.barrier().unwrap();
        master.barrier().unwrap();
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let (addr, handle) = spawn_master(1);
        let err = TcpSlave::connect(addr, 4, Duration::from_secs(5), Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Handshake(_)), "{err}");
        // Let the master finish so the thread does not outlive the test.
        let _slave =
            TcpSlave::connect(addr, 0, Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn silent_master_times_out_slave_read() {
        let (addr, handle) = spawn_master(1);
        let mut slave =
            TcpSlave::connect(addr, 0, Duration::from_secs(5), Duration::from_millis(50)).unwrap();
        let _master = handle.join().unwrap().unwrap();
        assert!(slave.recv().unwrap_err().is_timeout());
    }

    #[test]
    fn set_timeout_reaches_the_socket() {
        let (addr, handle) = spawn_master(1);
        let mut slave =
            TcpSlave::connect(addr, 0, Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let mut master = handle.join().unwrap().unwrap();

        slave.set_timeout(Duration::from_millis(250)).unwrap();
        master.set_timeout(Duration::from_millis(250)).unwrap();
        assert_eq!(
            slave.stream.read_timeout().unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            master.readers[0].read_timeout().unwrap(),
            Some(Duration::from_millis(250))
        );

        // A zero timeout is refused by the socket and reported.
        assert!(slave.set_timeout(Duration::ZERO).is_err());
        assert!(master.set_timeout(Duration::ZERO).is_err());
    }
}
