// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process transport built on std channels.
//!
//! Each node end can be moved to its own thread; [`cluster`] wires one
//! master to `num_slaves` slaves.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tandem_proto::ClusterRole;

use crate::{barrier_packet, check_barrier, Transport, TransportError};

/// Master end of a loopback cluster.
pub struct LoopbackMaster {
    to_slaves: Vec<Sender<Vec<u8>>>,
    acks: Vec<Receiver<Vec<u8>>>,
    timeout: Duration,
    round: u64,
}

/// Slave end of a loopback cluster.
pub struct LoopbackSlave {
    index: usize,
    num_slaves: usize,
    from_master: Receiver<Vec<u8>>,
    ack: Sender<Vec<u8>>,
    timeout: Duration,
    round: u64,
}

/// Builds a connected master and its slaves, in node-index order.
pub fn cluster(num_slaves: usize, timeout: Duration) -> (LoopbackMaster, Vec<LoopbackSlave>) {
    let mut to_slaves = Vec::with_capacity(num_slaves);
    let mut acks = Vec::with_capacity(num_slaves);
    let mut slaves = Vec::with_capacity(num_slaves);
    for index in 0..num_slaves {
        let (data_tx, data_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        to_slaves.push(data_tx);
        acks.push(ack_rx);
        slaves.push(LoopbackSlave {
            index,
            num_slaves,
            from_master: data_rx,
            ack: ack_tx,
            timeout,
            round: 0,
        });
    }
    let master = LoopbackMaster {
        to_slaves,
        acks,
        timeout,
        round: 0,
    };
    (master, slaves)
}

fn recv_within(rx: &Receiver<Vec<u8>>, timeout: Duration) -> Result<Vec<u8>, TransportError> {
    rx.recv_timeout(timeout).map_err(|err| match err {
        RecvTimeoutError::Timeout => TransportError::Timeout,
        RecvTimeoutError::Disconnected => TransportError::Disconnected,
    })
}

impl Transport for LoopbackMaster {
    fn role(&self) -> ClusterRole {
        ClusterRole::Master
    }

    fn num_slaves(&self) -> usize {
        self.to_slaves.len()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        for tx in &self.to_slaves {
            tx.send(packet.to_vec())
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::WrongRole(ClusterRole::Master))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        for rx in &self.acks {
            let raw = recv_within(rx, self.timeout)?;
            check_barrier(&raw, self.round)?;
        }
        self.round += 1;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }
}

impl LoopbackSlave {
    /// Node index of this slave.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Transport for LoopbackSlave {
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
        recv_within(&self.from_master, self.timeout)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.ack
            .send(barrier_packet(self.round)?)
            .map_err(|_| TransportError::Disconnected)?;
        self.round += 1;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn every_slave_sees_every_packet() {
        let (mut master, slaves) = cluster(3, Duration::from_secs(1));
        master.send(b"abc").unwrap();
        for mut slave in slaves {
            assert_eq!(slave.recv().unwrap(), b"abc".to_vec());
        }
    }

    #[test]
    fn master_barrier_waits_for_all_slaves() {
        let (mut master, slaves) = cluster(2, Duration::from_secs(2));
        let handles: Vec<_> = slaves
            .into_iter()
            .map(|mut s| thread::spawn(move || s.barrier()))
            .collect();
        master.barrier().unwrap();
        for h in handles {
            h.join().unwrap().unwrap();
        }
    }

    #[test]
    fn missing_ack_times_out() {
        let (mut master, _slaves) = cluster(1, Duration::from_millis(20));
        assert!(master.barrier().unwrap_err().is_timeout());
    }

    #[test]
    fn slave_recv_times_out_when_master_is_silent() {
        let (_master, mut slaves) = cluster(1, Duration::from_millis(20));
        assert!(slaves[0].recv().unwrap_err().is_timeout());
    }

    #[test]
    fn dropped_master_is_a_disconnect() {
        let (master, mut slaves) = cluster(1, Duration::from_secs(1));
        drop(master);
        assert!(matches!(
            slaves[0].recv(),
            Err(TransportError::Disconnected)
        ));
    }
}
