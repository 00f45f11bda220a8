// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use tandem_config::ConfigError;
use tandem_net::TransportError;
use tandem_proto::WireError;
use thiserror::Error;

use crate::viewpoint::ViewpointError;

/// Errors surfaced by a cluster node.
///
/// `TransportTimeout` and `Transport` are fatal: the cluster has lost
/// lock-step and the frame loop must stop.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A blocking pipe operation exceeded its timeout.
    #[error("cluster transport timed out")]
    TransportTimeout,
    /// Any other transport or decode failure.
    #[error("cluster transport failed: {0}")]
    Transport(TransportError),
    /// Invalid startup configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Operation is only allowed on the master.
    #[error("operation is only valid on the master node")]
    NotMaster,
    /// Replicated state on a slave no longer matches the master.
    #[error("replicated state diverged: {0}")]
    Divergence(String),
    /// Viewpoint file could not be read or written.
    #[error(transparent)]
    Viewpoint(#[from] ViewpointError),
}

impl From<TransportError> for ClusterError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::TransportTimeout,
            other => Self::Transport(other),
        }
    }
}

impl From<WireError> for ClusterError {
    fn from(err: WireError) -> Self {
        Self::Transport(TransportError::Wire(err))
    }
}

impl ClusterError {
    /// True when the error leaves the cluster out of lock-step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout | Self::Transport(_) | Self::Divergence(_)
        )
    }
}
