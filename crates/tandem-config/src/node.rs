// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Settings for one cluster node, persisted under [`NodeConfig::KEY`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_proto::ClusterRole;

use crate::config::ConfigError;

/// How navigation changes reach the broadcast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NavMode {
    /// Every change applies immediately.
    Immediate,
    /// Changes are staged and committed once per frame.
    #[default]
    Deferred,
}

/// Physical display frame the navigation transform maps into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Center of the interesting region, physical coordinates.
    pub center: [f64; 3],
    /// Radius of the interesting region.
    pub size: f64,
    /// Viewer-forward direction.
    pub forward: [f64; 3],
    /// Up direction.
    pub up: [f64; 3],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 0.0],
            size: 1.0,
            forward: [0.0, 1.0, 0.0],
            up: [0.0, 0.0, 1.0],
        }
    }
}

/// Everything a node needs to join a cluster and pace its frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Master or slave.
    pub role: ClusterRole,
    /// Master: address to listen on.
    pub listen_addr: String,
    /// Slave: address of the master.
    pub master_addr: String,
    /// Slave: index in `0..num_slaves`.
    pub node_index: u32,
    /// Number of slaves the master waits for (0 = single-node).
    pub num_slaves: u32,
    /// Timeout for every blocking pipe operation.
    pub timeout_ms: u64,
    /// How long to wait for the cluster to assemble.
    pub connect_timeout_ms: u64,
    /// Frame-rate cap in Hz; 0 disables the cap.
    pub maximum_frame_rate: f64,
    /// Number of recent frame durations in the median filter.
    pub median_window: usize,
    /// Immediate or deferred navigation updates.
    pub navigation_mode: NavMode,
    /// Wait for every slave at the end of each frame.
    pub lockstep_barrier: bool,
    /// Fixed random seed; drawn from the wall clock when absent.
    pub random_seed: Option<u32>,
    /// Suggested interval between animation steps, in seconds.
    pub animation_frame_interval: f64,
    /// Viewpoint file loaded at startup.
    pub viewpoint_file: Option<PathBuf>,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Ask the desktop not to blank the screen while running.
    pub inhibit_screen_saver: bool,
    /// Display frame.
    pub display: DisplayConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: ClusterRole::Master,
            listen_addr: "0.0.0.0:26000".into(),
            master_addr: "127.0.0.1:26000".into(),
            node_index: 0,
            num_slaves: 0,
            timeout_ms: 5_000,
            connect_timeout_ms: 30_000,
            maximum_frame_rate: 0.0,
            median_window: 5,
            navigation_mode: NavMode::Deferred,
            lockstep_barrier: true,
            random_seed: None,
            animation_frame_interval: 1.0 / 125.0,
            viewpoint_file: None,
            max_frames: None,
            inhibit_screen_saver: false,
            display: DisplayConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Config-store key for node settings.
    pub const KEY: &'static str = "node";

    /// Pipe timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cluster assembly timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Checks ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.maximum_frame_rate.is_finite() || self.maximum_frame_rate < 0.0 {
            return Err(ConfigError::invalid(
                "maximum_frame_rate",
                format!("{} is not a non-negative rate", self.maximum_frame_rate),
            ));
        }
        if self.median_window == 0 {
            return Err(ConfigError::invalid("median_window", "must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be positive"));
        }
        if !self.animation_frame_interval.is_finite() || self.animation_frame_interval <= 0.0 {
            return Err(ConfigError::invalid(
                "animation_frame_interval",
                "must be a positive number of seconds",
            ));
        }
        if !(self.display.size.is_finite() && self.display.size > 0.0) {
            return Err(ConfigError::invalid("display.size", "must be positive"));
        }
        if self.role == ClusterRole::Slave {
            if self.num_slaves == 0 {
                return Err(ConfigError::invalid(
                    "num_slaves",
                    "a slave needs a cluster with at least one slave",
                ));
            }
            if self.node_index >= self.num_slaves {
                return Err(ConfigError::invalid(
                    "node_index",
                    format!("{} is outside 0..{}", self.node_index, self.num_slaves),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn negative_frame_rate_is_rejected() {
        let cfg = NodeConfig {
            maximum_frame_rate: -30.0,
            ..NodeConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "maximum_frame_rate",
                ..
            })
        ));
    }

    #[test]
    fn slave_index_must_fit_cluster() {
        let cfg = NodeConfig {
            role: ClusterRole::Slave,
            num_slaves: 2,
            node_index: 2,
            ..NodeConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "node_index",
                ..
            })
        ));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: NodeConfig =
            serde_json::from_str(r#"{ "role": "slave", "num_slaves": 3, "node_index": 1 }"#)
                .unwrap();
        assert_eq!(cfg.role, ClusterRole::Slave);
        assert_eq!(cfg.median_window, 5);
        assert_eq!(cfg.navigation_mode, NavMode::Deferred);
        cfg.validate().unwrap();
    }
}
