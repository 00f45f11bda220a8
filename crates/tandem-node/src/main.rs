// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tandem cluster node: loads node settings, joins the cluster as master or
//! slave, and runs the lock-step frame loop until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tandem_config::{ConfigService, FsConfigStore, NodeConfig};
use tandem_core::{ClusterNode, DeviceTable};
use tandem_net::tcp::{TcpMaster, TcpSlave};
use tandem_net::{loopback, Pipe, Transport};
use tandem_proto::ClusterRole;
use tracing::{error, info, warn};

const STATUS_EVERY: u64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Config (best-effort)
    let config: Option<ConfigService<FsConfigStore>> =
        FsConfigStore::new().map(ConfigService::new).ok();
    let settings = load_settings(config.as_ref());
    settings
        .validate()
        .context("invalid node configuration")?;

    if settings.inhibit_screen_saver {
        warn!("screen-saver inhibition is not available; continuing without it");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current frame");
            signal_stop.store(true, Ordering::SeqCst);
        }
    });

    let worker_stop = Arc::clone(&stop);
    tokio::task::spawn_blocking(move || run(settings, &worker_stop))
        .await
        .context("frame loop worker panicked")?
}

fn load_settings(config: Option<&ConfigService<FsConfigStore>>) -> NodeConfig {
    let Some(cfg) = config else {
        warn!("config store unavailable; using default node settings");
        return NodeConfig::default();
    };
    // Persist defaults once if absent
    match cfg.load_or_init::<NodeConfig>(NodeConfig::KEY) {
        Ok((settings, created)) => {
            if created {
                info!(key = NodeConfig::KEY, "wrote default node settings");
            }
            settings
        }
        Err(err) => {
            warn!(%err, "node settings unreadable; using defaults");
            NodeConfig::default()
        }
    }
}

fn connect(settings: &NodeConfig) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match settings.role {
        ClusterRole::Master if settings.num_slaves == 0 => {
            info!("no slaves configured; running as a single node");
            let (master, _) = loopback::cluster(0, settings.timeout());
            Box::new(master)
        }
        ClusterRole::Master => Box::new(
            TcpMaster::listen(
                settings.listen_addr.as_str(),
                settings.num_slaves as usize,
                settings.connect_timeout(),
                settings.timeout(),
            )
            .context("cluster master failed to assemble")?,
        ),
        ClusterRole::Slave => Box::new(
            TcpSlave::connect(
                settings.master_addr.as_str(),
                settings.node_index,
                settings.connect_timeout(),
                settings.timeout(),
            )
            .context("cluster slave failed to join")?,
        ),
    };
    Ok(transport)
}

fn run(settings: NodeConfig, stop: &AtomicBool) -> Result<()> {
    let transport = connect(&settings)?;
    let max_frames = settings.max_frames;
    let mut node = ClusterNode::open(settings, Pipe::new(transport), DeviceTable::new())
        .context("failed to open cluster node")?;

    while !stop.load(Ordering::SeqCst) && max_frames.is_none_or(|max| node.frame_number() < max) {
        match node.frame() {
            Ok(info) if info.frame_number % STATUS_EVERY == 0 => {
                info!(
                    frame = info.frame_number,
                    median_ms = info.median_frame_time * 1000.0,
                    "frame loop running"
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!(
                    %err,
                    fatal = err.is_fatal(),
                    frame = node.frame_number(),
                    "cluster frame failed"
                );
                return Err(err.into());
            }
        }
    }
    node.close()?;
    Ok(())
}
