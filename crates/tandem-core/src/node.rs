// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-node cluster context.
//!
//! A [`ClusterNode`] owns everything one node replicates: the frame clock,
//! navigation state, input mirror and random generator, plus the pipe they
//! travel over. [`ClusterNode::frame`] runs one lock-step frame:
//!
//! 1. master ticks the clock; slave waits for the master's frame payload;
//! 2. master commits staged navigation, captures input and broadcasts;
//!    slave applies the fully decoded payload (or nothing, on error);
//! 3. due timers fire, then frame callbacks run;
//! 4. all nodes meet at the barrier.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tandem_config::{ConfigError, NodeConfig};
use tandem_net::{Pipe, Transport};
use tandem_proto::{ClusterRole, FramePayload};
use tracing::{debug, info};

use crate::callbacks::{FrameCallbacks, FrameInfo};
use crate::clock::{FrameClock, MonotonicClock, TimeSource};
use crate::error::ClusterError;
use crate::input::{DeviceManager, InputSynchronizer};
use crate::math::Prng;
use crate::nav::{DisplayFrame, NavigationManager};
use crate::timer::{TimerQueue, TimerScheduler};
use crate::viewpoint::Viewpoint;

/// One node of a render cluster.
pub struct ClusterNode<T: Transport, D: DeviceManager, S: TimeSource = MonotonicClock> {
    config: NodeConfig,
    pipe: Pipe<T>,
    clock: FrameClock<S>,
    nav: NavigationManager,
    input: InputSynchronizer<D>,
    callbacks: FrameCallbacks,
    timers: TimerQueue,
    rng: Prng,
    seed: u32,
    frame_number: u64,
}

impl<T: Transport, D: DeviceManager> ClusterNode<T, D> {
    /// Joins the cluster using the wall clock as the master's time source.
    pub fn open(config: NodeConfig, pipe: Pipe<T>, devices: D) -> Result<Self, ClusterError> {
        Self::open_with_clock(config, pipe, devices, MonotonicClock::new())
    }
}

impl<T: Transport, D: DeviceManager, S: TimeSource> ClusterNode<T, D, S> {
    /// Joins the cluster with an explicit time source.
    ///
    /// The master broadcasts the random seed, its initial frame time and its
    /// device count; a slave whose device manager disagrees on the count
    /// fails with [`ConfigError::DeviceCountMismatch`].
    pub fn open_with_clock(
        config: NodeConfig,
        mut pipe: Pipe<T>,
        devices: D,
        source: S,
    ) -> Result<Self, ClusterError> {
        config.validate()?;
        let role = pipe.role();
        if role != config.role {
            return Err(ConfigError::invalid(
                "role",
                format!("configured as {:?} but transport is {role:?}", config.role),
            )
            .into());
        }
        pipe.transport_mut().set_timeout(config.timeout())?;

        let mut clock = FrameClock::new(source, config.median_window)?;
        clock.set_maximum_frame_rate(config.maximum_frame_rate)?;
        clock.set_animation_frame_interval(config.animation_frame_interval);

        let mut seed = config.random_seed.unwrap_or_else(wall_clock_seed);
        pipe.broadcast(&mut seed)?;
        let mut origin = clock.frame_time();
        pipe.broadcast(&mut origin)?;
        clock.set_origin(origin);

        let local_devices = u32::try_from(devices.num_devices())
            .map_err(|_| ConfigError::invalid("devices", "too many input devices"))?;
        let mut master_devices = local_devices;
        pipe.broadcast(&mut master_devices)?;
        pipe.flush()?;
        if master_devices != local_devices {
            return Err(ConfigError::DeviceCountMismatch {
                master: master_devices,
                local: local_devices,
            }
            .into());
        }

        let mut nav = NavigationManager::new(
            role,
            config.navigation_mode,
            DisplayFrame::from(&config.display),
        );
        if role.is_master() {
            if let Some(path) = &config.viewpoint_file {
                let viewpoint = Viewpoint::read(path)?;
                nav.set_transformation(viewpoint.to_navigation(nav.display()));
                debug!(path = %path.display(), "initial viewpoint loaded");
            }
        }

        info!(
            ?role,
            seed,
            num_slaves = pipe.transport().num_slaves(),
            devices = local_devices,
            "cluster node open"
        );
        Ok(Self {
            config,
            pipe,
            clock,
            nav,
            input: InputSynchronizer::new(role, devices),
            callbacks: FrameCallbacks::new(),
            timers: TimerQueue::new(),
            rng: Prng::from_cluster_seed(seed),
            seed,
            frame_number: 0,
        })
    }

    /// Runs one lock-step frame.
    ///
    /// Any error is fatal for the session; on a slave, a failed receive
    /// leaves every replicated field as it was.
    pub fn frame(&mut self) -> Result<FrameInfo, ClusterError> {
        if self.pipe.is_master() {
            let timing = self.clock.tick();
            self.nav.commit_pending();
            let mask = self.nav.dirty();
            let mut payload = FramePayload {
                frame_time: timing.frame_time,
                median_frame_time: self.clock.median_frame_time(),
                input: self.input.capture(),
                ..FramePayload::default()
            };
            self.nav.write_groups(mask, &mut payload);
            self.pipe.send_frame(&payload)?;
            let _ = self.nav.take_dirty();
            if !mask.is_empty() {
                debug!(frame = self.frame_number, mask = mask.bits(), "broadcast dirty groups");
            }
        } else {
            let payload = self.pipe.recv_frame()?;
            self.input.apply(&payload.input)?;
            self.clock
                .adopt(payload.frame_time, payload.median_frame_time);
            self.nav.apply_remote(&payload);
        }

        let info = FrameInfo {
            frame_number: self.frame_number,
            frame_time: self.clock.frame_time(),
            frame_delta: self.clock.frame_delta(),
            median_frame_time: self.clock.median_frame_time(),
        };
        self.timers.trigger_due(info.frame_time);
        self.callbacks.run_all(&info);
        if self.config.lockstep_barrier {
            self.pipe.barrier()?;
        }
        self.frame_number += 1;
        Ok(info)
    }

    /// Wall-clock time agreed by the whole cluster: the master samples and
    /// broadcasts it, slaves read the master's value.
    pub fn time_of_day(&mut self) -> Result<SystemTime, ClusterError> {
        let sample = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut secs = i64::try_from(sample.as_secs()).unwrap_or(i64::MAX);
        let mut nanos = sample.subsec_nanos();
        self.pipe.broadcast(&mut secs)?;
        self.pipe.broadcast(&mut nanos)?;
        self.pipe.flush()?;
        let since_epoch = Duration::new(u64::try_from(secs).unwrap_or(0), nanos);
        Ok(UNIX_EPOCH + since_epoch)
    }

    /// Flushes outstanding data and leaves the cluster.
    pub fn close(mut self) -> Result<(), ClusterError> {
        self.pipe.flush()?;
        info!(frames = self.frame_number, "cluster node closed");
        Ok(())
    }

    /// Master or slave.
    pub fn role(&self) -> ClusterRole {
        self.pipe.role()
    }

    /// Seed every node's generator was initialised from.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Frames completed so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Settings this node was opened with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Frame timing.
    pub fn clock(&self) -> &FrameClock<S> {
        &self.clock
    }

    /// Frame timing controls (rate cap, playback synchronization, update requests).
    pub fn clock_mut(&mut self) -> &mut FrameClock<S> {
        &mut self.clock
    }

    /// Navigation state.
    pub fn navigation(&self) -> &NavigationManager {
        &self.nav
    }

    /// Navigation mutations; ignored on slaves.
    pub fn navigation_mut(&mut self) -> &mut NavigationManager {
        &mut self.nav
    }

    /// Frame callbacks.
    pub fn callbacks_mut(&mut self) -> &mut FrameCallbacks {
        &mut self.callbacks
    }

    /// Timers keyed on application time.
    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    /// Input devices and the replicated event queue.
    pub fn input(&self) -> &InputSynchronizer<D> {
        &self.input
    }

    /// Mutable input access (device lifecycle on the master).
    pub fn input_mut(&mut self) -> &mut InputSynchronizer<D> {
        &mut self.input
    }

    /// Cluster-seeded random generator.
    pub fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    /// Pipe for application data; master writes and slaves read in the same order.
    pub fn pipe_mut(&mut self) -> &mut Pipe<T> {
        &mut self.pipe
    }
}

#[allow(clippy::cast_possible_truncation)]
fn wall_clock_seed() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as u32) ^ now.subsec_nanos()
}
