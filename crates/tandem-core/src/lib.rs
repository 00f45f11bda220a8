// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! tandem-core: lock-step frame state for render clusters.
//!
//! One master node owns time, navigation and input; every slave mirrors
//! them once per frame over a [`tandem_net::Pipe`]. [`ClusterNode`] is the
//! per-node context that drives the frame sequence; the pieces it is built
//! from (clock, navigation, input, callbacks, timers) are usable on their own.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate
)]

pub mod callbacks;
pub mod clock;
pub mod input;
pub mod math;
pub mod nav;
pub mod node;
pub mod timer;
pub mod viewpoint;

mod error;

pub use callbacks::{CallbackAction, CallbackKey, FrameCallback, FrameCallbacks, FrameInfo};
pub use clock::{FrameClock, FrameTiming, ManualClock, MonotonicClock, TimeSource};
pub use error::ClusterError;
pub use input::{DeviceManager, DeviceTable, InputSynchronizer};
pub use math::{NavTransform, Prng, Quat, Vec3};
pub use nav::{DisplayFrame, NavigationManager, Side};
pub use node::ClusterNode;
pub use timer::{TimerCallback, TimerId, TimerQueue, TimerScheduler};
pub use viewpoint::{Viewpoint, ViewpointError};
