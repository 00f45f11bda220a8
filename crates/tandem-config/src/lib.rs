// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration for Tandem nodes: a JSON config service over pluggable
//! stores, plus the node settings schema and its startup validation.

pub mod config;
pub mod fs;
pub mod memory;
pub mod node;

pub use config::{ConfigError, ConfigService, ConfigStore};
pub use fs::FsConfigStore;
pub use memory::MemoryConfigStore;
pub use node::{DisplayConfig, NavMode, NodeConfig};
