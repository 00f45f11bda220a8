// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use tandem_config::NodeConfig;
use tandem_core::{DeviceManager, DeviceTable};
use tandem_proto::ClusterRole;

pub fn master_config(num_slaves: u32) -> NodeConfig {
    NodeConfig {
        role: ClusterRole::Master,
        num_slaves,
        random_seed: Some(0x5EED),
        timeout_ms: 5_000,
        ..NodeConfig::default()
    }
}

pub fn slave_config(node_index: u32, num_slaves: u32) -> NodeConfig {
    NodeConfig {
        role: ClusterRole::Slave,
        node_index,
        num_slaves,
        timeout_ms: 5_000,
        ..NodeConfig::default()
    }
}

/// Device table pre-populated with `count` plain devices, as both ends
/// would have after reading the same input device layout.
pub fn devices(count: usize) -> DeviceTable {
    let mut table = DeviceTable::new();
    for i in 0..count {
        table.create_device(&format!("device-{i}"), 2, 1);
    }
    table
}
