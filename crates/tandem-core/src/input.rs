// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Input replication.
//!
//! The master captures device states and UI events once per frame; slaves
//! overwrite their device mirrors with the snapshot and replay the events in
//! the master's order. Creating and destroying devices is master-only and
//! travels in the same payload ahead of the snapshot, so slot indices match
//! on every node.

use std::collections::VecDeque;

use tandem_proto::{ClusterRole, DeviceCommand, DeviceState, InputFrame, UiEvent};
use tracing::debug;

use crate::error::ClusterError;

/// Local owner of input devices and the UI event queue.
pub trait DeviceManager {
    /// Number of device slots.
    fn num_devices(&self) -> usize;

    /// Master: device states in slot order plus events raised since the
    /// previous capture. `commands` in the result is ignored.
    fn capture(&mut self) -> InputFrame;

    /// Slave: overwrite device states with `frame.devices` and queue
    /// `frame.events` for dispatch. Commands have already been applied.
    fn apply(&mut self, frame: &InputFrame);

    /// Appends a device slot and returns its index.
    fn create_device(&mut self, name: &str, num_buttons: usize, num_valuators: usize) -> usize;

    /// Removes the slot at `index`; later slots shift down. `false` if out of range.
    fn destroy_device(&mut self, index: usize) -> bool;
}

#[derive(Debug, Clone)]
struct Device {
    name: String,
    state: DeviceState,
}

/// In-memory device mirror plus FIFO event queue.
#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: Vec<Device>,
    raised: Vec<UiEvent>,
    ready: VecDeque<UiEvent>,
}

impl DeviceTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the device at `index`.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.devices.get(index).map(|d| d.name.as_str())
    }

    /// State of the device at `index`.
    pub fn state(&self, index: usize) -> Option<&DeviceState> {
        self.devices.get(index).map(|d| &d.state)
    }

    /// Mutable state of the device at `index` (master-side device drivers).
    pub fn state_mut(&mut self, index: usize) -> Option<&mut DeviceState> {
        self.devices.get_mut(index).map(|d| &mut d.state)
    }

    /// Raises a UI event; it is dispatched locally and broadcast with the next capture.
    pub fn push_event(&mut self, event: UiEvent) {
        self.raised.push(event);
    }

    /// Drains events ready for local dispatch, oldest first.
    pub fn take_events(&mut self) -> Vec<UiEvent> {
        self.ready.drain(..).collect()
    }
}

impl DeviceManager for DeviceTable {
    fn num_devices(&self) -> usize {
        self.devices.len()
    }

    fn capture(&mut self) -> InputFrame {
        let events = std::mem::take(&mut self.raised);
        self.ready.extend(events.iter().cloned());
        InputFrame {
            commands: Vec::new(),
            devices: self.devices.iter().map(|d| d.state.clone()).collect(),
            events,
        }
    }

    fn apply(&mut self, frame: &InputFrame) {
        for (device, state) in self.devices.iter_mut().zip(&frame.devices) {
            device.state.clone_from(state);
        }
        self.ready.extend(frame.events.iter().cloned());
    }

    fn create_device(&mut self, name: &str, num_buttons: usize, num_valuators: usize) -> usize {
        self.devices.push(Device {
            name: name.to_owned(),
            state: DeviceState::at_rest(num_buttons, num_valuators),
        });
        self.devices.len() - 1
    }

    fn destroy_device(&mut self, index: usize) -> bool {
        if index < self.devices.len() {
            self.devices.remove(index);
            true
        } else {
            false
        }
    }
}

/// Routes device lifecycle changes and snapshots through the frame payload.
#[derive(Debug)]
pub struct InputSynchronizer<D> {
    role: ClusterRole,
    devices: D,
    queued: Vec<DeviceCommand>,
}

impl<D: DeviceManager> InputSynchronizer<D> {
    /// Wraps the local device manager.
    pub fn new(role: ClusterRole, devices: D) -> Self {
        Self {
            role,
            devices,
            queued: Vec::new(),
        }
    }

    /// Local device manager.
    pub fn devices(&self) -> &D {
        &self.devices
    }

    /// Mutable local device manager.
    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }

    /// Master: creates a device now and queues the command for slaves.
    pub fn create_device(
        &mut self,
        name: &str,
        num_buttons: u32,
        num_valuators: u32,
    ) -> Result<usize, ClusterError> {
        if !self.role.is_master() {
            return Err(ClusterError::NotMaster);
        }
        let index = self
            .devices
            .create_device(name, num_buttons as usize, num_valuators as usize);
        self.queued.push(DeviceCommand::Create {
            name: name.to_owned(),
            num_buttons,
            num_valuators,
        });
        debug!(index, name, "device created");
        Ok(index)
    }

    /// Master: destroys a device now and queues the command for slaves.
    /// Returns `false` when no device has that index.
    pub fn destroy_device(&mut self, index: usize) -> Result<bool, ClusterError> {
        if !self.role.is_master() {
            return Err(ClusterError::NotMaster);
        }
        let wire_index = u32::try_from(index)
            .map_err(|_| ClusterError::Divergence(format!("device index {index} out of range")))?;
        if !self.devices.destroy_device(index) {
            return Ok(false);
        }
        self.queued.push(DeviceCommand::Destroy { index: wire_index });
        debug!(index, "device destroyed");
        Ok(true)
    }

    /// Master: the input part of this frame's payload.
    pub fn capture(&mut self) -> InputFrame {
        let mut frame = self.devices.capture();
        frame.commands = std::mem::take(&mut self.queued);
        frame
    }

    /// Slave: checks the commands and the device count against the local
    /// mirror, then replays the commands and applies the snapshot. A rejected
    /// frame leaves the mirror untouched.
    pub fn apply(&mut self, frame: &InputFrame) -> Result<(), ClusterError> {
        let mut count = self.devices.num_devices();
        for command in &frame.commands {
            match command {
                DeviceCommand::Create { .. } => count += 1,
                DeviceCommand::Destroy { index } => {
                    if *index as usize >= count {
                        return Err(ClusterError::Divergence(format!(
                            "master destroyed device {index} which does not exist locally"
                        )));
                    }
                    count -= 1;
                }
            }
        }
        if count != frame.devices.len() {
            return Err(ClusterError::Divergence(format!(
                "snapshot has {} devices, local mirror would have {count}",
                frame.devices.len()
            )));
        }

        for command in &frame.commands {
            match command {
                DeviceCommand::Create {
                    name,
                    num_buttons,
                    num_valuators,
                } => {
                    self.devices
                        .create_device(name, *num_buttons as usize, *num_valuators as usize);
                }
                DeviceCommand::Destroy { index } => {
                    self.devices.destroy_device(*index as usize);
                }
            }
        }
        self.devices.apply(frame);
        Ok(())
    }
}
