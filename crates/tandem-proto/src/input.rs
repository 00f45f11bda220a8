// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Input sub-message: device lifecycle commands, device poses, and UI events.
//!
//! Layout (all counts `u32` LE, see [`crate::scalar`]):
//!
//! ```text
//! num_commands, commands[]   tag u8 (1 = create, 2 = destroy) + body
//! num_devices,  devices[]    position f64[3], orientation f64[4],
//!                            num_buttons u32, buttons u8[],
//!                            num_valuators u32, valuators f64[]
//! num_events,   events[]     tag u8 (1 = text, 2 = control) + body
//! ```
//!
//! Commands are applied before the device states, so a device created this
//! frame already has its slot when its first pose arrives.

use bytes::{Buf, BufMut};

use crate::scalar::{get_array, get_len, get_str, put_array, put_len, put_str, Scalar};
use crate::WireError;

/// Upper bound on devices carried by one frame.
pub const MAX_DEVICES: usize = 1024;
/// Upper bound on buttons or valuators per device.
pub const MAX_DEVICE_CHANNELS: usize = 4096;
/// Upper bound on UI events per frame.
pub const MAX_EVENTS: usize = 65_536;
/// Upper bound on lifecycle commands per frame.
pub const MAX_COMMANDS: usize = 1024;
/// Upper bound on the byte length of any string field.
pub const MAX_STRING: usize = 64 * 1024;

const CMD_CREATE: u8 = 1;
const CMD_DESTROY: u8 = 2;
const EVT_TEXT: u8 = 1;
const EVT_CONTROL: u8 = 2;

/// Pose and channel state of one input device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    /// Device position in physical coordinates.
    pub position: [f64; 3],
    /// Orientation quaternion `(x, y, z, w)`.
    pub orientation: [f64; 4],
    /// Button states in slot order.
    pub buttons: Vec<bool>,
    /// Valuator values in slot order.
    pub valuators: Vec<f64>,
}

impl DeviceState {
    /// A device at the origin with identity orientation and the given channel layout.
    pub fn at_rest(num_buttons: usize, num_valuators: usize) -> Self {
        Self {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            buttons: vec![false; num_buttons],
            valuators: vec![0.0; num_valuators],
        }
    }
}

/// Device lifecycle change originated by the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Append a new device slot.
    Create {
        /// Human-readable device name.
        name: String,
        /// Number of buttons.
        num_buttons: u32,
        /// Number of valuators.
        num_valuators: u32,
    },
    /// Remove the device at `index`; later devices shift down by one.
    Destroy {
        /// Slot index of the device.
        index: u32,
    },
}

/// UI event produced on the master and replayed on every slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Text entered by the user.
    Text {
        /// UTF-8 text.
        text: String,
    },
    /// Editing/navigation key (cursor keys, backspace, confirm, ...).
    Control {
        /// Control code.
        code: u32,
        /// Whether the selection modifier was held.
        selection: bool,
    },
}

/// Everything the input side contributes to one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputFrame {
    /// Lifecycle commands in the order the master issued them.
    pub commands: Vec<DeviceCommand>,
    /// Device states in slot order, after applying `commands`.
    pub devices: Vec<DeviceState>,
    /// UI events in generation order.
    pub events: Vec<UiEvent>,
}

impl InputFrame {
    /// Appends the encoding of this sub-message to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), WireError> {
        check_limit("commands", self.commands.len(), MAX_COMMANDS)?;
        put_len(buf, self.commands.len())?;
        for cmd in &self.commands {
            match cmd {
                DeviceCommand::Create {
                    name,
                    num_buttons,
                    num_valuators,
                } => {
                    CMD_CREATE.put(buf);
                    put_str(buf, name)?;
                    num_buttons.put(buf);
                    num_valuators.put(buf);
                }
                DeviceCommand::Destroy { index } => {
                    CMD_DESTROY.put(buf);
                    index.put(buf);
                }
            }
        }

        check_limit("devices", self.devices.len(), MAX_DEVICES)?;
        put_len(buf, self.devices.len())?;
        for dev in &self.devices {
            put_array(buf, &dev.position);
            put_array(buf, &dev.orientation);
            check_limit("buttons", dev.buttons.len(), MAX_DEVICE_CHANNELS)?;
            put_len(buf, dev.buttons.len())?;
            for &b in &dev.buttons {
                b.put(buf);
            }
            check_limit("valuators", dev.valuators.len(), MAX_DEVICE_CHANNELS)?;
            put_len(buf, dev.valuators.len())?;
            for &v in &dev.valuators {
                v.put(buf);
            }
        }

        check_limit("events", self.events.len(), MAX_EVENTS)?;
        put_len(buf, self.events.len())?;
        for ev in &self.events {
            match ev {
                UiEvent::Text { text } => {
                    EVT_TEXT.put(buf);
                    put_str(buf, text)?;
                }
                UiEvent::Control { code, selection } => {
                    EVT_CONTROL.put(buf);
                    code.put(buf);
                    selection.put(buf);
                }
            }
        }
        Ok(())
    }

    /// Consumes one sub-message from `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        let num_commands = get_len(buf, "commands", MAX_COMMANDS)?;
        let mut commands = Vec::with_capacity(num_commands);
        for _ in 0..num_commands {
            let cmd = match u8::get(buf)? {
                CMD_CREATE => DeviceCommand::Create {
                    name: get_str(buf, MAX_STRING)?,
                    num_buttons: u32::get(buf)?,
                    num_valuators: u32::get(buf)?,
                },
                CMD_DESTROY => DeviceCommand::Destroy {
                    index: u32::get(buf)?,
                },
                tag => return Err(WireError::UnknownTag { what: "device command", tag }),
            };
            commands.push(cmd);
        }

        let num_devices = get_len(buf, "devices", MAX_DEVICES)?;
        let mut devices = Vec::with_capacity(num_devices);
        for _ in 0..num_devices {
            let position = get_array::<f64, 3>(buf)?;
            let orientation = get_array::<f64, 4>(buf)?;
            let nb = get_len(buf, "buttons", MAX_DEVICE_CHANNELS)?;
            let buttons = (0..nb).map(|_| bool::get(buf)).collect::<Result<Vec<_>, _>>()?;
            let nv = get_len(buf, "valuators", MAX_DEVICE_CHANNELS)?;
            let valuators = (0..nv).map(|_| f64::get(buf)).collect::<Result<Vec<_>, _>>()?;
            devices.push(DeviceState {
                position,
                orientation,
                buttons,
                valuators,
            });
        }

        let num_events = get_len(buf, "events", MAX_EVENTS)?;
        let mut events = Vec::with_capacity(num_events.min(1024));
        for _ in 0..num_events {
            let ev = match u8::get(buf)? {
                EVT_TEXT => UiEvent::Text {
                    text: get_str(buf, MAX_STRING)?,
                },
                EVT_CONTROL => UiEvent::Control {
                    code: u32::get(buf)?,
                    selection: bool::get(buf)?,
                },
                tag => return Err(WireError::UnknownTag { what: "ui event", tag }),
            };
            events.push(ev);
        }

        Ok(Self {
            commands,
            devices,
            events,
        })
    }
}

fn check_limit(what: &'static str, got: usize, limit: usize) -> Result<(), WireError> {
    if got > limit {
        return Err(WireError::LimitExceeded { what, limit, got });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> InputFrame {
        let mut wand = DeviceState::at_rest(2, 1);
        wand.position = [0.5, 1.25, -3.0];
        wand.buttons[1] = true;
        wand.valuators[0] = -0.75;
        InputFrame {
            commands: vec![DeviceCommand::Create {
                name: "wand".into(),
                num_buttons: 2,
                num_valuators: 1,
            }],
            devices: vec![DeviceState::at_rest(0, 0), wand],
            events: vec![
                UiEvent::Text { text: "héllo".into() },
                UiEvent::Control {
                    code: 7,
                    selection: true,
                },
            ],
        }
    }

    #[test]
    fn events_keep_generation_order() {
        let frame = sample();
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let mut rd = &buf[..];
        let back = InputFrame::decode(&mut rd).unwrap();
        assert!(rd.is_empty());
        assert_eq!(back, frame);
        assert!(matches!(back.events[0], UiEvent::Text { .. }));
    }

    #[test]
    fn unknown_event_tag_is_rejected() {
        let mut buf = Vec::new();
        InputFrame::default().encode(&mut buf).unwrap();
        // Patch the event count to 1 and append a bogus tag.
        let n = buf.len();
        buf[n - 4..].copy_from_slice(&1u32.to_le_bytes());
        buf.push(0xEE);
        let mut rd = &buf[..];
        assert_eq!(
            InputFrame::decode(&mut rd),
            Err(WireError::UnknownTag {
                what: "ui event",
                tag: 0xEE
            })
        );
    }

    #[test]
    fn oversized_device_count_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        0u32.put(&mut buf);
        u32::MAX.put(&mut buf);
        let mut rd = &buf[..];
        assert!(matches!(
            InputFrame::decode(&mut rd),
            Err(WireError::LimitExceeded { what: "devices", .. })
        ));
    }
}
