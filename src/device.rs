//! Device control port and target addressing.
//!
//! The wire protocol for the relay hardware lives outside this crate; the
//! decision loop talks to it through `DeviceGroupManager`. Targets are
//! resolved once at configuration parse into an explicit variant instead of
//! probing device objects for outlet support at decision time.

use anyhow::{Result, anyhow};
use std::fmt;
use thiserror::Error;

/// A single controllable endpoint inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// A device switched as one unit.
    WholeDevice { device: String },
    /// One outlet on a multi-outlet device (power strip), zero-indexed.
    Outlet { device: String, index: u8 },
}

impl DeviceTarget {
    /// Parse a target string: `"plug-1"` or `"strip-2:3"` (device:outlet).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("Device target must not be empty"));
        }
        match trimmed.split_once(':') {
            None => Ok(DeviceTarget::WholeDevice {
                device: trimmed.to_string(),
            }),
            Some((device, index)) => {
                if device.is_empty() {
                    return Err(anyhow!("Device target '{trimmed}' is missing the device name"));
                }
                let index: u8 = index
                    .parse()
                    .map_err(|_| anyhow!("Invalid outlet index in target '{trimmed}'"))?;
                Ok(DeviceTarget::Outlet {
                    device: device.to_string(),
                    index,
                })
            }
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::WholeDevice { device } => f.write_str(device),
            DeviceTarget::Outlet { device, index } => write!(f, "{device}:{index}"),
        }
    }
}

/// Typed failure from a device command, caught per group by the decision
/// loop so one group's failure never aborts the others.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device '{device}' is unreachable: {detail}")]
    Unreachable { device: String, detail: String },
    #[error("device '{device}' rejected the command: {detail}")]
    CommandRejected { device: String, detail: String },
    #[error("device '{device}' reported no usable state")]
    StateUnavailable { device: String },
}

/// Port to the relay-control layer.
///
/// `get_state` reports true when any constituent target is energized; the
/// decision loop treats that as the group being ON.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceGroupManager: Send {
    fn turn_on(&mut self, group: &str, targets: &[DeviceTarget]) -> Result<(), DeviceError>;
    fn turn_off(&mut self, group: &str, targets: &[DeviceTarget]) -> Result<(), DeviceError>;
    fn get_state(&mut self, group: &str, targets: &[DeviceTarget]) -> Result<bool, DeviceError>;
}

/// In-memory device manager for commissioning and dry runs.
///
/// Tracks on/off state per group and logs every command instead of driving
/// hardware. The binary wires this in until a real protocol client is
/// provided through [`crate::Meltr::with_devices`].
#[derive(Default)]
pub struct VirtualDeviceManager {
    states: std::collections::HashMap<String, bool>,
}

impl VirtualDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceGroupManager for VirtualDeviceManager {
    fn turn_on(&mut self, group: &str, targets: &[DeviceTarget]) -> Result<(), DeviceError> {
        log_decorated!("[virtual] ON  {} ({} target(s))", group, targets.len());
        self.states.insert(group.to_string(), true);
        Ok(())
    }

    fn turn_off(&mut self, group: &str, targets: &[DeviceTarget]) -> Result<(), DeviceError> {
        log_decorated!("[virtual] OFF {} ({} target(s))", group, targets.len());
        self.states.insert(group.to_string(), false);
        Ok(())
    }

    fn get_state(&mut self, group: &str, _targets: &[DeviceTarget]) -> Result<bool, DeviceError> {
        Ok(self.states.get(group).copied().unwrap_or(false))
    }
}
