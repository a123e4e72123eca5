// SPDX-License-Identifier: GPL-3.0-only

//! Block device identity and hotplug event models

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kernel `major:minor` pair identifying a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceNumber {
    pub major: u32,
    pub minor: u32,
}

impl DeviceNumber {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Canonical device node path under `dir`, named `major:minor`
    pub fn node_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }

    /// Same major, minor shifted by `offset` (partition N of a disk).
    ///
    /// `None` when the minor would overflow.
    pub fn offset(&self, offset: u32) -> Option<Self> {
        let minor = self.minor.checked_add(offset)?;
        Some(Self {
            major: self.major,
            minor,
        })
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device number '{0}', expected major:minor")]
pub struct ParseDeviceNumberError(pub String);

impl FromStr for DeviceNumber {
    type Err = ParseDeviceNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ParseDeviceNumberError(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| ParseDeviceNumberError(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| ParseDeviceNumberError(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for DeviceNumber {
    type Error = ParseDeviceNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceNumber> for String {
    fn from(value: DeviceNumber) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    Add,
    Remove,
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockDeviceKind {
    Disk,
    Partition,
}

/// A kernel block-subsystem hotplug event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub action: BlockAction,
    pub kind: BlockDeviceKind,
    pub device: DeviceNumber,
    pub dev_path: String,
    /// `NPARTS` of a disk event
    pub partition_count: Option<u32>,
    /// `PARTN` of a partition event
    pub partition_number: Option<u32>,
}

impl BlockEvent {
    /// Parse a uevent payload of `KEY=VALUE` records separated by NUL or newline.
    ///
    /// Returns `None` for events outside the block subsystem or missing the
    /// fields needed to identify the device.
    pub fn from_uevent(payload: &str) -> Option<Self> {
        let mut action = None;
        let mut kind = None;
        let mut major = None;
        let mut minor = None;
        let mut dev_path = String::new();
        let mut partition_count = None;
        let mut partition_number = None;
        let mut subsystem = None;

        for record in payload.split(['\0', '\n']) {
            let Some((key, value)) = record.split_once('=') else {
                continue;
            };
            match key {
                "ACTION" => {
                    action = match value {
                        "add" => Some(BlockAction::Add),
                        "remove" => Some(BlockAction::Remove),
                        "change" => Some(BlockAction::Change),
                        _ => None,
                    }
                }
                "DEVTYPE" => {
                    kind = match value {
                        "disk" => Some(BlockDeviceKind::Disk),
                        "partition" => Some(BlockDeviceKind::Partition),
                        _ => None,
                    }
                }
                "SUBSYSTEM" => subsystem = Some(value.to_string()),
                "MAJOR" => major = value.parse().ok(),
                "MINOR" => minor = value.parse().ok(),
                "DEVPATH" => dev_path = value.to_string(),
                "NPARTS" => partition_count = value.parse().ok(),
                "PARTN" => partition_number = value.parse().ok(),
                _ => {}
            }
        }

        if subsystem.as_deref().is_some_and(|s| s != "block") {
            return None;
        }

        Some(Self {
            action: action?,
            kind: kind?,
            device: DeviceNumber::new(major?, minor?),
            dev_path,
            partition_count,
            partition_number,
        })
    }
}
