// SPDX-License-Identifier: GPL-3.0-only

//! Partition table descriptors handed to the partition-table writer

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScheme {
    Mbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionTypeCode {
    /// W95 FAT32 (LBA)
    Fat32,
}

impl PartitionTypeCode {
    /// DOS partition type byte
    pub fn mbr_code(self) -> u8 {
        match self {
            Self::Fat32 => 0x0c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub name: String,
    pub active: bool,
    pub kind: PartitionTypeCode,
    /// Length in KiB; `None` spans the rest of the device
    pub len_kb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    pub device: PathBuf,
    pub scheme: PartitionScheme,
    pub sector_size: u32,
    /// Sectors reserved before the first partition
    pub skip_lba: u64,
    /// Total sectors; `0` means "whatever the device reports"
    pub num_lba: u64,
    pub partitions: Vec<PartitionEntry>,
}
