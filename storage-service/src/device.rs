// SPDX-License-Identifier: GPL-3.0-only

//! Device classes backing a volume

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use storage_contracts::{StorageError, StorageErrorKind};
use storage_types::{BlockAction, BlockDeviceKind, BlockEvent, DeviceNumber, PartitionIndex};
use tracing::{debug, info, warn};

/// What a block event meant for the device, for the volume to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEventOutcome {
    /// The event concerns another device
    Ignored,
    /// The disk appeared, announcing `pending_partitions` partitions to come
    MediaInserted { pending_partitions: u32 },
    /// The disk was re-read, e.g. after a partition table change
    MediaChanged { pending_partitions: u32 },
    MediaRemoved,
    /// `complete` is set once every announced partition has arrived
    PartitionAdded { device: DeviceNumber, complete: bool },
    PartitionRemoved { device: DeviceNumber },
}

/// Operations a volume needs from its device class.
pub trait VolumeDevice: Send + Sync {
    /// Whole-disk device number, or the decrypted mapping while bound
    fn disk(&self) -> DeviceNumber;

    /// Candidate nodes for mounting, at most `max`.
    fn device_nodes(&self, max: usize) -> Result<Vec<DeviceNumber>, StorageError>;

    /// Re-point the device at a decrypted mapping.
    fn update_device_info(&mut self, sys_path: &Path, device: DeviceNumber);

    /// Undo [`update_device_info`](Self::update_device_info).
    fn revert_device_info(&mut self);

    fn is_decrypted(&self) -> bool;

    fn handle_block_event(
        &mut self,
        event: &BlockEvent,
    ) -> Result<BlockEventOutcome, StorageError> {
        Err(StorageError::new(
            StorageErrorKind::NotImplemented,
            format!("{:?} events are not handled by this device", event.action),
        ))
    }
}

#[derive(Debug, Clone)]
struct DeviceInfo {
    sys_path: PathBuf,
    disk: DeviceNumber,
    partitions: BTreeMap<u32, DeviceNumber>,
}

/// A disk driven straight from kernel block events.
#[derive(Debug, Clone)]
pub struct DirectDevice {
    info: DeviceInfo,
    partition: PartitionIndex,
    pending_partitions: u32,
    /// Pre-decryption info while a mapping is bound
    original: Option<DeviceInfo>,
}

impl DirectDevice {
    pub fn new(disk: DeviceNumber, partition: PartitionIndex) -> Self {
        Self {
            info: DeviceInfo {
                sys_path: storage_sys::sysfs::sys_path(disk),
                disk,
                partitions: BTreeMap::new(),
            },
            partition,
            pending_partitions: 0,
            original: None,
        }
    }

    /// Seed partitions already present, numbered from 1.
    pub fn with_partitions(
        mut self,
        partitions: impl IntoIterator<Item = (u32, DeviceNumber)>,
    ) -> Self {
        self.info.partitions.extend(partitions);
        self
    }

    pub fn sys_path(&self) -> &Path {
        &self.info.sys_path
    }

    pub fn pending_partitions(&self) -> u32 {
        self.pending_partitions
    }

    fn owns_partition(&self, event: &BlockEvent) -> bool {
        let disk = self.original.as_ref().map_or(self.info.disk, |o| o.disk);
        if event.device.major != disk.major {
            return false;
        }
        if self.info.partitions.values().any(|d| *d == event.device) {
            return true;
        }
        event
            .partition_number
            .and_then(|n| disk.offset(n))
            .is_some_and(|device| device == event.device)
    }
}

impl VolumeDevice for DirectDevice {
    fn disk(&self) -> DeviceNumber {
        self.info.disk
    }

    fn device_nodes(&self, max: usize) -> Result<Vec<DeviceNumber>, StorageError> {
        let nodes: Vec<DeviceNumber> = if self.original.is_some() {
            vec![self.info.disk]
        } else {
            match self.partition {
                PartitionIndex::WholeDevice if self.info.partitions.is_empty() => {
                    vec![self.info.disk]
                }
                PartitionIndex::WholeDevice => {
                    self.info.partitions.values().copied().take(max).collect()
                }
                PartitionIndex::Index(n) => self
                    .info
                    .partitions
                    .get(&n)
                    .copied()
                    .or_else(|| self.info.disk.offset(n))
                    .into_iter()
                    .collect(),
            }
        };

        if nodes.is_empty() || max == 0 {
            return Err(StorageError::new(
                StorageErrorKind::DeviceEnumerationFailure,
                format!("no device nodes for disk {}", self.info.disk),
            ));
        }
        Ok(nodes)
    }

    fn update_device_info(&mut self, sys_path: &Path, device: DeviceNumber) {
        let decrypted = DeviceInfo {
            sys_path: sys_path.to_path_buf(),
            disk: device,
            partitions: BTreeMap::new(),
        };
        let previous = std::mem::replace(&mut self.info, decrypted);
        self.original.get_or_insert(previous);
        info!("Device now backed by decrypted mapping {device}");
    }

    fn revert_device_info(&mut self) {
        if let Some(original) = self.original.take() {
            info!("Device reverted to {}", original.disk);
            self.info = original;
        }
    }

    fn is_decrypted(&self) -> bool {
        self.original.is_some()
    }

    fn handle_block_event(
        &mut self,
        event: &BlockEvent,
    ) -> Result<BlockEventOutcome, StorageError> {
        let disk = self.original.as_ref().map_or(self.info.disk, |o| o.disk);

        let outcome = match event.kind {
            BlockDeviceKind::Disk if event.device != disk => BlockEventOutcome::Ignored,
            BlockDeviceKind::Disk => match event.action {
                BlockAction::Add => {
                    self.pending_partitions = event.partition_count.unwrap_or(0);
                    self.info.partitions.clear();
                    BlockEventOutcome::MediaInserted {
                        pending_partitions: self.pending_partitions,
                    }
                }
                BlockAction::Change => {
                    self.pending_partitions = event.partition_count.unwrap_or(0);
                    BlockEventOutcome::MediaChanged {
                        pending_partitions: self.pending_partitions,
                    }
                }
                BlockAction::Remove => {
                    self.pending_partitions = 0;
                    self.info.partitions.clear();
                    BlockEventOutcome::MediaRemoved
                }
            },
            BlockDeviceKind::Partition if !self.owns_partition(event) => {
                BlockEventOutcome::Ignored
            }
            BlockDeviceKind::Partition => match event.action {
                BlockAction::Add => {
                    let number = event
                        .partition_number
                        .unwrap_or(event.device.minor.saturating_sub(disk.minor));
                    self.info.partitions.insert(number, event.device);
                    self.pending_partitions = self.pending_partitions.saturating_sub(1);
                    BlockEventOutcome::PartitionAdded {
                        device: event.device,
                        complete: self.pending_partitions == 0,
                    }
                }
                BlockAction::Remove => {
                    self.info.partitions.retain(|_, d| *d != event.device);
                    BlockEventOutcome::PartitionRemoved {
                        device: event.device,
                    }
                }
                BlockAction::Change => {
                    debug!("Ignoring change of partition {}", event.device);
                    BlockEventOutcome::Ignored
                }
            },
        };

        if outcome != BlockEventOutcome::Ignored && self.original.is_some() {
            warn!("Block event {:?} while decrypted mapping is bound", event.action);
        }
        Ok(outcome)
    }
}
