// SPDX-License-Identifier: GPL-3.0-only

//! Single-partition MBR layout written before whole-device formats

use std::path::Path;
use std::sync::Arc;

use storage_contracts::{PartitionTableWriter, StorageError, StorageErrorKind};
use storage_types::{DiskLayout, PartitionEntry, PartitionScheme, PartitionTypeCode};
use tracing::{error, info};

pub const SECTOR_SIZE: u32 = 512;
/// First sector of the data partition, leaving 1 MiB for alignment
pub const SKIP_LBA: u64 = 2048;
pub const PARTITION_NAME: &str = "sdcard";

/// One active FAT32 partition spanning the rest of the disk.
pub fn single_partition_layout(device: &Path) -> DiskLayout {
    DiskLayout {
        device: device.to_path_buf(),
        scheme: PartitionScheme::Mbr,
        sector_size: SECTOR_SIZE,
        skip_lba: SKIP_LBA,
        num_lba: 0,
        partitions: vec![PartitionEntry {
            name: PARTITION_NAME.to_string(),
            active: true,
            kind: PartitionTypeCode::Fat32,
            len_kb: None,
        }],
    }
}

#[derive(Clone)]
pub struct MbrInitializer {
    writer: Arc<dyn PartitionTableWriter>,
}

impl MbrInitializer {
    pub fn new(writer: Arc<dyn PartitionTableWriter>) -> Self {
        Self { writer }
    }

    pub async fn initialize(&self, device: &Path) -> Result<(), StorageError> {
        let layout = single_partition_layout(device);
        self.writer.apply(&layout).await.map_err(|e| {
            error!("Failed to write MBR on {}: {}", device.display(), e.message);
            e.with_kind(StorageErrorKind::PartitionTableFailure)
        })?;
        info!("Wrote single-partition MBR on {}", device.display());
        Ok(())
    }
}
