// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use async_trait::async_trait;

use storage_types::DeviceNumber;

use crate::StorageError;

/// A decrypted virtual block device standing in for a physical one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedDevice {
    pub sys_path: PathBuf,
    pub device: DeviceNumber,
}

#[async_trait]
pub trait EncryptionMapper: Send + Sync {
    async fn setup_volume(
        &self,
        label: &str,
        device: DeviceNumber,
    ) -> Result<MappedDevice, StorageError>;

    async fn revert_volume(&self, label: &str) -> Result<(), StorageError>;
}
