// SPDX-License-Identifier: GPL-3.0-only

//! Binding encrypted volumes to their decrypted mapping

use std::path::PathBuf;
use std::sync::Arc;

use storage_contracts::{EncryptionMapper, MappedDevice, MountOps, StorageError, StorageErrorKind};
use storage_types::DeviceNumber;
use tracing::{error, info};

#[derive(Clone)]
pub struct EncryptionBinder {
    mapper: Arc<dyn EncryptionMapper>,
    mounts: Arc<dyn MountOps>,
    node_dir: PathBuf,
}

impl EncryptionBinder {
    pub fn new(
        mapper: Arc<dyn EncryptionMapper>,
        mounts: Arc<dyn MountOps>,
        node_dir: PathBuf,
    ) -> Self {
        Self {
            mapper,
            mounts,
            node_dir,
        }
    }

    /// Establish the decrypted mapping of `device` and publish its node.
    pub async fn bind(
        &self,
        label: &str,
        device: DeviceNumber,
    ) -> Result<MappedDevice, StorageError> {
        let mapped = self
            .mapper
            .setup_volume(label, device)
            .await
            .map_err(|e| {
                error!("Could not decrypt volume {label} ({device}): {}", e.message);
                e.with_kind(StorageErrorKind::EncryptionSetupFailure)
            })?;

        let node = mapped.device.node_path(&self.node_dir);
        if let Err(e) = self.mounts.create_device_node(&node, mapped.device).await {
            error!("Error making device node '{}': {}", node.display(), e.message);
        }

        info!("Volume {label} decrypted as {}", mapped.device);
        Ok(mapped)
    }

    pub async fn revert(&self, label: &str) -> Result<(), StorageError> {
        self.mapper.revert_volume(label).await.map_err(|e| {
            error!("Could not revert decrypted volume {label}: {}", e.message);
            e.with_kind(StorageErrorKind::EncryptionSetupFailure)
        })?;
        info!("Encrypted volume {label} reverted successfully");
        Ok(())
    }
}
