// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{StorageError, StorageErrorKind};
use storage_types::{DeviceNumber, VolumeState};
use tracing::{error, info, warn};

use super::Volume;

impl Volume {
    /// Unmount the volume.
    ///
    /// `force` lets the retry loop signal processes holding the mount.
    /// `revert` tears down a decrypted mapping afterwards; it is ignored
    /// for whole-device volumes.
    pub async fn unmount(&mut self, force: bool, revert: bool) -> Result<(), StorageError> {
        let ctx = self.ctx.clone();
        let revert = revert && !self.spec.partition.is_whole_device();
        let secure_active = self.provides_secure_container() && !self.secure_container_skipped;

        if self.state() != VolumeState::Mounted {
            error!(
                "Volume {} unmount request when not mounted ({})",
                self.label(),
                self.state().name()
            );
            return Err(StorageError::state_conflict(format!(
                "{} is not mounted",
                self.label()
            )));
        }

        self.set_state(VolumeState::Unmounting);
        sleep(ctx.settings.settle_delay).await;

        let service = self.bridge_service_name();
        if let Err(e) = ctx.services.stop(&service).await {
            warn!("Failed to stop {service}: {}", e.message);
        }
        sleep(ctx.settings.bridge_stop_grace).await;

        if secure_active {
            if let Err(e) = ctx.unmounter.unmount(ctx.secure.target(), force).await {
                error!("Failed to unmount secure area on {} ({})", self.label(), e.message);
                self.set_state(VolumeState::Mounted);
                return Err(e);
            }
            info!("Secure area unmounted from {}", self.label());
        }

        if self.spec.bridge_mount_point != self.spec.mount_point {
            let bridge = &self.spec.bridge_mount_point;
            if let Err(e) = ctx.unmounter.unmount(bridge, force).await {
                error!("Failed to unmount {} ({})", bridge.display(), e.message);
            }
        }

        let result = if self.is_multi_partition() {
            self.unmount_all_partitions(force).await
        } else {
            ctx.unmounter.unmount(&self.spec.mount_point, force).await
        };

        if let Err(e) = result {
            error!("Failed to unmount {} ({})", self.label(), e.message);
            if secure_active {
                if let Err(remount) = ctx.secure.mount(&self.spec.mount_point).await {
                    error!("Failed to remount secure area ({})", remount.message);
                    self.set_state(VolumeState::NoMedia);
                    return Err(e);
                }
            }
            self.set_state(VolumeState::Mounted);
            return Err(e);
        }

        let reverted = if revert && self.device.is_decrypted() {
            let reverted = ctx.encryption.revert(&self.spec.label).await;
            if reverted.is_ok() {
                self.device.revert_device_info();
            }
            reverted
        } else {
            Ok(())
        };

        self.clear_metadata();
        self.set_state(VolumeState::Idle);
        self.mounted_device = None;
        self.active_driver = None;
        reverted
    }

    /// Unmount one sub-partition of a multi-partition volume.
    ///
    /// The volume stays `Mounted` while other sub-partitions remain.
    pub async fn unmount_partition(&mut self, device: DeviceNumber) -> Result<(), StorageError> {
        let Some(set) = self.partitions.as_ref() else {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("{} has no sub-partitions", self.label()),
            ));
        };
        let Some(partition) = set.mounted.iter().find(|p| p.device == device).cloned() else {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("{device} is not mounted on {}", self.label()),
            ));
        };
        if self.state() != VolumeState::Mounted {
            return Err(StorageError::state_conflict(format!(
                "{} is not mounted",
                self.label()
            )));
        }

        self.set_state(VolumeState::Unmounting);

        let ctx = self.ctx.clone();
        let result = ctx.unmounter.unmount(&partition.mount_point, true).await;

        match &result {
            Ok(()) => {
                self.release_mount_point(&partition.mount_point, partition.letter)
                    .await;
                if let Some(set) = self.partitions.as_mut() {
                    set.mounted.retain(|p| p.device != device);
                }
                info!("Partition {device} of {} unmounted", self.label());
            }
            Err(e) => error!("Failed to unmount partition {device} ({})", e.message),
        }

        if self.partitions().is_empty() {
            self.clear_metadata();
            self.set_state(VolumeState::Idle);
            self.mounted_device = None;
            self.active_driver = None;
        } else {
            self.set_state(VolumeState::Mounted);
        }
        result
    }

    async fn unmount_all_partitions(&mut self, force: bool) -> Result<(), StorageError> {
        let ctx = self.ctx.clone();
        let mut first_error = None;

        for partition in self.partitions().to_vec() {
            match ctx.unmounter.unmount(&partition.mount_point, force).await {
                Ok(()) => {
                    self.release_mount_point(&partition.mount_point, partition.letter)
                        .await;
                    if let Some(set) = self.partitions.as_mut() {
                        set.mounted.retain(|p| p.device != partition.device);
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to unmount {} ({})",
                        partition.mount_point.display(),
                        e.message
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

async fn sleep(duration: std::time::Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
