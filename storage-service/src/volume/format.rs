// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{StorageError, StorageErrorKind};
use storage_types::{PartitionIndex, VolumeState};
use tracing::{error, info, warn};

use super::Volume;

impl Volume {
    /// Format the volume with the primary filesystem driver.
    ///
    /// Whole-device volumes get a fresh single-partition MBR first, then
    /// the new first partition is formatted. The volume is back in `Idle`
    /// once this returns, whatever the outcome.
    pub async fn format(&mut self, wipe: bool) -> Result<(), StorageError> {
        match self.state() {
            VolumeState::NoMedia => {
                return Err(StorageError::no_media(format!(
                    "{} has no media to format",
                    self.label()
                )));
            }
            VolumeState::Idle => {}
            state => {
                return Err(StorageError::state_conflict(format!(
                    "cannot format {} while {}",
                    self.label(),
                    state.name()
                )));
            }
        }

        if self.is_path_mounted(&self.spec.mount_point).await {
            warn!(
                "Volume {} is idle but appears to be mounted - fixing",
                self.label()
            );
            self.set_state(VolumeState::Mounted);
            return Err(StorageError::state_conflict(format!(
                "{} is mounted",
                self.label()
            )));
        }

        self.set_state(VolumeState::Formatting);
        let result = self.format_device(wipe).await;
        self.set_state(VolumeState::Idle);
        result
    }

    async fn format_device(&mut self, wipe: bool) -> Result<(), StorageError> {
        let ctx = self.ctx.clone();
        let disk = self.device.disk();

        let (write_mbr, partition) = match (self.spec.partition, &self.spec.format_label) {
            (PartitionIndex::WholeDevice, None) => (true, disk.offset(1)),
            (PartitionIndex::WholeDevice, Some(_)) => (false, disk.offset(1)),
            (PartitionIndex::Index(n), _) => (false, disk.offset(n)),
        };
        let Some(partition) = partition else {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("partition of {} is out of range for disk {disk}", self.label()),
            ));
        };

        if write_mbr {
            let disk_path = self.ensure_node(disk).await;
            ctx.mbr.initialize(&disk_path).await?;
        }

        let device_path = self.ensure_node(partition).await;
        if self.debug {
            info!("Formatting volume {} ({})", self.label(), device_path.display());
        }

        let Some(primary) = ctx.drivers.first() else {
            return Err(StorageError::new(
                StorageErrorKind::Internal,
                "no filesystem drivers configured",
            ));
        };

        primary
            .driver
            .format(&device_path, wipe, self.spec.format_label.as_deref())
            .await
            .map_err(|e| {
                error!("Failed to format {} ({})", device_path.display(), e.message);
                e.with_kind(StorageErrorKind::FormatFailure)
            })?;

        info!("Volume {} formatted", self.label());
        Ok(())
    }
}
