// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::StorageError;
use storage_types::{BlockEvent, DeviceNumber, VolumeState};
use tracing::{debug, error, info, warn};

use super::Volume;
use crate::device::BlockEventOutcome;

impl Volume {
    /// Route a kernel block event through the device class and apply it.
    pub async fn handle_block_event(
        &mut self,
        event: &BlockEvent,
    ) -> Result<BlockEventOutcome, StorageError> {
        let outcome = self.device.handle_block_event(event)?;

        match outcome {
            BlockEventOutcome::Ignored => {}
            BlockEventOutcome::MediaInserted { pending_partitions } => {
                self.media_inserted(pending_partitions).await;
            }
            BlockEventOutcome::MediaChanged { pending_partitions } => {
                match (self.state(), pending_partitions) {
                    (VolumeState::Idle, n) if n > 0 => {
                        self.set_state(VolumeState::Pending);
                    }
                    (VolumeState::Pending, 0) => self.settle().await,
                    (state, _) => debug!("Media change ignored while {}", state.name()),
                }
            }
            BlockEventOutcome::PartitionAdded { device, complete } => {
                if complete && self.state() == VolumeState::Pending {
                    self.settle().await;
                } else if self.state() == VolumeState::Mounted {
                    self.mount_added_partition(device).await;
                }
            }
            BlockEventOutcome::MediaRemoved => self.media_removed().await,
            BlockEventOutcome::PartitionRemoved { device } => {
                self.partition_removed(device).await;
            }
        }

        Ok(outcome)
    }

    async fn media_inserted(&mut self, pending_partitions: u32) {
        let target = if pending_partitions > 0 {
            VolumeState::Pending
        } else {
            VolumeState::Idle
        };

        match self.state() {
            VolumeState::Init | VolumeState::NoMedia => {
                if self.state() == VolumeState::Init {
                    self.set_state(VolumeState::Idle);
                }
                if target == VolumeState::Idle {
                    self.settle().await;
                } else {
                    self.set_state(target);
                }
            }
            state => warn!(
                "Media inserted into {} while {}",
                self.label(),
                state.name()
            ),
        }
    }

    /// Media is fully present; run a deferred mount if one was requested.
    async fn settle(&mut self) {
        self.set_state(VolumeState::Idle);
        if self.state() == VolumeState::Idle && self.machine.take_retry() {
            info!("Retrying deferred mount of {}", self.label());
            if let Err(e) = self.mount().await {
                error!("Deferred mount of {} failed: {}", self.label(), e.message);
            }
        }
    }

    async fn media_removed(&mut self) {
        match self.state() {
            VolumeState::Mounted => {
                warn!("Volume {} removed while mounted", self.label());
                self.force_unmount().await;
                self.set_state(VolumeState::NoMedia);
            }
            VolumeState::Idle
            | VolumeState::Pending
            | VolumeState::Checking
            | VolumeState::Shared
            | VolumeState::Init => {
                if self.state() == VolumeState::Init {
                    self.set_state(VolumeState::Idle);
                }
                self.set_state(VolumeState::NoMedia);
            }
            state => warn!(
                "Media removed from {} while {}",
                self.label(),
                state.name()
            ),
        }
    }

    async fn partition_removed(&mut self, device: DeviceNumber) {
        if self.partitions().iter().any(|p| p.device == device) {
            if let Err(e) = self.unmount_partition(device).await {
                error!("Failed to unmount removed partition {device}: {}", e.message);
            }
            return;
        }

        if !self.is_multi_partition()
            && self.state() == VolumeState::Mounted
            && self.mounted_device() == Some(device)
        {
            warn!("Partition {device} of {} removed while mounted", self.label());
            self.force_unmount().await;
            self.set_state(VolumeState::NoMedia);
        }
    }

    async fn force_unmount(&mut self) {
        if let Err(e) = self.unmount(true, false).await {
            error!("Failed to unmount {} after removal: {}", self.label(), e.message);
        }
    }
}
