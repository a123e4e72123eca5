// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use storage_contracts::{CheckOutcome, CryptoState, StorageError, StorageErrorKind};
use storage_types::{DeviceNumber, DriveLetter, Partition, VolumeEvent, VolumeFlag, VolumeState};
use tracing::{error, info, warn};

use super::{MAX_MULTI_NODES, MAX_SINGLE_NODES, UNLABELED_PARTITION, Volume};

/// Result of trying one candidate node.
enum NodeOutcome {
    Mounted,
    Skipped,
}

impl Volume {
    /// Mount the volume.
    ///
    /// Candidate nodes are checked and mounted in order; the first node
    /// that mounts wins in single mode, every mountable node is kept in
    /// multi-partition mode.
    pub async fn mount(&mut self) -> Result<(), StorageError> {
        let crypto = self.ctx.properties.crypto_status();
        let provides = self.provides_secure_container();

        if self.state() == VolumeState::NoMedia
            || ((crypto.decrypt_pending || crypto.encryption_in_progress) && provides)
        {
            self.events.emit(VolumeEvent::MountFailedNoMedia {
                label: self.spec.label.clone(),
                mount_path: self.spec.bridge_mount_point.clone(),
            });
            return Err(StorageError::no_media(format!(
                "{} has no usable media",
                self.label()
            )));
        }

        if self.state() != VolumeState::Idle {
            if self.state() == VolumeState::Pending {
                self.machine.request_retry();
            }
            return Err(StorageError::state_conflict(format!(
                "cannot mount {} while {}",
                self.label(),
                self.state().name()
            )));
        }

        if self.already_mounted().await {
            warn!(
                "Volume {} is idle but appears to be mounted - fixing",
                self.label()
            );
            self.set_state(VolumeState::Mounted);
            return Ok(());
        }

        let max_nodes = if self.is_multi_partition() {
            MAX_MULTI_NODES
        } else {
            MAX_SINGLE_NODES
        };
        let mut nodes = self.device.device_nodes(max_nodes)?;

        let flags = self.flags();
        if provides
            && flags.contains(VolumeFlag::NonRemovable | VolumeFlag::Encryptable)
            && crypto.state == CryptoState::Encrypted
            && !self.device.is_decrypted()
        {
            nodes = self.bind_decrypted(&nodes).await?;
        }

        self.secure_container_skipped = false;
        let mut mounted_any = false;

        for node in nodes {
            match self.mount_node(node).await {
                Ok(NodeOutcome::Mounted) => {
                    mounted_any = true;
                    if !self.is_multi_partition() {
                        return Ok(());
                    }
                }
                Ok(NodeOutcome::Skipped) => {}
                Err(e) => {
                    if self.state() == VolumeState::Mounted {
                        // Other sub-partitions are already in use; keep them.
                        error!("Skipping {node} of {}: {}", self.label(), e.message);
                        continue;
                    }
                    self.set_state(VolumeState::Idle);
                    return Err(e);
                }
            }
        }

        if mounted_any {
            return Ok(());
        }

        error!("Volume {} found no suitable devices for mounting", self.label());
        self.set_state(VolumeState::Idle);
        Err(StorageError::new(
            StorageErrorKind::MountFailure,
            format!("no suitable device for {}", self.label()),
        ))
    }

    /// Mount a sub-partition that appeared while the volume is mounted.
    pub(super) async fn mount_added_partition(&mut self, node: DeviceNumber) {
        if !self.is_multi_partition() || self.state() != VolumeState::Mounted {
            return;
        }
        if self.partitions().iter().any(|p| p.device == node) {
            return;
        }
        if let Err(e) = self.mount_node(node).await {
            error!("Failed to mount new partition {node}: {}", e.message);
        }
    }

    /// Adopt a mount that outlived the previous owner of this volume.
    pub async fn reconcile(&mut self) {
        if self.state() == VolumeState::Idle && self.already_mounted().await {
            info!("Volume {} is already mounted", self.label());
            self.set_state(VolumeState::Mounted);
        }
    }

    async fn already_mounted(&mut self) -> bool {
        if self.is_multi_partition() {
            self.adopt_live_partitions().await;
            let mounted = self.partitions();
            if mounted.is_empty() {
                return false;
            }
            for partition in mounted {
                if !self.is_path_mounted(&partition.mount_point).await {
                    return false;
                }
            }
            true
        } else {
            self.is_path_mounted(&self.spec.mount_point).await
        }
    }

    /// Rebuild sub-partition records from the live mount table.
    ///
    /// Only runs while nothing is recorded, e.g. on a volume created after
    /// its partitions were mounted.
    async fn adopt_live_partitions(&mut self) {
        let root = match self.partitions.as_ref() {
            Some(set) if set.mounted.is_empty() => set.root.clone(),
            _ => return,
        };
        let live = match self.ctx.mounts.mounts_under(&root).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Unable to list mounts under {}: {}", root.display(), e.message);
                return;
            }
        };
        if live.is_empty() {
            return;
        }
        let Ok(candidates) = self.device.device_nodes(MAX_MULTI_NODES) else {
            return;
        };

        for node in candidates {
            let source = self.node_path(node);
            let Some(record) = live.iter().find(|record| record.source == source) else {
                continue;
            };
            let Some(letter) = slot_letter(&record.target) else {
                warn!("{} is not a drive letter directory", record.target.display());
                continue;
            };
            let Some(set) = self.partitions.as_mut() else {
                return;
            };
            if !set.letters.reserve(letter) {
                warn!("Letter {letter} of {} is already taken", record.target.display());
                continue;
            }
            info!("Adopting {} mounted on {}", source.display(), record.target.display());
            set.mounted.push(Partition {
                device: node,
                letter,
                mount_point: record.target.clone(),
            });
            self.mounted_device = Some(node);
        }
    }

    async fn bind_decrypted(
        &mut self,
        nodes: &[DeviceNumber],
    ) -> Result<Vec<DeviceNumber>, StorageError> {
        let [node] = nodes else {
            error!(
                "Too many device nodes returned when mounting {}",
                self.label()
            );
            return Err(StorageError::new(
                StorageErrorKind::DeviceEnumerationFailure,
                format!(
                    "expected one device node for encrypted {}, found {}",
                    self.label(),
                    nodes.len()
                ),
            ));
        };

        self.ensure_node(*node).await;
        let mapped = self.ctx.encryption.bind(&self.spec.label, *node).await?;
        self.device.update_device_info(&mapped.sys_path, mapped.device);
        self.device.device_nodes(MAX_SINGLE_NODES)
    }

    async fn mount_node(&mut self, node: DeviceNumber) -> Result<NodeOutcome, StorageError> {
        let ctx = self.ctx.clone();
        let device_path = self.ensure_node(node).await;

        info!(
            "{} being considered for volume {}",
            device_path.display(),
            self.label()
        );

        if self.state() != VolumeState::Mounted {
            self.set_state(VolumeState::Checking);
        }

        if !self.check_node(&device_path).await? {
            return Ok(NodeOutcome::Skipped);
        }

        let (mount_point, letter) = match self.reserve_mount_point(&device_path).await {
            Some(reserved) => reserved,
            None => return Ok(NodeOutcome::Skipped),
        };

        if self.debug {
            info!("Mounting {} on {}", device_path.display(), mount_point.display());
        }

        if !self.mount_with_drivers(&device_path, &mount_point).await {
            error!("{} failed to mount via every driver", device_path.display());
            if let Some(letter) = letter {
                self.release_mount_point(&mount_point, letter).await;
            }
            return Ok(NodeOutcome::Skipped);
        }

        info!("Device {}, target {} mounted", device_path.display(), mount_point.display());

        match ctx.probe.probe(&device_path).await {
            Ok(metadata) => {
                self.set_uuid(metadata.uuid);
                self.set_user_label(metadata.user_label);
            }
            Err(e) => {
                warn!("Failed to identify {}: {}", device_path.display(), e.message);
                self.clear_metadata();
            }
        }

        if self.provides_secure_container() && !self.secure_container_skipped {
            if let Err(e) = ctx.secure.mount(&mount_point).await {
                error!("Failed to mount secure area ({})", e.message);
                if let Err(undo) = ctx.mounts.unmount(&mount_point).await {
                    error!("Failed to undo mount of {}: {}", mount_point.display(), undo.message);
                }
                if let Some(letter) = letter {
                    self.release_mount_point(&mount_point, letter).await;
                }
                self.active_driver = None;
                return Err(e.with_kind(StorageErrorKind::SecureContainerFailure));
            }
        }

        if let (Some(letter), Some(set)) = (letter, self.partitions.as_mut()) {
            set.mounted.push(Partition {
                device: node,
                letter,
                mount_point: mount_point.clone(),
            });
        }

        let service = self.bridge_service_name();
        if let Err(e) = ctx.services.start(&service).await {
            warn!("Failed to start {service}: {}", e.message);
        }

        self.set_state(VolumeState::Mounted);
        self.mounted_device = Some(node);
        Ok(NodeOutcome::Mounted)
    }

    /// `Ok(false)` skips the node; `Err` aborts the whole mount.
    async fn check_node(&self, device_path: &Path) -> Result<bool, StorageError> {
        let Some(primary) = self.ctx.drivers.first() else {
            return Err(StorageError::new(
                StorageErrorKind::Internal,
                "no filesystem drivers configured",
            ));
        };
        let lenient = self.ctx.settings.lenient_check;

        match primary.driver.check(device_path).await {
            Ok(CheckOutcome::Clean) => Ok(true),
            Ok(CheckOutcome::Unrecognized) if lenient => {
                warn!(
                    "{} has no {} filesystem, trying anyway",
                    device_path.display(),
                    primary.driver.name()
                );
                Ok(true)
            }
            Ok(CheckOutcome::Unrecognized) => {
                warn!(
                    "{} does not contain a {} filesystem",
                    device_path.display(),
                    primary.driver.name()
                );
                Ok(false)
            }
            Err(e) if lenient => {
                warn!("Check of {} failed, ignoring: {}", device_path.display(), e.message);
                Ok(true)
            }
            Err(e) => {
                error!("{} failed FS checks ({})", device_path.display(), e.message);
                Err(e.with_kind(StorageErrorKind::FilesystemCheckFailure))
            }
        }
    }

    /// Try each driver in order; records the winner.
    async fn mount_with_drivers(&mut self, device_path: &Path, mount_point: &Path) -> bool {
        let ctx = self.ctx.clone();
        let provides = self.provides_secure_container();

        for (index, slot) in ctx.drivers.iter().enumerate() {
            match slot
                .driver
                .mount(device_path, mount_point, &slot.ownership)
                .await
            {
                Ok(()) => {
                    info!(
                        "{} mounted via {}",
                        device_path.display(),
                        slot.driver.name()
                    );
                    self.active_driver = Some(slot.driver.name().to_string());
                    if index == 0 {
                        self.secure_container_skipped = false;
                    }
                    return true;
                }
                Err(e) => {
                    error!(
                        "{} failed to mount via {} ({})",
                        device_path.display(),
                        slot.driver.name(),
                        e.message
                    );
                    if index == 0 && provides {
                        self.secure_container_skipped = true;
                    }
                }
            }
        }
        false
    }

    /// Mount point for the node, plus its letter in multi-partition mode.
    async fn reserve_mount_point(
        &mut self,
        device_path: &Path,
    ) -> Option<(PathBuf, Option<DriveLetter>)> {
        if self.partitions.is_none() {
            return Some((self.spec.mount_point.clone(), None));
        }

        let name = self
            .ctx
            .probe
            .label_of(device_path)
            .await
            .unwrap_or_else(|| UNLABELED_PARTITION.to_string());

        let set = self.partitions.as_mut()?;
        let Some(letter) = set.letters.allocate() else {
            error!("No drive letter left for {}", device_path.display());
            return None;
        };
        let mount_point = set.root.join(format!("{letter}({name})"));

        if let Err(e) = self.ctx.mounts.prepare_dir(&mount_point, 0o000, 0, 0).await {
            error!("Cannot create {}: {}", mount_point.display(), e.message);
            if let Some(set) = self.partitions.as_mut() {
                set.letters.release(letter);
            }
            return None;
        }

        Some((mount_point, Some(letter)))
    }

    pub(super) async fn release_mount_point(
        &mut self,
        mount_point: &Path,
        letter: DriveLetter,
    ) {
        if let Err(e) = self.ctx.mounts.remove_dir(mount_point).await {
            warn!("Cannot remove {}: {}", mount_point.display(), e.message);
        }
        if let Some(set) = self.partitions.as_mut() {
            set.letters.release(letter);
        }
    }
}

/// Letter of a `<letter>(<label>)` mount directory.
fn slot_letter(mount_point: &Path) -> Option<DriveLetter> {
    let name = mount_point.file_name()?.to_str()?;
    let mut chars = name.chars();
    let letter = DriveLetter::try_from(chars.next()?).ok()?;
    let rest = chars.as_str();
    (rest.starts_with('(') && rest.ends_with(')')).then_some(letter)
}
