// SPDX-License-Identifier: GPL-3.0-only

//! A single storage volume and its lifecycle
//!
//! Every operation runs to completion on the calling task. Callers must
//! serialize operations on one volume; [`crate::VolumeManager`] does so by
//! keeping each volume behind its own mutex.

mod format;
mod hotplug;
mod mount;
mod unmount;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_contracts::StorageError;
use storage_types::{
    DeviceNumber, Partition, PartitionIndex, VolumeEvent, VolumeFlag, VolumeFlags, VolumeSnapshot,
    VolumeState,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::context::VolumeContext;
use crate::device::VolumeDevice;
use crate::events::EventSink;
use crate::letters::LetterAllocator;
use crate::state::StateMachine;

/// Candidate nodes considered by a single-mount volume
pub const MAX_SINGLE_NODES: usize = 4;
/// Candidate nodes considered by a multi-partition volume
pub const MAX_MULTI_NODES: usize = 32;
/// Directory suffix used when a sub-partition has no label
pub const UNLABELED_PARTITION: &str = "udisk";

/// How mounted nodes map onto mount points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountLayout {
    /// First mountable node lands on the volume's mount point
    Single,
    /// Every mountable node gets `<root>/<letter>(<label>)`
    MultiPartition { root: PathBuf },
}

/// Construction-time description of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub label: String,
    /// Where the real filesystem is mounted
    pub mount_point: PathBuf,
    /// Path exposed by the bridge service, reported to listeners
    pub bridge_mount_point: PathBuf,
    pub flags: VolumeFlags,
    pub partition: PartitionIndex,
    pub layout: MountLayout,
    /// Volume label for formats; formats the partition in place without a new MBR
    pub format_label: Option<String>,
}

impl VolumeSpec {
    pub fn new(label: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        let mount_point = mount_point.into();
        Self {
            label: label.into(),
            bridge_mount_point: mount_point.clone(),
            mount_point,
            flags: VolumeFlags::empty(),
            partition: PartitionIndex::WholeDevice,
            layout: MountLayout::Single,
            format_label: None,
        }
    }

    pub fn with_bridge_mount_point(mut self, path: impl Into<PathBuf>) -> Self {
        self.bridge_mount_point = path.into();
        self
    }

    pub fn with_flags(mut self, flags: impl Into<VolumeFlags>) -> Self {
        self.flags = flags.into();
        self
    }

    pub fn with_partition(mut self, partition: PartitionIndex) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_layout(mut self, layout: MountLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_format_label(mut self, label: impl Into<String>) -> Self {
        self.format_label = Some(label.into());
        self
    }
}

/// Sub-partition bookkeeping of a multi-partition volume.
#[derive(Debug, Clone)]
struct PartitionSet {
    root: PathBuf,
    letters: LetterAllocator,
    mounted: Vec<Partition>,
}

pub struct Volume {
    spec: VolumeSpec,
    machine: StateMachine,
    uuid: Option<String>,
    user_label: Option<String>,
    mounted_device: Option<DeviceNumber>,
    active_driver: Option<String>,
    secure_container_skipped: bool,
    debug: bool,
    device: Box<dyn VolumeDevice>,
    partitions: Option<PartitionSet>,
    ctx: Arc<VolumeContext>,
    events: EventSink,
}

impl Volume {
    pub fn new(
        spec: VolumeSpec,
        device: Box<dyn VolumeDevice>,
        ctx: Arc<VolumeContext>,
        events: EventSink,
    ) -> Self {
        let partitions = match &spec.layout {
            MountLayout::Single => None,
            MountLayout::MultiPartition { root } => Some(PartitionSet {
                root: root.clone(),
                letters: LetterAllocator::new(),
                mounted: Vec::new(),
            }),
        };

        Self {
            spec,
            machine: StateMachine::new(),
            uuid: None,
            user_label: None,
            mounted_device: None,
            active_driver: None,
            secure_container_skipped: false,
            debug: false,
            device,
            partitions,
            ctx,
            events,
        }
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn spec(&self) -> &VolumeSpec {
        &self.spec
    }

    pub fn mount_point(&self) -> &Path {
        &self.spec.mount_point
    }

    /// Path carried by notifications
    pub fn mount_path(&self) -> &Path {
        &self.spec.bridge_mount_point
    }

    pub fn flags(&self) -> VolumeFlags {
        self.spec.flags
    }

    pub fn state(&self) -> VolumeState {
        self.machine.state()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn user_label(&self) -> Option<&str> {
        self.user_label.as_deref()
    }

    /// Device in use, only while mounted
    pub fn mounted_device(&self) -> Option<DeviceNumber> {
        if self.state() == VolumeState::Mounted {
            self.mounted_device
        } else {
            None
        }
    }

    /// Name of the filesystem driver that performed the current mount
    pub fn active_driver(&self) -> Option<&str> {
        self.active_driver.as_deref()
    }

    pub fn retry_mount_requested(&self) -> bool {
        self.machine.retry_mount_requested()
    }

    pub fn secure_container_skipped(&self) -> bool {
        self.secure_container_skipped
    }

    pub fn provides_secure_container(&self) -> bool {
        self.spec.flags.contains(VolumeFlag::ProvidesSecureContainer)
    }

    pub fn is_multi_partition(&self) -> bool {
        self.partitions.is_some()
    }

    /// Mounted sub-partitions, empty outside multi-partition mode
    pub fn partitions(&self) -> &[Partition] {
        self.partitions
            .as_ref()
            .map(|set| set.mounted.as_slice())
            .unwrap_or_default()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, enable: bool) {
        self.debug = enable;
        info!("Volume {} debug {}", self.label(), if enable { "on" } else { "off" });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VolumeEvent> {
        self.events.subscribe()
    }

    /// Name of the bridge service fronting this volume
    pub fn bridge_service_name(&self) -> String {
        format!("fuse_{}", self.spec.label)
    }

    /// Commit `new` and notify listeners.
    ///
    /// Returns `false` when nothing changed: `new` is the current state or
    /// not reachable from it.
    pub fn set_state(&mut self, new: VolumeState) -> bool {
        let Some(change) = self.machine.set(new) else {
            return false;
        };

        debug!(
            "Volume {} state changing {} ({}) -> {} ({})",
            self.spec.label,
            change.old.code(),
            change.old.name(),
            change.new.code(),
            change.new.name()
        );

        self.events.emit(VolumeEvent::state_changed(
            &self.spec.label,
            self.spec.bridge_mount_point.clone(),
            change.old,
            change.new,
        ));
        true
    }

    /// Record a UUID, notifying even when it is cleared.
    pub fn set_uuid(&mut self, uuid: Option<String>) {
        self.uuid = uuid;
        self.events.emit(VolumeEvent::UuidChanged {
            label: self.spec.label.clone(),
            mount_path: self.spec.bridge_mount_point.clone(),
            uuid: self.uuid.clone(),
        });
    }

    /// Record a user label, notifying even when it is cleared.
    pub fn set_user_label(&mut self, user_label: Option<String>) {
        self.user_label = user_label;
        self.events.emit(VolumeEvent::UserLabelChanged {
            label: self.spec.label.clone(),
            mount_path: self.spec.bridge_mount_point.clone(),
            user_label: self.user_label.clone(),
        });
    }

    /// Leave `Init` once media presence is known.
    pub fn media_detected(&mut self, present: bool) {
        let target = if present {
            VolumeState::Idle
        } else {
            VolumeState::NoMedia
        };
        self.set_state(target);
    }

    /// Hand the idle medium to an external consumer.
    pub fn share(&mut self) -> Result<(), StorageError> {
        match self.state() {
            VolumeState::NoMedia => Err(StorageError::no_media(format!(
                "{} has no media to share",
                self.label()
            ))),
            VolumeState::Idle => {
                self.set_state(VolumeState::Shared);
                Ok(())
            }
            state => Err(StorageError::state_conflict(format!(
                "cannot share {} while {}",
                self.label(),
                state.name()
            ))),
        }
    }

    /// Take the medium back from its external consumer.
    pub fn unshare(&mut self) -> Result<(), StorageError> {
        match self.state() {
            VolumeState::Shared => {
                self.set_state(VolumeState::Idle);
                Ok(())
            }
            state => Err(StorageError::state_conflict(format!(
                "{} is not shared ({})",
                self.label(),
                state.name()
            ))),
        }
    }

    pub fn snapshot(&self) -> VolumeSnapshot {
        VolumeSnapshot {
            label: self.spec.label.clone(),
            mount_point: self.spec.mount_point.clone(),
            state: self.state(),
            uuid: self.uuid.clone(),
            user_label: self.user_label.clone(),
            mounted_device: self.mounted_device(),
            partitions: self.partitions().to_vec(),
        }
    }

    fn clear_metadata(&mut self) {
        self.set_uuid(None);
        self.set_user_label(None);
    }

    fn node_path(&self, device: DeviceNumber) -> PathBuf {
        device.node_path(&self.ctx.settings.device_node_dir)
    }

    /// Make sure `device` has a node, tolerating failure.
    async fn ensure_node(&self, device: DeviceNumber) -> PathBuf {
        let path = self.node_path(device);
        if let Err(e) = self.ctx.mounts.create_device_node(&path, device).await {
            tracing::error!("Error making device node '{}': {}", path.display(), e.message);
        }
        path
    }

    async fn is_path_mounted(&self, path: &Path) -> bool {
        match self.ctx.mounts.is_mounted(path).await {
            Ok(mounted) => mounted,
            Err(e) => {
                tracing::warn!("Unable to read mount table for {}: {}", path.display(), e.message);
                false
            }
        }
    }
}
