// SPDX-License-Identifier: GPL-3.0-only

//! Collaborators and settings shared by every volume of a manager

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use storage_contracts::{
    DeviceProperties, EncryptionMapper, FilesystemDriver, MetadataTool, MountOps,
    PartitionTableWriter, ProcessKiller, ServiceControl,
};
use storage_types::Ownership;

use crate::encryption::EncryptionBinder;
use crate::mbr::MbrInitializer;
use crate::metadata::MetadataProbe;
use crate::secure::SecureContainerMounter;
use crate::unmount::{UnmountOrchestrator, UnmountPolicy};

/// Paths, timings and policy switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSettings {
    /// Directory holding `major:minor` block nodes
    pub device_node_dir: PathBuf,
    /// Where the secure container is bound
    pub secure_mount_dir: PathBuf,
    /// Identification cache consumed when the tool fails
    pub metadata_cache: PathBuf,
    /// Use the sdcard_rw group instead of media_rw
    pub alternate_mount_group: bool,
    /// Treat check failures as warnings
    pub lenient_check: bool,
    pub settle_delay: Duration,
    pub bridge_stop_grace: Duration,
    pub secure_dir_name: String,
    pub legacy_secure_dir_name: String,
    pub unmount: UnmountPolicy,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            device_node_dir: PathBuf::from("/dev/block/vold"),
            secure_mount_dir: PathBuf::from("/mnt/secure/asec"),
            metadata_cache: PathBuf::from("/data/data/blkid"),
            alternate_mount_group: false,
            lenient_check: false,
            settle_delay: Duration::from_secs(1),
            bridge_stop_grace: Duration::from_secs(1),
            secure_dir_name: ".android_secure".to_string(),
            legacy_secure_dir_name: "android_secure".to_string(),
            unmount: UnmountPolicy::default(),
        }
    }
}

impl VolumeSettings {
    /// No sleeps anywhere, for tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.settle_delay = Duration::ZERO;
        self.bridge_stop_grace = Duration::ZERO;
        self.unmount.retry_delay = Duration::ZERO;
        self
    }
}

/// A filesystem driver and the ownership it mounts with.
#[derive(Clone)]
pub struct DriverSlot {
    pub driver: Arc<dyn FilesystemDriver>,
    pub ownership: Ownership,
}

/// Every external collaborator a volume talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub mounts: Arc<dyn MountOps>,
    pub killer: Arc<dyn ProcessKiller>,
    /// Tried in order; the first also checks and formats
    pub drivers: Vec<DriverSlot>,
    pub encryption: Arc<dyn EncryptionMapper>,
    pub partition_writer: Arc<dyn PartitionTableWriter>,
    pub metadata_tool: Arc<dyn MetadataTool>,
    pub services: Arc<dyn ServiceControl>,
    pub properties: Arc<dyn DeviceProperties>,
}

/// Collaborators wired into the orchestration components.
pub struct VolumeContext {
    pub mounts: Arc<dyn MountOps>,
    pub drivers: Vec<DriverSlot>,
    pub services: Arc<dyn ServiceControl>,
    pub properties: Arc<dyn DeviceProperties>,
    pub unmounter: UnmountOrchestrator,
    pub secure: SecureContainerMounter,
    pub probe: MetadataProbe,
    pub encryption: EncryptionBinder,
    pub mbr: MbrInitializer,
    pub settings: VolumeSettings,
}

impl VolumeContext {
    pub fn new(collaborators: Collaborators, settings: VolumeSettings) -> Self {
        let Collaborators {
            mounts,
            killer,
            drivers,
            encryption,
            partition_writer,
            metadata_tool,
            services,
            properties,
        } = collaborators;

        Self {
            unmounter: UnmountOrchestrator::new(mounts.clone(), killer, settings.unmount),
            secure: SecureContainerMounter::new(
                mounts.clone(),
                settings.secure_mount_dir.clone(),
                settings.secure_dir_name.clone(),
                settings.legacy_secure_dir_name.clone(),
                Ownership::primary(settings.alternate_mount_group),
            ),
            probe: MetadataProbe::new(metadata_tool, settings.metadata_cache.clone()),
            encryption: EncryptionBinder::new(
                encryption,
                mounts.clone(),
                settings.device_node_dir.clone(),
            ),
            mbr: MbrInitializer::new(partition_writer),
            mounts,
            drivers,
            services,
            properties,
            settings,
        }
    }

    /// Ownership policies paired with `primary` and `fallback` drivers.
    pub fn driver_chain(
        primary: Arc<dyn FilesystemDriver>,
        fallback: Option<Arc<dyn FilesystemDriver>>,
        alternate_group: bool,
    ) -> Vec<DriverSlot> {
        let mut slots = vec![DriverSlot {
            driver: primary,
            ownership: Ownership::primary(alternate_group),
        }];
        if let Some(driver) = fallback {
            slots.push(DriverSlot {
                driver,
                ownership: Ownership::fallback(),
            });
        }
        slots
    }
}
