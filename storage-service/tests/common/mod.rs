// SPDX-License-Identifier: GPL-3.0-only

//! In-memory collaborators for driving volumes without touching the host

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storage_contracts::{
    CheckOutcome, CryptoStatus, DeviceProperties, EncryptionMapper, FilesystemDriver, KillAction,
    MappedDevice, MetadataTool, MountOps, MountRecord, PartitionTableWriter, ProcessKiller,
    ServiceControl, StorageError, StorageErrorKind, UnmountOutcome,
};
use storage_service::{
    Collaborators, DirectDevice, DriverSlot, EventSink, Volume, VolumeContext, VolumeSettings,
    VolumeSpec,
};
use storage_types::{DeviceNumber, DiskLayout, Ownership, VolumeEvent};
use tokio::sync::broadcast;

pub const DISK: DeviceNumber = DeviceNumber::new(179, 0);
pub const MAPPED: DeviceNumber = DeviceNumber::new(254, 0);
pub const MOUNT_POINT: &str = "/mnt/media_rw/sdcard";
pub const NODE_DIR: &str = "/dev/block/vold";
pub const SECURE_TARGET: &str = "/mnt/secure/asec";

#[derive(Default)]
pub struct FakeMounts {
    pub mounted: Mutex<HashSet<PathBuf>>,
    /// Mount target to the device mounted there
    pub sources: Mutex<HashMap<PathBuf, PathBuf>>,
    pub busy: Mutex<HashSet<PathBuf>>,
    pub fail_bind: AtomicBool,
    pub unmount_calls: Mutex<Vec<PathBuf>>,
    pub binds: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub prepared: Mutex<Vec<PathBuf>>,
    pub removed: Mutex<Vec<PathBuf>>,
    pub nodes: Mutex<Vec<PathBuf>>,
}

impl FakeMounts {
    pub fn mount(&self, path: impl Into<PathBuf>) {
        self.mounted.lock().unwrap().insert(path.into());
    }

    pub fn mount_from(&self, source: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        let target = target.into();
        self.sources
            .lock()
            .unwrap()
            .insert(target.clone(), source.into());
        self.mount(target);
    }

    pub fn is_live(&self, path: impl AsRef<Path>) -> bool {
        self.mounted.lock().unwrap().contains(path.as_ref())
    }

    pub fn set_busy(&self, path: impl Into<PathBuf>) {
        self.busy.lock().unwrap().insert(path.into());
    }
}

#[async_trait]
impl MountOps for FakeMounts {
    async fn is_mounted(&self, path: &Path) -> Result<bool, StorageError> {
        Ok(self.is_live(path))
    }

    async fn mounts_under(&self, root: &Path) -> Result<Vec<MountRecord>, StorageError> {
        let mounted = self.mounted.lock().unwrap();
        let sources = self.sources.lock().unwrap();
        Ok(mounted
            .iter()
            .filter(|target| *target != root && target.starts_with(root))
            .filter_map(|target| {
                sources.get(target).map(|source| MountRecord {
                    source: source.clone(),
                    target: target.clone(),
                })
            })
            .collect())
    }

    async fn unmount(&self, path: &Path) -> Result<UnmountOutcome, StorageError> {
        self.unmount_calls.lock().unwrap().push(path.to_path_buf());
        if self.busy.lock().unwrap().contains(path) {
            return Err(StorageError::io("Device or resource busy"));
        }
        self.sources.lock().unwrap().remove(path);
        if self.mounted.lock().unwrap().remove(path) {
            Ok(UnmountOutcome::Unmounted)
        } else {
            Ok(UnmountOutcome::NotMounted)
        }
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), StorageError> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(StorageError::io("bind refused"));
        }
        self.binds
            .lock()
            .unwrap()
            .push((source.to_path_buf(), target.to_path_buf()));
        self.mount(target);
        Ok(())
    }

    async fn prepare_dir(
        &self,
        path: &Path,
        _mode: u32,
        _uid: u32,
        _gid: u32,
    ) -> Result<(), StorageError> {
        self.prepared.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), StorageError> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn create_device_node(
        &self,
        path: &Path,
        _device: DeviceNumber,
    ) -> Result<(), StorageError> {
        self.nodes.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckBehavior {
    Clean,
    Unrecognized,
    Fail,
}

pub struct FakeDriver {
    name: &'static str,
    mounts: Arc<FakeMounts>,
    pub check: Mutex<CheckBehavior>,
    pub fail_mount: AtomicBool,
    pub fail_mount_on: Mutex<HashSet<PathBuf>>,
    pub fail_format: AtomicBool,
    pub mount_calls: Mutex<Vec<(PathBuf, PathBuf, Ownership)>>,
    pub formats: Mutex<Vec<(PathBuf, bool, Option<String>)>>,
}

impl FakeDriver {
    pub fn new(name: &'static str, mounts: Arc<FakeMounts>) -> Self {
        Self {
            name,
            mounts,
            check: Mutex::new(CheckBehavior::Clean),
            fail_mount: AtomicBool::new(false),
            fail_mount_on: Mutex::new(HashSet::new()),
            fail_format: AtomicBool::new(false),
            mount_calls: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FilesystemDriver for FakeDriver {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self, device: &Path) -> Result<CheckOutcome, StorageError> {
        match *self.check.lock().unwrap() {
            CheckBehavior::Clean => Ok(CheckOutcome::Clean),
            CheckBehavior::Unrecognized => Ok(CheckOutcome::Unrecognized),
            CheckBehavior::Fail => Err(StorageError::io(format!(
                "{} is corrupt",
                device.display()
            ))),
        }
    }

    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        ownership: &Ownership,
    ) -> Result<(), StorageError> {
        self.mount_calls.lock().unwrap().push((
            device.to_path_buf(),
            mount_point.to_path_buf(),
            *ownership,
        ));
        if self.fail_mount.load(Ordering::SeqCst)
            || self.fail_mount_on.lock().unwrap().contains(device)
        {
            return Err(StorageError::new(
                StorageErrorKind::MountFailure,
                format!("{} refused {}", self.name, device.display()),
            ));
        }
        self.mounts.mount_from(device, mount_point);
        Ok(())
    }

    async fn format(
        &self,
        device: &Path,
        wipe: bool,
        label: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.fail_format.load(Ordering::SeqCst) {
            return Err(StorageError::io("mkfs failed"));
        }
        self.formats.lock().unwrap().push((
            device.to_path_buf(),
            wipe,
            label.map(str::to_string),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeKiller {
    pub calls: Mutex<Vec<(PathBuf, KillAction)>>,
}

impl FakeKiller {
    pub fn actions(&self) -> Vec<KillAction> {
        self.calls.lock().unwrap().iter().map(|(_, a)| *a).collect()
    }
}

#[async_trait]
impl ProcessKiller for FakeKiller {
    async fn kill_processes_with_open_files(
        &self,
        path: &Path,
        action: KillAction,
    ) -> Result<usize, StorageError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), action));
        Ok(1)
    }
}

/// Mapper that, like `cryptsetup`, needs the source node to exist.
pub struct FakeMapper {
    mounts: Arc<FakeMounts>,
    pub fail: AtomicBool,
    pub setups: Mutex<Vec<(String, DeviceNumber)>>,
    pub reverts: Mutex<Vec<String>>,
}

impl FakeMapper {
    pub fn new(mounts: Arc<FakeMounts>) -> Self {
        Self {
            mounts,
            fail: AtomicBool::new(false),
            setups: Mutex::new(Vec::new()),
            reverts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EncryptionMapper for FakeMapper {
    async fn setup_volume(
        &self,
        label: &str,
        device: DeviceNumber,
    ) -> Result<MappedDevice, StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::io("no key"));
        }
        let source = node(device);
        if !self.mounts.nodes.lock().unwrap().contains(&source) {
            return Err(StorageError::io(format!(
                "Device {} does not exist",
                source.display()
            )));
        }
        self.setups.lock().unwrap().push((label.to_string(), device));
        Ok(MappedDevice {
            sys_path: PathBuf::from("/sys/dev/block/254:0"),
            device: MAPPED,
        })
    }

    async fn revert_volume(&self, label: &str) -> Result<(), StorageError> {
        self.reverts.lock().unwrap().push(label.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWriter {
    pub fail: AtomicBool,
    pub layouts: Mutex<Vec<DiskLayout>>,
}

#[async_trait]
impl PartitionTableWriter for FakeWriter {
    async fn apply(&self, layout: &DiskLayout) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::io("sfdisk failed"));
        }
        self.layouts.lock().unwrap().push(layout.clone());
        Ok(())
    }
}

/// Identification tool answering per device, with a fallback line.
#[derive(Default)]
pub struct FakeTool {
    pub fail: AtomicBool,
    pub default_line: Mutex<Option<String>>,
    pub lines: Mutex<HashMap<PathBuf, String>>,
}

impl FakeTool {
    pub fn answer(&self, line: &str) {
        *self.default_line.lock().unwrap() = Some(line.to_string());
    }

    pub fn answer_for(&self, device: impl Into<PathBuf>, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .insert(device.into(), line.to_string());
    }
}

#[async_trait]
impl MetadataTool for FakeTool {
    async fn identify(
        &self,
        device: &Path,
        _cache: Option<&Path>,
    ) -> Result<Option<String>, StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::io("blkid not found"));
        }
        if let Some(line) = self.lines.lock().unwrap().get(device) {
            return Ok(Some(line.clone()));
        }
        Ok(self.default_line.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeServices {
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceControl for FakeServices {
    async fn start(&self, name: &str) -> Result<(), StorageError> {
        self.started.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), StorageError> {
        self.stopped.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProperties {
    pub status: Mutex<CryptoStatus>,
}

impl DeviceProperties for FakeProperties {
    fn crypto_status(&self) -> CryptoStatus {
        *self.status.lock().unwrap()
    }
}

static NEXT_SCRATCH: AtomicUsize = AtomicUsize::new(0);

/// Unique scratch path under the system temp directory.
pub fn scratch_path(name: &str) -> PathBuf {
    let id = NEXT_SCRATCH.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "storage-service-{}-{id}-{name}",
        std::process::id()
    ))
}

pub struct Harness {
    pub mounts: Arc<FakeMounts>,
    pub primary: Arc<FakeDriver>,
    pub fallback: Arc<FakeDriver>,
    pub killer: Arc<FakeKiller>,
    pub mapper: Arc<FakeMapper>,
    pub writer: Arc<FakeWriter>,
    pub tool: Arc<FakeTool>,
    pub services: Arc<FakeServices>,
    pub properties: Arc<FakeProperties>,
    pub settings: VolumeSettings,
    pub events: EventSink,
}

impl Harness {
    pub fn new() -> Self {
        let mounts = Arc::new(FakeMounts::default());
        let settings = VolumeSettings {
            device_node_dir: PathBuf::from(NODE_DIR),
            secure_mount_dir: PathBuf::from(SECURE_TARGET),
            metadata_cache: scratch_path("blkid-cache"),
            ..VolumeSettings::default()
        }
        .without_delays();

        Self {
            primary: Arc::new(FakeDriver::new("vfat", mounts.clone())),
            fallback: Arc::new(FakeDriver::new("ntfs", mounts.clone())),
            mapper: Arc::new(FakeMapper::new(mounts.clone())),
            mounts,
            killer: Arc::new(FakeKiller::default()),
            writer: Arc::new(FakeWriter::default()),
            tool: Arc::new(FakeTool::default()),
            services: Arc::new(FakeServices::default()),
            properties: Arc::new(FakeProperties::default()),
            settings,
            events: EventSink::default(),
        }
    }

    pub fn context(&self) -> Arc<VolumeContext> {
        let drivers = vec![
            DriverSlot {
                driver: self.primary.clone(),
                ownership: Ownership::primary(self.settings.alternate_mount_group),
            },
            DriverSlot {
                driver: self.fallback.clone(),
                ownership: Ownership::fallback(),
            },
        ];

        Arc::new(VolumeContext::new(
            Collaborators {
                mounts: self.mounts.clone(),
                killer: self.killer.clone(),
                drivers,
                encryption: self.mapper.clone(),
                partition_writer: self.writer.clone(),
                metadata_tool: self.tool.clone(),
                services: self.services.clone(),
                properties: self.properties.clone(),
            },
            self.settings.clone(),
        ))
    }

    /// Volume in `Init`, backed by [`DISK`].
    pub fn volume(&self, spec: VolumeSpec) -> Volume {
        let device = DirectDevice::new(DISK, spec.partition);
        self.volume_on(spec, device)
    }

    pub fn volume_on(&self, spec: VolumeSpec, device: DirectDevice) -> Volume {
        Volume::new(spec, Box::new(device), self.context(), self.events.clone())
    }

    /// Volume with media present, in `Idle`.
    pub fn idle_volume(&self, spec: VolumeSpec) -> Volume {
        let mut volume = self.volume(spec);
        volume.media_detected(true);
        volume
    }
}

pub fn node(device: DeviceNumber) -> PathBuf {
    device.node_path(Path::new(NODE_DIR))
}

pub fn drain(rx: &mut broadcast::Receiver<VolumeEvent>) -> Vec<VolumeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn transitions(events: &[VolumeEvent]) -> Vec<(i32, i32)> {
    events.iter().filter_map(VolumeEvent::transition).collect()
}
