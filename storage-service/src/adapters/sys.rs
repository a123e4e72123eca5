// SPDX-License-Identifier: GPL-3.0-only

//! Contract implementations over `storage-sys`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::sys::signal::Signal;
use storage_contracts::{
    CheckOutcome, EncryptionMapper, FilesystemDriver, KillAction, MappedDevice, MetadataTool,
    MountOps, MountRecord, PartitionTableWriter, ProcessKiller, ServiceControl, StorageError,
    StorageErrorKind, UnmountOutcome,
};
use storage_sys::fat::FsckVerdict;
use storage_sys::{SysError, UnmountStatus};
use storage_types::{DeviceNumber, DiskLayout, Ownership};
use tracing::warn;

/// Run a blocking `storage-sys` call off the async executor.
async fn blocking<T, F>(kind: StorageErrorKind, what: String, f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SysError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StorageError::new(kind, format!("{what}: {e}"))),
        Err(e) => Err(StorageError::new(
            StorageErrorKind::Internal,
            format!("{what}: worker failed: {e}"),
        )),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SysMountOps;

#[async_trait]
impl MountOps for SysMountOps {
    async fn is_mounted(&self, path: &Path) -> Result<bool, StorageError> {
        let path = path.to_path_buf();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to inspect mounts for {}", path.display()),
            move || Ok(storage_sys::is_mountpoint_mounted(&path)),
        )
        .await
    }

    async fn mounts_under(&self, root: &Path) -> Result<Vec<MountRecord>, StorageError> {
        let root = root.to_path_buf();
        let entries = blocking(
            StorageErrorKind::Io,
            format!("Failed to read mounts under {}", root.display()),
            storage_sys::read_mount_table,
        )
        .await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.mount_point != root && entry.mount_point.starts_with(&root))
            .map(|entry| MountRecord {
                source: PathBuf::from(entry.device),
                target: entry.mount_point,
            })
            .collect())
    }

    async fn unmount(&self, path: &Path) -> Result<UnmountOutcome, StorageError> {
        let path = path.to_path_buf();
        let status = blocking(
            StorageErrorKind::Io,
            format!("Failed to unmount {}", path.display()),
            move || storage_sys::kernel::unmount(&path),
        )
        .await?;
        Ok(match status {
            UnmountStatus::Unmounted => UnmountOutcome::Unmounted,
            UnmountStatus::NotMounted => UnmountOutcome::NotMounted,
        })
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), StorageError> {
        let (source, target) = (source.to_path_buf(), target.to_path_buf());
        blocking(
            StorageErrorKind::Io,
            format!("Failed to bind {} onto {}", source.display(), target.display()),
            move || storage_sys::kernel::bind_mount(&source, &target),
        )
        .await
    }

    async fn prepare_dir(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<(), StorageError> {
        let path = path.to_path_buf();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to prepare {}", path.display()),
            move || storage_sys::kernel::prepare_dir(&path, mode, uid, gid),
        )
        .await
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), StorageError> {
        let path = path.to_path_buf();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to remove {}", path.display()),
            move || storage_sys::kernel::remove_dir(&path),
        )
        .await
    }

    async fn create_device_node(
        &self,
        path: &Path,
        device: DeviceNumber,
    ) -> Result<(), StorageError> {
        let path = path.to_path_buf();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to create node {}", path.display()),
            move || storage_sys::kernel::create_device_node(&path, device),
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsProcessKiller;

#[async_trait]
impl ProcessKiller for ProcfsProcessKiller {
    async fn kill_processes_with_open_files(
        &self,
        path: &Path,
        action: KillAction,
    ) -> Result<usize, StorageError> {
        let path = path.to_path_buf();
        blocking(
            StorageErrorKind::Internal,
            format!("Failed to scan processes under {}", path.display()),
            move || {
                let holders = storage_sys::find_processes_using_mount(&path);
                for holder in &holders {
                    warn!(
                        "Process {} ({}) has open files under {}",
                        holder.pid,
                        holder.command,
                        path.display()
                    );
                }

                let signal = match action {
                    KillAction::Report => return Ok(holders.len()),
                    KillAction::Hangup => Signal::SIGHUP,
                    KillAction::Kill => Signal::SIGKILL,
                };
                let pids: Vec<i32> = holders.iter().map(|p| p.pid).collect();
                Ok(storage_sys::signal_processes(&pids, signal))
            },
        )
        .await
    }
}

/// FAT driver; the primary driver, able to check and format.
#[derive(Debug, Clone, Copy, Default)]
pub struct VfatDriver;

#[async_trait]
impl FilesystemDriver for VfatDriver {
    fn name(&self) -> &str {
        "vfat"
    }

    async fn check(&self, device: &Path) -> Result<CheckOutcome, StorageError> {
        let path = device.to_path_buf();
        let verdict = blocking(
            StorageErrorKind::FilesystemCheckFailure,
            format!("Failed to check {}", path.display()),
            move || storage_sys::fat::check(&path),
        )
        .await?;

        match verdict {
            FsckVerdict::Clean | FsckVerdict::Repaired => Ok(CheckOutcome::Clean),
            FsckVerdict::NotFat => Ok(CheckOutcome::Unrecognized),
            FsckVerdict::Failed => Err(StorageError::new(
                StorageErrorKind::FilesystemCheckFailure,
                format!("{} has an unrecoverable FAT filesystem", device.display()),
            )),
        }
    }

    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        ownership: &Ownership,
    ) -> Result<(), StorageError> {
        let (device, mount_point, ownership) =
            (device.to_path_buf(), mount_point.to_path_buf(), *ownership);
        blocking(
            StorageErrorKind::MountFailure,
            format!("Failed to mount {} as vfat", device.display()),
            move || storage_sys::fat::mount(&device, &mount_point, &ownership),
        )
        .await
    }

    async fn format(
        &self,
        device: &Path,
        wipe: bool,
        label: Option<&str>,
    ) -> Result<(), StorageError> {
        let device = device.to_path_buf();
        let label = label.map(str::to_string);
        blocking(
            StorageErrorKind::FormatFailure,
            format!("Failed to format {}", device.display()),
            move || storage_sys::fat::format(&device, wipe, label.as_deref()),
        )
        .await
    }
}

/// NTFS driver used when FAT mounting fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NtfsDriver;

#[async_trait]
impl FilesystemDriver for NtfsDriver {
    fn name(&self) -> &str {
        "ntfs"
    }

    async fn check(&self, device: &Path) -> Result<CheckOutcome, StorageError> {
        let path = device.to_path_buf();
        let consistent = blocking(
            StorageErrorKind::FilesystemCheckFailure,
            format!("Failed to check {}", path.display()),
            move || storage_sys::ntfs::check(&path),
        )
        .await?;
        Ok(if consistent {
            CheckOutcome::Clean
        } else {
            CheckOutcome::Unrecognized
        })
    }

    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        ownership: &Ownership,
    ) -> Result<(), StorageError> {
        let (device, mount_point, ownership) =
            (device.to_path_buf(), mount_point.to_path_buf(), *ownership);
        blocking(
            StorageErrorKind::MountFailure,
            format!("Failed to mount {} as ntfs", device.display()),
            move || storage_sys::ntfs::mount(&device, &mount_point, &ownership),
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct BlkidTool {
    binary: String,
}

impl BlkidTool {
    pub fn new(binary: String) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl MetadataTool for BlkidTool {
    async fn identify(
        &self,
        device: &Path,
        cache: Option<&Path>,
    ) -> Result<Option<String>, StorageError> {
        let binary = self.binary.clone();
        let device = device.to_path_buf();
        let cache = cache.map(Path::to_path_buf);
        blocking(
            StorageErrorKind::Io,
            format!("Failed to identify {}", device.display()),
            move || storage_sys::blkid::identify(&binary, &device, cache.as_deref()),
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SfdiskWriter;

#[async_trait]
impl PartitionTableWriter for SfdiskWriter {
    async fn apply(&self, layout: &DiskLayout) -> Result<(), StorageError> {
        let layout = layout.clone();
        blocking(
            StorageErrorKind::PartitionTableFailure,
            format!("Failed to partition {}", layout.device.display()),
            move || storage_sys::sfdisk::apply(&layout),
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdServices;

#[async_trait]
impl ServiceControl for SystemdServices {
    async fn start(&self, name: &str) -> Result<(), StorageError> {
        let name = name.to_string();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to start {name}"),
            move || storage_sys::systemd::start(&name),
        )
        .await
    }

    async fn stop(&self, name: &str) -> Result<(), StorageError> {
        let name = name.to_string();
        blocking(
            StorageErrorKind::Io,
            format!("Failed to stop {name}"),
            move || storage_sys::systemd::stop(&name),
        )
        .await
    }
}

/// Plain dm-crypt mappings keyed by a key file.
#[derive(Debug, Clone)]
pub struct CryptsetupMapper {
    key_file: PathBuf,
    node_dir: PathBuf,
}

impl CryptsetupMapper {
    pub fn new(key_file: PathBuf, node_dir: PathBuf) -> Self {
        Self { key_file, node_dir }
    }
}

#[async_trait]
impl EncryptionMapper for CryptsetupMapper {
    async fn setup_volume(
        &self,
        label: &str,
        device: DeviceNumber,
    ) -> Result<MappedDevice, StorageError> {
        let source = device.node_path(&self.node_dir);
        let name = storage_sys::cryptsetup::mapping_name(label);
        let key_file = self.key_file.clone();
        let (sys_path, device) = blocking(
            StorageErrorKind::EncryptionSetupFailure,
            format!("Failed to map {}", source.display()),
            move || storage_sys::cryptsetup::open(&source, &name, &key_file),
        )
        .await?;
        Ok(MappedDevice { sys_path, device })
    }

    async fn revert_volume(&self, label: &str) -> Result<(), StorageError> {
        let name = storage_sys::cryptsetup::mapping_name(label);
        blocking(
            StorageErrorKind::EncryptionSetupFailure,
            format!("Failed to close mapping {name}"),
            move || storage_sys::cryptsetup::close(&name),
        )
        .await
    }
}
