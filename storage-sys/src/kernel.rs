// SPDX-License-Identifier: GPL-3.0-only

//! Direct mount, unmount and device-node system calls

use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::{MsFlags, mount, umount};
use nix::sys::stat::{Mode, SFlag, makedev, mknod, stat};
use nix::unistd::{Gid, Uid, chown};
use storage_types::DeviceNumber;
use tracing::{debug, warn};

use crate::{Result, SysError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountStatus {
    Unmounted,
    NotMounted,
}

/// One `umount(2)` attempt.
///
/// `EINVAL` and `ENOENT` mean nothing is mounted at `path` and are not errors.
pub fn unmount(path: &Path) -> Result<UnmountStatus> {
    match umount(path) {
        Ok(()) => Ok(UnmountStatus::Unmounted),
        Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(UnmountStatus::NotMounted),
        Err(e) => Err(e.into()),
    }
}

pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    debug!("Bind mounting {} -> {}", source.display(), target.display());
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )?;
    Ok(())
}

pub fn mount_filesystem(
    device: &Path,
    target: &Path,
    fs_type: &str,
    flags: MsFlags,
    data: &str,
) -> Result<()> {
    debug!(
        "Mounting {} on {} as {} ({})",
        device.display(),
        target.display(),
        fs_type,
        data
    );
    mount(Some(device), target, Some(fs_type), flags, Some(data))?;
    Ok(())
}

/// Create `path` if missing, then force its mode and owner
pub fn prepare_dir(path: &Path, mode: u32, uid: u32, gid: u32) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    if !path.is_dir() {
        return Err(SysError::OperationFailed(format!(
            "{} exists and is not a directory",
            path.display()
        )));
    }

    fs::set_permissions(path, Permissions::from_mode(mode))?;
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))?;
    Ok(())
}

/// Remove an empty directory; a missing one is success
pub fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create a block-special node with mode 0660; an existing node is success
pub fn create_device_node(path: &Path, device: DeviceNumber) -> Result<()> {
    let dev = makedev(u64::from(device.major), u64::from(device.minor));
    match mknod(path, SFlag::S_IFBLK, Mode::from_bits_truncate(0o660), dev) {
        Ok(()) => Ok(()),
        Err(Errno::EEXIST) => Ok(()),
        Err(e) => {
            warn!("Error making device node '{}' ({})", path.display(), e);
            Err(e.into())
        }
    }
}

/// `major:minor` of the block device node at `path`
pub fn device_number_of(path: &Path) -> Result<DeviceNumber> {
    let st = stat(path)?;
    if SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits()) != SFlag::S_IFBLK {
        return Err(SysError::DeviceNotFound(format!(
            "{} is not a block device",
            path.display()
        )));
    }
    let rdev = st.st_rdev;
    Ok(DeviceNumber::new(
        nix::sys::stat::major(rdev) as u32,
        nix::sys::stat::minor(rdev) as u32,
    ))
}
