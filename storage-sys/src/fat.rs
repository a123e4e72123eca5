// SPDX-License-Identifier: GPL-3.0-only

//! FAT filesystem check, mount and format

use std::path::Path;

use nix::mount::MsFlags;
use storage_types::Ownership;
use tracing::{info, warn};

use crate::cmd::{failure, run_capture, run_output};
use crate::kernel::mount_filesystem;
use crate::Result;

const FSCK_TOOL: &str = "fsck.fat";
const MKFS_TOOL: &str = "mkfs.fat";
const DISCARD_TOOL: &str = "blkdiscard";

/// Output fragments fsck.fat prints when the boot sector is not FAT at all
const NOT_FAT_MARKERS: &[&str] = &[
    "not a fat",
    "logical sector size is zero",
    "currently, only 1 or 2 fats are supported",
    "bogus number of reserved sectors",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsckVerdict {
    Clean,
    /// Errors were found and repaired
    Repaired,
    NotFat,
    Failed,
}

/// Check and auto-repair the FAT filesystem on `device`
pub fn check(device: &Path) -> Result<FsckVerdict> {
    let args = fsck_args(device);
    let output = run_output(FSCK_TOOL, &args)?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let verdict = classify_fsck(output.status.code(), &text);
    match verdict {
        FsckVerdict::Clean => info!("Filesystem check completed OK on {}", device.display()),
        FsckVerdict::Repaired => warn!("Filesystem on {} was repaired", device.display()),
        FsckVerdict::NotFat => warn!("{} does not contain a FAT filesystem", device.display()),
        FsckVerdict::Failed => warn!(
            "Filesystem check failed on {} (status {:?})",
            device.display(),
            output.status.code()
        ),
    }
    Ok(verdict)
}

/// Automatic repair (`-a`), writing changes as they are made (`-w`)
fn fsck_args(device: &Path) -> [String; 3] {
    ["-a".to_string(), "-w".to_string(), device.display().to_string()]
}

pub fn classify_fsck(status: Option<i32>, output: &str) -> FsckVerdict {
    let lowered = output.to_lowercase();
    if NOT_FAT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return FsckVerdict::NotFat;
    }

    match status {
        Some(0) => FsckVerdict::Clean,
        Some(1) => FsckVerdict::Repaired,
        _ => FsckVerdict::Failed,
    }
}

/// Mount option string for the FAT driver
pub fn mount_options(ownership: &Ownership) -> String {
    format!(
        "utf8,uid={},gid={},fmask={:o},dmask={:o},shortname=mixed",
        ownership.uid, ownership.gid, ownership.umask, ownership.umask
    )
}

pub fn mount(device: &Path, mount_point: &Path, ownership: &Ownership) -> Result<()> {
    let flags = MsFlags::MS_NODEV | MsFlags::MS_NOSUID | MsFlags::MS_DIRSYNC | MsFlags::MS_NOEXEC;
    mount_filesystem(device, mount_point, "vfat", flags, &mount_options(ownership))
}

/// Create a FAT32 filesystem, discarding the device contents first when `wipe` is set
pub fn format(device: &Path, wipe: bool, label: Option<&str>) -> Result<()> {
    let device_arg = device.display().to_string();

    if wipe {
        let output = run_output(DISCARD_TOOL, &[device_arg.as_str()])?;
        if !output.status.success() {
            // Not every device supports discard; formatting still proceeds
            warn!("{}", failure(DISCARD_TOOL, &[device_arg.as_str()], &output));
        }
    }

    let mut args = vec!["-F".to_string(), "32".to_string()];
    if let Some(label) = label.filter(|label| !label.is_empty()) {
        args.push("-n".to_string());
        args.push(label.to_string());
    }
    args.push(device_arg);

    run_capture(MKFS_TOOL, &args)?;
    info!("Filesystem formatted OK on {}", device.display());
    Ok(())
}
