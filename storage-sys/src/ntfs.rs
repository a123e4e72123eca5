// SPDX-License-Identifier: GPL-3.0-only

//! NTFS support through ntfs-3g

use std::path::Path;

use storage_types::Ownership;

use crate::Result;
use crate::cmd::{run_capture, run_output};

const MOUNT_TOOL: &str = "ntfs-3g";
const FIX_TOOL: &str = "ntfsfix";

/// Whether `device` holds an NTFS volume ntfs-3g considers consistent
pub fn check(device: &Path) -> Result<bool> {
    let output = run_output(FIX_TOOL, &["--no-action".to_string(), device.display().to_string()])?;
    Ok(output.status.success())
}

pub fn mount_options(ownership: &Ownership) -> String {
    format!(
        "uid={},gid={},umask={:03o},nodev,nosuid",
        ownership.uid, ownership.gid, ownership.umask
    )
}

pub fn mount(device: &Path, mount_point: &Path, ownership: &Ownership) -> Result<()> {
    run_capture(
        MOUNT_TOOL,
        &[
            device.display().to_string(),
            mount_point.display().to_string(),
            "-o".to_string(),
            mount_options(ownership),
        ],
    )?;
    Ok(())
}
