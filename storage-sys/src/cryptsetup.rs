// SPDX-License-Identifier: GPL-3.0-only

//! dm-crypt mappings through cryptsetup

use std::path::{Path, PathBuf};

use storage_types::DeviceNumber;
use tracing::info;

use crate::cmd::run_capture;
use crate::kernel::device_number_of;
use crate::sysfs::sys_path;
use crate::Result;

const CRYPTSETUP_TOOL: &str = "cryptsetup";
const MAPPER_DIR: &str = "/dev/mapper";

/// Mapping name used for a volume label
pub fn mapping_name(label: &str) -> String {
    format!("vol-{label}")
}

/// Open a plain dm-crypt mapping of `device` keyed by `key_file`.
///
/// Returns the sysfs path and device number of the decrypted device.
pub fn open(device: &Path, name: &str, key_file: &Path) -> Result<(PathBuf, DeviceNumber)> {
    run_capture(
        CRYPTSETUP_TOOL,
        &[
            "open".to_string(),
            "--type".to_string(),
            "plain".to_string(),
            "--key-file".to_string(),
            key_file.display().to_string(),
            device.display().to_string(),
            name.to_string(),
        ],
    )?;

    let dev = device_number_of(&PathBuf::from(MAPPER_DIR).join(name))?;
    info!("Opened dm-crypt mapping {} as {}", name, dev);
    Ok((sys_path(dev), dev))
}

pub fn close(name: &str) -> Result<()> {
    run_capture(CRYPTSETUP_TOOL, &["close".to_string(), name.to_string()])?;
    info!("Closed dm-crypt mapping {}", name);
    Ok(())
}
