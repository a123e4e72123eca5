// SPDX-License-Identifier: GPL-3.0-only

//! Block device discovery through sysfs

use std::fs;
use std::path::PathBuf;

use storage_types::DeviceNumber;

use crate::Result;

const SYS_DEV_BLOCK: &str = "/sys/dev/block";

pub fn sys_path(device: DeviceNumber) -> PathBuf {
    PathBuf::from(SYS_DEV_BLOCK).join(device.to_string())
}

pub fn block_device_present(device: DeviceNumber) -> bool {
    sys_path(device).exists()
}

/// Partitions of `disk`, ordered by partition number
pub fn disk_partitions(disk: DeviceNumber) -> Result<Vec<(u32, DeviceNumber)>> {
    let mut partitions = Vec::new();

    for entry in fs::read_dir(sys_path(disk))? {
        let path = entry?.path();
        let Ok(partn) = fs::read_to_string(path.join("partition")) else {
            continue;
        };
        let Ok(dev) = fs::read_to_string(path.join("dev")) else {
            continue;
        };
        if let (Ok(partn), Ok(dev)) = (partn.trim().parse::<u32>(), dev.trim().parse()) {
            partitions.push((partn, dev));
        }
    }

    partitions.sort_by_key(|(partn, _)| *partn);
    Ok(partitions)
}
