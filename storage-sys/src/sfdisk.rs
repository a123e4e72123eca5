// SPDX-License-Identifier: GPL-3.0-only

//! Partition table writing through sfdisk

use std::fmt::Write;

use storage_types::{DiskLayout, PartitionScheme};
use tracing::info;

use crate::Result;
use crate::cmd::run_with_stdin;

const SFDISK_TOOL: &str = "sfdisk";

/// sfdisk script describing `layout`
pub fn render_script(layout: &DiskLayout) -> String {
    let mut script = String::new();
    let label = match layout.scheme {
        PartitionScheme::Mbr => "dos",
    };
    let _ = writeln!(script, "label: {label}");
    let _ = writeln!(script, "unit: sectors");
    let _ = writeln!(script, "sector-size: {}", layout.sector_size);
    let _ = writeln!(script);

    let mut start = layout.skip_lba;
    for entry in &layout.partitions {
        let _ = write!(script, "start={start}, type={:x}", entry.kind.mbr_code());
        if let Some(len_kb) = entry.len_kb {
            let sectors = len_kb * 1024 / u64::from(layout.sector_size);
            let _ = write!(script, ", size={sectors}");
            start += sectors;
        }
        if entry.active {
            let _ = write!(script, ", bootable");
        }
        let _ = writeln!(script);
    }

    script
}

pub fn apply(layout: &DiskLayout) -> Result<()> {
    let script = render_script(layout);
    run_with_stdin(
        SFDISK_TOOL,
        &[
            "--wipe".to_string(),
            "always".to_string(),
            layout.device.display().to_string(),
        ],
        &script,
    )?;
    info!("Partition table written to {}", layout.device.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use storage_types::{PartitionEntry, PartitionTypeCode};

    use super::*;

    #[test]
    fn renders_single_active_fat32_partition() {
        let layout = DiskLayout {
            device: PathBuf::from("/dev/block/vold/179:0"),
            scheme: PartitionScheme::Mbr,
            sector_size: 512,
            skip_lba: 2048,
            num_lba: 0,
            partitions: vec![PartitionEntry {
                name: "sdcard".to_string(),
                active: true,
                kind: PartitionTypeCode::Fat32,
                len_kb: None,
            }],
        };

        let script = render_script(&layout);
        assert!(script.starts_with("label: dos\n"));
        assert!(script.contains("sector-size: 512\n"));
        assert!(script.contains("start=2048, type=c, bootable\n"));
        assert!(!script.contains("size="));
    }
}
