// SPDX-License-Identifier: GPL-3.0-only

//! Live mount table inspection

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::Result;

const PROC_MOUNTS: &str = "/proc/mounts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

pub fn read_mount_table() -> Result<Vec<MountEntry>> {
    let contents = fs::read(PROC_MOUNTS)?;
    Ok(parse_mounts(contents))
}

/// Whether `path` is a mount point in the live mount table.
///
/// An unreadable mount table is logged and reported as "not mounted".
pub fn is_mountpoint_mounted(path: &Path) -> bool {
    match read_mount_table() {
        Ok(entries) => {
            let mounted = entries.iter().any(|entry| entry.mount_point == path);
            debug!("{} mounted: {}", path.display(), mounted);
            mounted
        }
        Err(e) => {
            error!("Error opening {} ({})", PROC_MOUNTS, e);
            false
        }
    }
}

/// Parse `/proc/mounts` content.
///
/// Fields are kept as raw bytes until unescaped, so mount points that are
/// not valid UTF-8 survive unchanged.
pub fn parse_mounts(input: impl AsRef<[u8]>) -> Vec<MountEntry> {
    input
        .as_ref()
        .split(|b| *b == b'\n')
        .filter_map(|line| {
            let mut fields = line
                .split(|b| b.is_ascii_whitespace())
                .filter(|field| !field.is_empty());
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next().unwrap_or_default();
            Some(MountEntry {
                device: String::from_utf8_lossy(&unescape_mount_field(device)).into_owned(),
                mount_point: PathBuf::from(OsString::from_vec(unescape_mount_field(mount_point))),
                fs_type: String::from_utf8_lossy(fs_type).into_owned(),
            })
        })
        .collect()
}

/// Unescape octal sequences in mount table fields (e.g. `\040` -> ` `)
fn unescape_mount_field(bytes: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        let escaped = match bytes[index] {
            b'\\' => bytes.get(index + 1..index + 4).and_then(octal_byte),
            _ => None,
        };
        if let Some(num) = escaped {
            output.push(num);
            index += 4;
            continue;
        }

        output.push(bytes[index]);
        index += 1;
    }

    output
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    digits.iter().try_fold(0u8, |acc, digit| {
        if !(b'0'..=b'7').contains(digit) {
            return None;
        }
        acc.checked_mul(8)?.checked_add(digit - b'0')
    })
}

#[cfg(test)]
mod tests {
    use std::os::unix::ffi::OsStrExt;

    use super::*;

    #[test]
    fn parses_proc_mounts_lines() {
        let sample = "/dev/block/vold/179:1 /mnt/sdcard vfat rw,dirsync 0 0\nproc /proc proc rw 0 0\n";
        let entries = parse_mounts(sample);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].device, "/dev/block/vold/179:1");
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/sdcard"));
        assert_eq!(entries[0].fs_type, "vfat");
    }

    #[test]
    fn unescapes_spaces_in_mount_points() {
        let entries = parse_mounts("/dev/sdb1 /mnt/usb_storage/A(my\\040disk) vfat rw 0 0\n");
        assert_eq!(
            entries[0].mount_point,
            PathBuf::from("/mnt/usb_storage/A(my disk)")
        );
    }

    #[test]
    fn keeps_trailing_backslash() {
        assert_eq!(unescape_mount_field(b"abc\\"), b"abc\\");
        assert_eq!(unescape_mount_field(b"a\\04"), b"a\\04");
        assert_eq!(unescape_mount_field(b"a\\777"), b"a\\777");
    }

    #[test]
    fn keeps_utf8_mount_points_intact() {
        let entries = parse_mounts("/dev/sdb1 /mnt/usb_storage/A(Фото) vfat rw 0 0\n");
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/usb_storage/A(Фото)"));
    }

    #[test]
    fn non_utf8_table_content_is_preserved() {
        let entries = parse_mounts(b"/dev/sdb1 /mnt/raw\xfe vfat rw 0 0\n".as_slice());
        assert_eq!(
            entries[0].mount_point.as_os_str().as_bytes(),
            b"/mnt/raw\xfe"
        );
    }

    #[test]
    fn escaped_high_bytes_stay_raw() {
        // "é" is 0xc3 0xa9 in UTF-8
        let entries = parse_mounts("/dev/sdb1 /mnt/caf\\303\\251 vfat rw 0 0\n");
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/café"));

        let entries = parse_mounts("/dev/sdb1 /mnt/raw\\377 vfat rw 0 0\n");
        assert_eq!(
            entries[0].mount_point.as_os_str().as_bytes(),
            b"/mnt/raw\xff"
        );
    }
}
