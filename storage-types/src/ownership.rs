// SPDX-License-Identifier: GPL-3.0-only

//! Ownership applied to mounted filesystems and prepared directories

use serde::{Deserialize, Serialize};

/// System server user
pub const AID_SYSTEM: u32 = 1000;
/// Group with write access to external storage when mass-storage sharing exists
pub const AID_SDCARD_RW: u32 = 1015;
/// Group with write access to raw media mounts
pub const AID_MEDIA_RW: u32 = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits masked from files and directories
    pub umask: u32,
}

impl Ownership {
    /// Policy for the primary filesystem driver.
    ///
    /// `alternate_group` selects the sdcard_rw group over media_rw.
    pub fn primary(alternate_group: bool) -> Self {
        Self {
            uid: AID_SYSTEM,
            gid: if alternate_group {
                AID_SDCARD_RW
            } else {
                AID_MEDIA_RW
            },
            umask: 0o002,
        }
    }

    /// Policy for the fallback filesystem driver, which only takes an owner.
    pub fn fallback() -> Self {
        Self {
            uid: AID_SYSTEM,
            gid: AID_SYSTEM,
            umask: 0o002,
        }
    }
}
