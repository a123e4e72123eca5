// SPDX-License-Identifier: GPL-3.0-only

//! Volume state and capability models

use std::fmt;
use std::path::PathBuf;

use enumflags2::{BitFlags, bitflags};
use serde::{Deserialize, Serialize};

use crate::{DeviceNumber, Partition};

/// Lifecycle state of a volume.
///
/// The discriminants are the numeric codes carried by state-change
/// notifications and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeState {
    Init = -1,
    NoMedia = 0,
    Idle = 1,
    Pending = 2,
    Checking = 3,
    Mounted = 4,
    Unmounting = 5,
    Formatting = 6,
    Shared = 7,
    SharedMounted = 8,
}

impl VolumeState {
    pub const ALL: [VolumeState; 10] = [
        VolumeState::Init,
        VolumeState::NoMedia,
        VolumeState::Idle,
        VolumeState::Pending,
        VolumeState::Checking,
        VolumeState::Mounted,
        VolumeState::Unmounting,
        VolumeState::Formatting,
        VolumeState::Shared,
        VolumeState::SharedMounted,
    ];

    /// Numeric code broadcast to listeners
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable name broadcast to listeners
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "Initializing",
            Self::NoMedia => "No-Media",
            Self::Idle => "Idle-Unmounted",
            Self::Pending => "Pending",
            Self::Checking => "Checking",
            Self::Mounted => "Mounted",
            Self::Unmounting => "Unmounting",
            Self::Formatting => "Formatting",
            Self::Shared => "Shared-Unmounted",
            Self::SharedMounted => "Shared-Mounted",
        }
    }

    /// Whether `self -> next` is an edge of the volume state graph.
    ///
    /// Besides the mount/unmount/format cycle this admits the media
    /// presence edges (`-> NoMedia` on removal, `NoMedia -> Idle|Pending`
    /// on insertion), the `Idle -> Mounted` self-heal taken when a mount
    /// point is found already live, and `Unmounting -> NoMedia` taken when
    /// a failed unmount cannot restore the secure container.
    pub fn can_transition_to(self, next: VolumeState) -> bool {
        use VolumeState::*;

        matches!(
            (self, next),
            (Init, NoMedia | Idle)
                | (NoMedia, Idle | Pending)
                | (Idle, Pending | Checking | Formatting | Shared | Mounted | NoMedia)
                | (Pending, Idle | Checking | NoMedia)
                | (Checking, Mounted | Idle | NoMedia)
                | (Mounted, Unmounting | NoMedia)
                | (Unmounting, Idle | Mounted | NoMedia)
                | (Formatting, Idle)
                | (Shared, SharedMounted | Idle | NoMedia)
                | (SharedMounted, Shared)
        )
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities fixed at volume construction.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeFlag {
    /// The volume hosts a hidden secure container bind-mounted elsewhere
    ProvidesSecureContainer = 1 << 0,
    /// The medium cannot be removed from the device
    NonRemovable = 1 << 1,
    /// The volume may sit behind a decrypted block mapping
    Encryptable = 1 << 2,
}

pub type VolumeFlags = BitFlags<VolumeFlag>;

/// Which part of the backing device a volume uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionIndex {
    /// The whole device, or every partition found on it
    WholeDevice,
    /// A single partition, numbered from 1
    Index(u32),
}

impl PartitionIndex {
    pub fn is_whole_device(self) -> bool {
        matches!(self, Self::WholeDevice)
    }
}

/// Point-in-time view of a volume, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub label: String,
    pub mount_point: PathBuf,
    pub state: VolumeState,
    pub uuid: Option<String>,
    pub user_label: Option<String>,
    pub mounted_device: Option<DeviceNumber>,
    pub partitions: Vec<Partition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_broadcast_numbering() {
        let codes: Vec<i32> = VolumeState::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![-1, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(VolumeState::Idle.name(), "Idle-Unmounted");
        assert_eq!(VolumeState::SharedMounted.to_string(), "Shared-Mounted");
    }

    #[test]
    fn mount_cycle_edges_are_legal() {
        use VolumeState::*;

        for (from, to) in [
            (Init, Idle),
            (Idle, Checking),
            (Checking, Mounted),
            (Mounted, Unmounting),
            (Unmounting, Idle),
            (Unmounting, Mounted),
            (Idle, Formatting),
            (Formatting, Idle),
            (Pending, Idle),
            (Shared, SharedMounted),
            (SharedMounted, Shared),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to}");
        }
    }

    #[test]
    fn shortcuts_are_refused() {
        use VolumeState::*;

        assert!(!Mounted.can_transition_to(Idle));
        assert!(!Mounted.can_transition_to(Checking));
        assert!(!Formatting.can_transition_to(Mounted));
        assert!(!NoMedia.can_transition_to(Mounted));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn flags_deserialize_from_snake_case() {
        let flags: Vec<VolumeFlag> =
            serde_json::from_str(r#"["provides_secure_container","encryptable"]"#).unwrap();
        let flags: VolumeFlags = flags.into_iter().collect();
        assert!(flags.contains(VolumeFlag::ProvidesSecureContainer));
        assert!(!flags.contains(VolumeFlag::NonRemovable));
    }
}
