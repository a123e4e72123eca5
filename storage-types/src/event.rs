// SPDX-License-Identifier: GPL-3.0-only

//! Notifications emitted toward volume listeners

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::VolumeState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VolumeEvent {
    StateChanged {
        label: String,
        mount_path: PathBuf,
        old_state: i32,
        old_state_name: String,
        new_state: i32,
        new_state_name: String,
    },
    UuidChanged {
        label: String,
        mount_path: PathBuf,
        uuid: Option<String>,
    },
    UserLabelChanged {
        label: String,
        mount_path: PathBuf,
        user_label: Option<String>,
    },
    /// A mount was refused because the medium is absent or still encrypted
    MountFailedNoMedia { label: String, mount_path: PathBuf },
}

impl VolumeEvent {
    pub fn state_changed(
        label: &str,
        mount_path: PathBuf,
        old: VolumeState,
        new: VolumeState,
    ) -> Self {
        Self::StateChanged {
            label: label.to_string(),
            mount_path,
            old_state: old.code(),
            old_state_name: old.name().to_string(),
            new_state: new.code(),
            new_state_name: new.name().to_string(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::StateChanged { label, .. }
            | Self::UuidChanged { label, .. }
            | Self::UserLabelChanged { label, .. }
            | Self::MountFailedNoMedia { label, .. } => label,
        }
    }

    /// `(old, new)` codes of a state change
    pub fn transition(&self) -> Option<(i32, i32)> {
        match self {
            Self::StateChanged {
                old_state,
                new_state,
                ..
            } => Some((*old_state, *new_state)),
            _ => None,
        }
    }
}
