// SPDX-License-Identifier: GPL-3.0-only

//! Volume lifecycle state machine

use storage_types::VolumeState;
use tracing::{error, warn};

/// A transition that was applied and must be broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub old: VolumeState,
    pub new: VolumeState,
}

/// Current state plus the deferred-mount flag.
///
/// `set` never emits anything itself; callers broadcast the returned
/// [`StateChange`].
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: VolumeState,
    retry_mount_requested: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: VolumeState::Init,
            retry_mount_requested: false,
        }
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    pub fn retry_mount_requested(&self) -> bool {
        self.retry_mount_requested
    }

    /// Remember that a mount arrived while the volume was still pending.
    pub fn request_retry(&mut self) {
        self.retry_mount_requested = true;
    }

    /// Consume the deferred-mount flag.
    pub fn take_retry(&mut self) -> bool {
        std::mem::take(&mut self.retry_mount_requested)
    }

    /// Move to `new`.
    ///
    /// Returns `None` when `new` equals the current state or when the edge
    /// is not part of the state graph; both leave the machine untouched.
    pub fn set(&mut self, new: VolumeState) -> Option<StateChange> {
        let old = self.state;

        if old == new {
            warn!("Duplicate state ({})", new.name());
            return None;
        }

        if !old.can_transition_to(new) {
            error!(
                "Refusing illegal state change {} ({}) -> {} ({})",
                old.code(),
                old.name(),
                new.code(),
                new.name()
            );
            return None;
        }

        // Leaving Pending for anything but Idle abandons the deferred mount.
        if old == VolumeState::Pending && new != VolumeState::Idle {
            self.retry_mount_requested = false;
        }

        self.state = new;
        Some(StateChange { old, new })
    }
}
