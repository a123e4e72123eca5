// SPDX-License-Identifier: GPL-3.0-only

//! Volume lifecycle service
//!
//! Owns the state machine of every configured storage volume and drives
//! mount, unmount and format through the contracts in `storage-contracts`:
//! - [`Volume`] runs the per-volume algorithms and emits [`VolumeEvent`]s
//! - [`VolumeManager`] serializes commands per volume
//! - [`adapters`] wires the contracts to the host through `storage-sys`

pub mod adapters;
pub mod config;
pub mod context;
pub mod device;
pub mod encryption;
pub mod events;
pub mod letters;
pub mod logging;
pub mod manager;
pub mod mbr;
pub mod metadata;
pub mod secure;
pub mod state;
pub mod unmount;
pub mod volume;

pub use config::{ConfigError, ServiceConfig};
pub use context::{Collaborators, DriverSlot, VolumeContext, VolumeSettings};
pub use device::{BlockEventOutcome, DirectDevice, VolumeDevice};
pub use events::EventSink;
pub use letters::LetterAllocator;
pub use manager::VolumeManager;
pub use state::{StateChange, StateMachine};
pub use storage_types::VolumeEvent;
pub use unmount::{UnmountOrchestrator, UnmountPolicy};
pub use volume::{MountLayout, Volume, VolumeSpec};
