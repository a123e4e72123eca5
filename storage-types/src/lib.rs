// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for storage volume management
//!
//! This crate defines the data types shared by every layer of the stack:
//!
//! - **storage-contracts**: the collaborator traits speak in these types
//! - **storage-sys**: low-level tools accept and return them
//! - **storage-service**: the volume state machine owns and broadcasts them
//!
//! Everything here is plain data. No type in this crate performs I/O.

pub mod device;
pub mod event;
pub mod ownership;
pub mod partition;
pub mod partition_table;
pub mod volume;

pub use device::{BlockAction, BlockDeviceKind, BlockEvent, DeviceNumber, ParseDeviceNumberError};
pub use event::VolumeEvent;
pub use ownership::{AID_MEDIA_RW, AID_SDCARD_RW, AID_SYSTEM, Ownership};
pub use partition::{DriveLetter, Partition};
pub use partition_table::{DiskLayout, PartitionEntry, PartitionScheme, PartitionTypeCode};
pub use volume::{PartitionIndex, VolumeFlag, VolumeFlags, VolumeSnapshot, VolumeState};
