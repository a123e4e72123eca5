// SPDX-License-Identifier: GPL-3.0-only

pub mod encryption;
pub mod filesystem;
pub mod metadata;
pub mod mount;
pub mod partition;
pub mod process;
pub mod properties;
pub mod service;

pub use encryption::{EncryptionMapper, MappedDevice};
pub use filesystem::{CheckOutcome, FilesystemDriver};
pub use metadata::MetadataTool;
pub use mount::{MountOps, MountRecord, UnmountOutcome};
pub use partition::PartitionTableWriter;
pub use process::{KillAction, ProcessKiller};
pub use properties::{CryptoState, CryptoStatus, DeviceProperties};
pub use service::ServiceControl;
