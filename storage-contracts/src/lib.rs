// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{StorageError, StorageErrorKind};
pub use traits::{
    CheckOutcome, CryptoState, CryptoStatus, DeviceProperties, EncryptionMapper,
    FilesystemDriver, KillAction, MappedDevice, MetadataTool, MountOps, MountRecord,
    PartitionTableWriter, ProcessKiller, ServiceControl, UnmountOutcome,
};
