// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// The medium is absent, or present but not yet decrypted
    NoMedia,
    /// The operation is illegal in the volume's current state
    StateConflict,
    /// The backing device nodes could not be resolved
    DeviceEnumerationFailure,
    /// The filesystem check reported an unrecoverable error
    FilesystemCheckFailure,
    /// No filesystem driver could mount any candidate node
    MountFailure,
    /// The secure container could not be bound
    SecureContainerFailure,
    /// A mount point stayed busy for the whole retry budget
    UnmountTimeout,
    /// A decrypted mapping could not be established or reverted
    EncryptionSetupFailure,
    /// The device class does not handle this block event
    NotImplemented,
    PartitionTableFailure,
    FormatFailure,
    Io,
    InvalidInput,
    Internal,
}

impl StorageErrorKind {
    /// Classic errno reported to command issuers
    pub fn errno(self) -> i32 {
        match self {
            Self::NoMedia => libc::ENODEV,
            Self::StateConflict | Self::UnmountTimeout => libc::EBUSY,
            Self::DeviceEnumerationFailure => libc::ENXIO,
            Self::NotImplemented => libc::ENOSYS,
            Self::InvalidInput => libc::EINVAL,
            Self::FilesystemCheckFailure
            | Self::MountFailure
            | Self::SecureContainerFailure
            | Self::EncryptionSetupFailure
            | Self::PartitionTableFailure
            | Self::FormatFailure
            | Self::Io
            | Self::Internal => libc::EIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_media(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NoMedia, message)
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::StateConflict, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Io, message)
    }

    /// Same message, reclassified under `kind`
    pub fn with_kind(self, kind: StorageErrorKind) -> Self {
        Self { kind, ..self }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}
