// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use storage_types::Ownership;

use crate::{StorageError, StorageErrorKind};

/// Result of a filesystem integrity check that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The filesystem is recognised and consistent
    Clean,
    /// The node does not hold a filesystem this driver recognises
    Unrecognized,
}

/// A filesystem implementation able to check, mount and optionally format a node.
#[async_trait]
pub trait FilesystemDriver: Send + Sync {
    /// Short name used in logs, e.g. `vfat`
    fn name(&self) -> &str;

    async fn check(&self, device: &Path) -> Result<CheckOutcome, StorageError>;

    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        ownership: &Ownership,
    ) -> Result<(), StorageError>;

    async fn format(
        &self,
        device: &Path,
        wipe: bool,
        label: Option<&str>,
    ) -> Result<(), StorageError> {
        let _ = (device, wipe, label);
        Err(StorageError::new(
            StorageErrorKind::FormatFailure,
            format!("{} cannot format", self.name()),
        ))
    }
}
