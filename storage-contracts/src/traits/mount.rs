// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use storage_types::DeviceNumber;

use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    Unmounted,
    /// Nothing was mounted at the path
    NotMounted,
}

/// One live mount: what is mounted where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Kernel mount table and device-node primitives.
#[async_trait]
pub trait MountOps: Send + Sync {
    /// Whether `path` appears as a mount point in the live mount table
    async fn is_mounted(&self, path: &Path) -> Result<bool, StorageError>;

    /// Live mounts strictly below `root`
    async fn mounts_under(&self, root: &Path) -> Result<Vec<MountRecord>, StorageError>;

    /// Single unmount attempt; busy mounts are reported as errors
    async fn unmount(&self, path: &Path) -> Result<UnmountOutcome, StorageError>;

    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), StorageError>;

    /// Create `path` if needed and force its mode and owner
    async fn prepare_dir(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<(), StorageError>;

    async fn remove_dir(&self, path: &Path) -> Result<(), StorageError>;

    /// Create a block-special node; an existing node is success
    async fn create_device_node(
        &self,
        path: &Path,
        device: DeviceNumber,
    ) -> Result<(), StorageError>;
}
