// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use storage_types::DiskLayout;

use crate::StorageError;

#[async_trait]
pub trait PartitionTableWriter: Send + Sync {
    async fn apply(&self, layout: &DiskLayout) -> Result<(), StorageError>;
}
