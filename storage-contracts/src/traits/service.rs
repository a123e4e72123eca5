// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::StorageError;

/// Starts and stops named user-space services such as the bridge daemon.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn start(&self, name: &str) -> Result<(), StorageError>;

    async fn stop(&self, name: &str) -> Result<(), StorageError>;
}
