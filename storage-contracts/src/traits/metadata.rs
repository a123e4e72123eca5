// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use crate::StorageError;

/// External identification tool (blkid-style) reporting `KEY="value"` tokens.
#[async_trait]
pub trait MetadataTool: Send + Sync {
    /// First line of the tool's output for `device`, `None` when it printed nothing.
    ///
    /// Fails only when the tool could not be launched.
    async fn identify(
        &self,
        device: &Path,
        cache: Option<&Path>,
    ) -> Result<Option<String>, StorageError>;
}
