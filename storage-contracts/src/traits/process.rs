// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use crate::StorageError;

/// Escalation applied to processes holding files open under a mount path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KillAction {
    /// Only report the offenders
    Report,
    /// SIGHUP
    Hangup,
    /// SIGKILL
    Kill,
}

#[async_trait]
pub trait ProcessKiller: Send + Sync {
    /// Apply `action` to every process with an open file under `path`.
    ///
    /// Returns the number of offending processes found.
    async fn kill_processes_with_open_files(
        &self,
        path: &Path,
        action: KillAction,
    ) -> Result<usize, StorageError>;
}
