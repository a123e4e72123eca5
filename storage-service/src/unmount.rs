// SPDX-License-Identifier: GPL-3.0-only

//! Bounded unmount retries with process-killing escalation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use storage_contracts::{
    KillAction, MountOps, ProcessKiller, StorageError, StorageErrorKind, UnmountOutcome,
};
use tracing::{error, info, warn};

/// Retry budget and escalation thresholds.
///
/// Thresholds count remaining attempts. With the defaults the first 19
/// failures only report, the next 10 hang up and the rest kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmountPolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub hangup_below: u32,
    pub kill_below: u32,
}

impl Default for UnmountPolicy {
    fn default() -> Self {
        Self {
            attempts: 150,
            retry_delay: Duration::from_millis(30),
            hangup_below: 130,
            kill_below: 120,
        }
    }
}

impl UnmountPolicy {
    /// Signal level for a failure that leaves `remaining` attempts.
    pub fn action_for(&self, remaining: u32, force: bool) -> KillAction {
        if !force {
            KillAction::Report
        } else if remaining <= self.kill_below {
            KillAction::Kill
        } else if remaining <= self.hangup_below {
            KillAction::Hangup
        } else {
            KillAction::Report
        }
    }
}

/// Detaches mount points, killing holders between attempts.
#[derive(Clone)]
pub struct UnmountOrchestrator {
    mounts: Arc<dyn MountOps>,
    killer: Arc<dyn ProcessKiller>,
    policy: UnmountPolicy,
}

impl UnmountOrchestrator {
    pub fn new(
        mounts: Arc<dyn MountOps>,
        killer: Arc<dyn ProcessKiller>,
        policy: UnmountPolicy,
    ) -> Self {
        Self {
            mounts,
            killer,
            policy,
        }
    }

    pub fn policy(&self) -> &UnmountPolicy {
        &self.policy
    }

    /// Unmount `path`, retrying while it is busy.
    ///
    /// A path that is not mounted succeeds at once without touching any
    /// process. Without `force` holders are only reported, never signalled.
    pub async fn unmount(&self, path: &Path, force: bool) -> Result<(), StorageError> {
        let mut remaining = self.policy.attempts;
        let mut last_error = None;

        while remaining > 0 {
            remaining -= 1;

            match self.mounts.unmount(path).await {
                Ok(UnmountOutcome::Unmounted) => {
                    info!("{} successfully unmounted", path.display());
                    return Ok(());
                }
                Ok(UnmountOutcome::NotMounted) => {
                    info!("{} was not mounted", path.display());
                    return Ok(());
                }
                Err(e) => {
                    let action = self.policy.action_for(remaining, force);
                    warn!(
                        "Failed to unmount {} ({}), retries {}, action {:?}",
                        path.display(),
                        e.message,
                        remaining,
                        action
                    );

                    match self
                        .killer
                        .kill_processes_with_open_files(path, action)
                        .await
                    {
                        Ok(0) => {}
                        Ok(count) => info!("{count} process(es) hold {}", path.display()),
                        Err(e) => warn!(
                            "Could not scan processes using {}: {}",
                            path.display(),
                            e.message
                        ),
                    }
                    last_error = Some(e);
                }
            }

            if remaining > 0 && !self.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        error!("Giving up on unmount {} (still busy)", path.display());
        Err(StorageError::new(
            StorageErrorKind::UnmountTimeout,
            format!(
                "{} still busy after {} attempts{}",
                path.display(),
                self.policy.attempts,
                last_error
                    .map(|e| format!(": {}", e.message))
                    .unwrap_or_default()
            ),
        ))
    }
}
