// SPDX-License-Identifier: GPL-3.0-only

//! Hidden secure-container directory bound from inside a mounted volume

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::unistd::{AccessFlags, access};
use storage_contracts::{MountOps, StorageError, StorageErrorKind};
use storage_types::Ownership;
use tracing::{error, info};

const SECURE_DIR_MODE: u32 = 0o770;

#[derive(Clone)]
pub struct SecureContainerMounter {
    mounts: Arc<dyn MountOps>,
    target: PathBuf,
    dir_name: String,
    legacy_dir_name: String,
    ownership: Ownership,
}

impl SecureContainerMounter {
    pub fn new(
        mounts: Arc<dyn MountOps>,
        target: PathBuf,
        dir_name: String,
        legacy_dir_name: String,
        ownership: Ownership,
    ) -> Self {
        Self {
            mounts,
            target,
            dir_name,
            legacy_dir_name,
            ownership,
        }
    }

    /// Fixed location the container is bound onto
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Prepare the hidden directory under `mount_point` and bind it onto
    /// the secure target, migrating the legacy name first.
    pub async fn mount(&self, mount_point: &Path) -> Result<(), StorageError> {
        let legacy = mount_point.join(&self.legacy_dir_name);
        let secure = mount_point.join(&self.dir_name);

        if accessible(&legacy) && !accessible(&secure) {
            match tokio::fs::rename(&legacy, &secure).await {
                Ok(()) => info!(
                    "Migrated {} to {}",
                    legacy.display(),
                    secure.display()
                ),
                Err(e) => error!(
                    "Failed to rename legacy secure dir {}: {e}",
                    legacy.display()
                ),
            }
        }

        self.mounts
            .prepare_dir(
                &secure,
                SECURE_DIR_MODE,
                self.ownership.uid,
                self.ownership.gid,
            )
            .await
            .map_err(|e| {
                error!("Failed to prepare {}: {}", secure.display(), e.message);
                e.with_kind(StorageErrorKind::SecureContainerFailure)
            })?;

        self.mounts
            .bind_mount(&secure, &self.target)
            .await
            .map_err(|e| {
                error!(
                    "Failed to bind {} onto {}: {}",
                    secure.display(),
                    self.target.display(),
                    e.message
                );
                e.with_kind(StorageErrorKind::SecureContainerFailure)
            })?;

        Ok(())
    }
}

fn accessible(path: &Path) -> bool {
    access(path, AccessFlags::R_OK | AccessFlags::X_OK).is_ok()
}
