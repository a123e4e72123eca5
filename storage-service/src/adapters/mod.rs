// SPDX-License-Identifier: GPL-3.0-only

pub mod sys;

use std::sync::Arc;

use storage_contracts::{CryptoStatus, DeviceProperties, FilesystemDriver};

use crate::config::ServiceConfig;
use crate::context::{Collaborators, VolumeContext};

/// Device-wide crypto flags read once from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProperties {
    status: CryptoStatus,
}

impl StaticProperties {
    pub fn new(status: CryptoStatus) -> Self {
        Self { status }
    }
}

impl DeviceProperties for StaticProperties {
    fn crypto_status(&self) -> CryptoStatus {
        self.status
    }
}

/// Collaborators backed by the host system.
pub fn system_collaborators(config: &ServiceConfig) -> Collaborators {
    let mounts = Arc::new(sys::SysMountOps);
    let drivers = VolumeContext::driver_chain(
        Arc::new(sys::VfatDriver),
        Some(Arc::new(sys::NtfsDriver) as Arc<dyn FilesystemDriver>),
        config.mount.alternate_mount_group,
    );

    Collaborators {
        mounts,
        killer: Arc::new(sys::ProcfsProcessKiller),
        drivers,
        encryption: Arc::new(sys::CryptsetupMapper::new(
            config.crypto.key_file.clone(),
            config.paths.device_node_dir.clone(),
        )),
        partition_writer: Arc::new(sys::SfdiskWriter),
        metadata_tool: Arc::new(sys::BlkidTool::new(config.paths.blkid.clone())),
        services: Arc::new(sys::SystemdServices),
        properties: Arc::new(StaticProperties::new(config.crypto.status)),
    }
}
