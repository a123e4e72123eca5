// SPDX-License-Identifier: GPL-3.0-only

//! TOML configuration of the volume service

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storage_contracts::CryptoStatus;
use storage_types::{DeviceNumber, PartitionIndex, VolumeFlag, VolumeFlags};
use thiserror::Error;

use crate::context::VolumeSettings;
use crate::unmount::UnmountPolicy;
use crate::volume::{MountLayout, VolumeSpec};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/storage-volumes.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub paths: PathsConfig,
    pub crypto: CryptoConfig,
    pub mount: MountConfig,
    pub unmount: UnmountConfig,
    pub logging: LoggingConfig,
    #[serde(rename = "volume")]
    pub volumes: Vec<VolumeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub device_node_dir: PathBuf,
    pub secure_mount_dir: PathBuf,
    pub metadata_cache: PathBuf,
    /// Identification tool binary
    pub blkid: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let settings = VolumeSettings::default();
        Self {
            device_node_dir: settings.device_node_dir,
            secure_mount_dir: settings.secure_mount_dir,
            metadata_cache: settings.metadata_cache,
            blkid: "blkid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    #[serde(flatten)]
    pub status: CryptoStatus,
    /// Key handed to the mapper when decrypting encryptable volumes
    pub key_file: PathBuf,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            status: CryptoStatus::default(),
            key_file: PathBuf::from("/etc/storage-volumes.key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub alternate_mount_group: bool,
    pub lenient_check: bool,
    pub settle_delay_ms: u64,
    pub bridge_stop_grace_ms: u64,
    pub secure_dir_name: String,
    pub legacy_secure_dir_name: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        let settings = VolumeSettings::default();
        Self {
            alternate_mount_group: settings.alternate_mount_group,
            lenient_check: settings.lenient_check,
            settle_delay_ms: settings.settle_delay.as_millis() as u64,
            bridge_stop_grace_ms: settings.bridge_stop_grace.as_millis() as u64,
            secure_dir_name: settings.secure_dir_name,
            legacy_secure_dir_name: settings.legacy_secure_dir_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmountConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub hangup_below: u32,
    pub kill_below: u32,
}

impl Default for UnmountConfig {
    fn default() -> Self {
        let policy = UnmountPolicy::default();
        Self {
            attempts: policy.attempts,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            hangup_below: policy.hangup_below,
            kill_below: policy.kill_below,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Also write daily-rotated logs here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "storage_service=info,storage_sys=info,warn".to_string(),
            directory: None,
        }
    }
}

/// Partition selector as written in TOML: `"whole"` or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionSetting {
    Index(u32),
    Named(String),
}

impl Default for PartitionSetting {
    fn default() -> Self {
        Self::Named("whole".to_string())
    }
}

impl PartitionSetting {
    pub fn resolve(&self) -> Result<PartitionIndex> {
        match self {
            Self::Index(0) => Err(ConfigError::Invalid(
                "partition numbers start at 1".to_string(),
            )),
            Self::Index(n) => Ok(PartitionIndex::Index(*n)),
            Self::Named(name) if name == "whole" => Ok(PartitionIndex::WholeDevice),
            Self::Named(name) => Err(ConfigError::Invalid(format!(
                "partition must be \"whole\" or a number, got \"{name}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub label: String,
    pub mount_point: PathBuf,
    pub bridge_mount_point: Option<PathBuf>,
    pub disk: DeviceNumber,
    #[serde(default)]
    pub partition: PartitionSetting,
    #[serde(default)]
    pub flags: Vec<VolumeFlag>,
    /// Mount every partition under `mount_point` by drive letter
    #[serde(default)]
    pub multi_partition: bool,
    #[serde(default)]
    pub format_label: Option<String>,
}

impl VolumeConfig {
    pub fn flags(&self) -> VolumeFlags {
        self.flags.iter().copied().collect()
    }

    pub fn to_spec(&self) -> Result<VolumeSpec> {
        let mut spec = VolumeSpec::new(&self.label, &self.mount_point)
            .with_flags(self.flags())
            .with_partition(self.partition.resolve()?);

        if let Some(bridge) = &self.bridge_mount_point {
            spec = spec.with_bridge_mount_point(bridge);
        }
        if self.multi_partition {
            spec = spec.with_layout(MountLayout::MultiPartition {
                root: self.mount_point.clone(),
            });
        }
        if let Some(label) = &self.format_label {
            spec = spec.with_format_label(label);
        }
        Ok(spec)
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let unmount = &self.unmount;
        if unmount.attempts == 0 {
            return Err(ConfigError::Invalid(
                "unmount.attempts must be at least 1".to_string(),
            ));
        }
        if unmount.kill_below > unmount.hangup_below {
            return Err(ConfigError::Invalid(
                "unmount.kill_below must not exceed unmount.hangup_below".to_string(),
            ));
        }
        if self.mount.secure_dir_name.is_empty() || self.mount.secure_dir_name.contains('/') {
            return Err(ConfigError::Invalid(
                "mount.secure_dir_name must be a single path component".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for volume in &self.volumes {
            if volume.label.is_empty() {
                return Err(ConfigError::Invalid("volume label must not be empty".to_string()));
            }
            if !labels.insert(volume.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate volume label {}",
                    volume.label
                )));
            }
            if !volume.mount_point.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "mount_point of {} must be absolute",
                    volume.label
                )));
            }
            let partition = volume.partition.resolve()?;
            if volume.multi_partition && !partition.is_whole_device() {
                return Err(ConfigError::Invalid(format!(
                    "multi_partition volume {} must use the whole device",
                    volume.label
                )));
            }
        }

        Ok(())
    }

    pub fn settings(&self) -> VolumeSettings {
        VolumeSettings {
            device_node_dir: self.paths.device_node_dir.clone(),
            secure_mount_dir: self.paths.secure_mount_dir.clone(),
            metadata_cache: self.paths.metadata_cache.clone(),
            alternate_mount_group: self.mount.alternate_mount_group,
            lenient_check: self.mount.lenient_check,
            settle_delay: Duration::from_millis(self.mount.settle_delay_ms),
            bridge_stop_grace: Duration::from_millis(self.mount.bridge_stop_grace_ms),
            secure_dir_name: self.mount.secure_dir_name.clone(),
            legacy_secure_dir_name: self.mount.legacy_secure_dir_name.clone(),
            unmount: UnmountPolicy {
                attempts: self.unmount.attempts,
                retry_delay: Duration::from_millis(self.unmount.retry_delay_ms),
                hangup_below: self.unmount.hangup_below,
                kill_below: self.unmount.kill_below,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_contracts::CryptoState;

    const SAMPLE: &str = r#"
[paths]
device_node_dir = "/dev/block/vold"

[crypto]
decrypt_pending = true
state = "encrypted"

[mount]
alternate_mount_group = true

[unmount]
retry_delay_ms = 0

[[volume]]
label = "sdcard"
mount_point = "/mnt/media_rw/sdcard"
bridge_mount_point = "/storage/sdcard"
disk = "179:0"
partition = 1
flags = ["provides_secure_container", "encryptable"]

[[volume]]
label = "usb"
mount_point = "/mnt/usb"
disk = "8:0"
multi_partition = true
"#;

    #[test]
    fn parses_sample_config() {
        let config = ServiceConfig::parse(SAMPLE).unwrap();
        assert!(config.crypto.status.decrypt_pending);
        assert_eq!(config.crypto.status.state, CryptoState::Encrypted);
        assert_eq!(config.volumes.len(), 2);

        let sdcard = config.volumes[0].to_spec().unwrap();
        assert_eq!(sdcard.partition, PartitionIndex::Index(1));
        assert!(sdcard.flags.contains(VolumeFlag::Encryptable));
        assert_eq!(sdcard.bridge_mount_point, PathBuf::from("/storage/sdcard"));

        let usb = config.volumes[1].to_spec().unwrap();
        assert_eq!(usb.partition, PartitionIndex::WholeDevice);
        assert_eq!(
            usb.layout,
            MountLayout::MultiPartition {
                root: PathBuf::from("/mnt/usb")
            }
        );
        assert_eq!(usb.bridge_mount_point, PathBuf::from("/mnt/usb"));
    }

    #[test]
    fn defaults_match_built_in_policy() {
        let config = ServiceConfig::parse("").unwrap();
        let settings = config.settings();
        assert_eq!(settings.unmount, UnmountPolicy::default());
        assert_eq!(settings.secure_dir_name, ".android_secure");
        assert_eq!(settings.settle_delay, Duration::from_secs(1));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let raw = r#"
[[volume]]
label = "sdcard"
mount_point = "/mnt/a"
disk = "179:0"

[[volume]]
label = "sdcard"
mount_point = "/mnt/b"
disk = "179:8"
"#;
        assert!(matches!(
            ServiceConfig::parse(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_partition_names() {
        let raw = r#"
[[volume]]
label = "sdcard"
mount_point = "/mnt/a"
disk = "179:0"
partition = "first"
"#;
        assert!(matches!(
            ServiceConfig::parse(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_inverted_escalation() {
        let raw = "[unmount]\nhangup_below = 10\nkill_below = 20\n";
        assert!(ServiceConfig::parse(raw).is_err());
    }
}
