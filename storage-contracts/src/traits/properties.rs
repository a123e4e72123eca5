// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoState {
    #[default]
    Unencrypted,
    Encrypted,
}

/// Device-wide encryption status gating secure-container volumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoStatus {
    /// The disk password has not been entered yet
    pub decrypt_pending: bool,
    /// A background encryption pass is running
    pub encryption_in_progress: bool,
    pub state: CryptoState,
}

/// Source of device-wide properties read at operation time.
pub trait DeviceProperties: Send + Sync {
    fn crypto_status(&self) -> CryptoStatus;
}
