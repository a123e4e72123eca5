// SPDX-License-Identifier: GPL-3.0-only

//! Sub-partition records of multi-partition external media

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::DeviceNumber;

/// Single-character slot `'A'..='Z'` identifying a mounted sub-partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct DriveLetter(u8);

impl DriveLetter {
    pub const COUNT: usize = 26;

    /// Letter for slot `index` (0 is `'A'`)
    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_char(self) -> char {
        (b'A' + self.0) as char
    }
}

impl fmt::Display for DriveLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<char> for DriveLetter {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        if value.is_ascii_uppercase() {
            Ok(Self(value as u8 - b'A'))
        } else {
            Err(format!("'{value}' is not a drive letter"))
        }
    }
}

impl From<DriveLetter> for char {
    fn from(value: DriveLetter) -> Self {
        value.as_char()
    }
}

/// A mounted sub-partition of a multi-partition volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub device: DeviceNumber,
    pub letter: DriveLetter,
    pub mount_point: PathBuf,
}
