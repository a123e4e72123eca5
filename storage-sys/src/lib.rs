// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for volume management
//!
//! This crate provides direct system call and CLI tool interfaces used by
//! the volume service:
//! - Mount table inspection and `mount(2)`/`umount(2)`/`mknod(2)`
//! - Process discovery and signalling under a mount point
//! - FAT and NTFS check/mount/format tools
//! - Partition table writing, metadata probing, service control
//! - dm-crypt mappings through cryptsetup
//!
//! Everything here is blocking and requires elevated privileges. Callers
//! running on an async executor should move these calls onto a blocking
//! thread.

pub mod blkid;
pub mod cmd;
pub mod cryptsetup;
pub mod error;
#[cfg(feature = "fs-vfat")]
pub mod fat;
pub mod kernel;
pub mod mounts;
#[cfg(feature = "fs-ntfs")]
pub mod ntfs;
pub mod process;
pub mod sfdisk;
pub mod sysfs;
pub mod systemd;

pub use error::{Result, SysError};
pub use kernel::UnmountStatus;
pub use mounts::{MountEntry, is_mountpoint_mounted, read_mount_table};
pub use process::{ProcessInfo, find_processes_using_mount, signal_processes};
