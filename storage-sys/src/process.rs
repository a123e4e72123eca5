// SPDX-License-Identifier: GPL-3.0-only

//! Discovery and signalling of processes holding a mount point open

use std::path::Path;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use procfs::process::{FDTarget, Process};
use tracing::{debug, info, warn};

/// A process holding files open under a mount point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub command: String,
}

/// Find all processes with an open file, working directory, root or
/// executable under `mount_point`.
///
/// Processes that vanish or deny access during the scan are skipped.
pub fn find_processes_using_mount(mount_point: &Path) -> Vec<ProcessInfo> {
    if !mount_point.is_absolute() {
        warn!(
            mount_point = %mount_point.display(),
            "Mount point is not an absolute path, returning no processes"
        );
        return Vec::new();
    }

    let all_procs = match procfs::process::all_processes() {
        Ok(procs) => procs,
        Err(e) => {
            warn!("Failed to enumerate processes: {}", e);
            return Vec::new();
        }
    };

    let mut result = Vec::new();
    for proc_result in all_procs {
        let Ok(process) = proc_result else {
            continue;
        };

        if !holds_path(&process, mount_point) {
            continue;
        }

        let command = extract_command(&process);
        debug!(
            "Process {} ({}) has open files under {}",
            process.pid(),
            command,
            mount_point.display()
        );
        result.push(ProcessInfo {
            pid: process.pid(),
            command,
        });
    }

    result
}

/// Send `signal` to every pid; returns how many were signalled.
///
/// PIDs <= 1 are never signalled, vanished processes are not counted.
pub fn signal_processes(pids: &[i32], signal: Signal) -> usize {
    let mut signalled = 0;

    for &pid in pids {
        if pid <= 1 {
            warn!("Refusing to signal system process with PID {}", pid);
            continue;
        }

        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => {
                info!("Sent {} to process {}", signal, pid);
                signalled += 1;
            }
            Err(nix::Error::ESRCH) => {
                debug!("Process {} not found (already terminated)", pid);
            }
            Err(e) => {
                warn!("Failed to send {} to process {}: {}", signal, pid, e);
            }
        }
    }

    signalled
}

fn holds_path(process: &Process, mount_point: &Path) -> bool {
    let under = |path: &Path| path.starts_with(mount_point);

    if process.cwd().is_ok_and(|p| under(&p))
        || process.root().is_ok_and(|p| under(&p))
        || process.exe().is_ok_and(|p| under(&p))
    {
        return true;
    }

    let Ok(fds) = process.fd() else {
        return false;
    };

    fds.flatten().any(|fd| match &fd.target {
        FDTarget::Path(path) => under(path),
        _ => false,
    })
}

fn extract_command(process: &Process) -> String {
    if let Ok(cmdline) = process.cmdline()
        && let Some(cmd) = cmdline.first()
    {
        return Path::new(cmd)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(cmd)
            .to_string();
    }

    if let Ok(stat) = process.stat() {
        return stat.comm;
    }

    format!("<PID {}>", process.pid())
}
