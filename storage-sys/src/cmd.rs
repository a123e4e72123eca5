// SPDX-License-Identifier: GPL-3.0-only

//! Helpers for running external tools

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::{Result, SysError};

/// Resolve `tool` on `PATH`, or accept it verbatim when it is already a path
pub fn find_tool(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|_| SysError::ToolNotFound(tool.to_string()))
}

pub fn render<S: AsRef<OsStr>>(command: &str, args: &[S]) -> String {
    let mut rendered = command.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}

/// Run a tool and return its raw output, whatever the exit status
pub fn run_output<S: AsRef<OsStr>>(command: &str, args: &[S]) -> Result<Output> {
    let binary = find_tool(command)?;
    debug!("Running {}", render(command, args));
    Ok(Command::new(binary).args(args).output()?)
}

/// Run a tool and return stdout, failing on a non-zero exit status
pub fn run_capture<S: AsRef<OsStr>>(command: &str, args: &[S]) -> Result<String> {
    let output = run_output(command, args)?;
    if !output.status.success() {
        return Err(failure(command, args, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a tool with `input` written to its stdin
pub fn run_with_stdin<S: AsRef<OsStr>>(command: &str, args: &[S], input: &str) -> Result<String> {
    let binary = find_tool(command)?;
    debug!("Running {} with {} bytes of input", render(command, args), input.len());

    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(failure(command, args, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub(crate) fn failure<S: AsRef<OsStr>>(command: &str, args: &[S], output: &Output) -> SysError {
    SysError::CommandFailed {
        command: render(command, args),
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
