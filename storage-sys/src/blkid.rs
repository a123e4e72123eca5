// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem identification through blkid

use std::path::Path;

use tracing::debug;

use crate::Result;
use crate::cmd::run_output;

/// First line printed by `blkid [-c cache] device`.
///
/// blkid exits non-zero when it cannot identify the device; that is
/// reported as `Ok(None)`. Only a launch failure is an error.
pub fn identify(blkid: &str, device: &Path, cache: Option<&Path>) -> Result<Option<String>> {
    let mut args = Vec::new();
    if let Some(cache) = cache {
        args.push("-c".to_string());
        args.push(cache.display().to_string());
    }
    args.push(device.display().to_string());

    let output = run_output(blkid, &args)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = first_line(&stdout);
    debug!("blkid identified {} as {:?}", device.display(), line);
    Ok(line)
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::first_line;

    #[test]
    fn takes_only_the_first_line() {
        let out = "/dev/sda1: UUID=\"1234-ABCD\" TYPE=\"vfat\"\n/dev/sda2: TYPE=\"swap\"\n";
        assert_eq!(
            first_line(out).as_deref(),
            Some("/dev/sda1: UUID=\"1234-ABCD\" TYPE=\"vfat\"")
        );
        assert_eq!(first_line(""), None);
        assert_eq!(first_line("\n"), None);
    }
}
