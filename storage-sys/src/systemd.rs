// SPDX-License-Identifier: GPL-3.0-only

//! Service control through systemctl

use crate::Result;
use crate::cmd::run_capture;

fn unit_name(service: &str) -> String {
    if service.contains('.') {
        service.to_string()
    } else {
        format!("{service}.service")
    }
}

pub fn start(service: &str) -> Result<()> {
    run_capture("systemctl", &["start".to_string(), unit_name(service)])?;
    Ok(())
}

pub fn stop(service: &str) -> Result<()> {
    run_capture("systemctl", &["stop".to_string(), unit_name(service)])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::unit_name;

    #[test]
    fn appends_service_suffix() {
        assert_eq!(unit_name("fuse_sdcard"), "fuse_sdcard.service");
        assert_eq!(unit_name("fuse_sdcard.service"), "fuse_sdcard.service");
    }
}
