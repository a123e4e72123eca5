// SPDX-License-Identifier: GPL-3.0-only

//! storage-volctl - drive configured storage volumes from the command line

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use storage_contracts::StorageError;
use storage_service::config::DEFAULT_CONFIG_PATH;
use storage_service::{
    DirectDevice, EventSink, ServiceConfig, Volume, VolumeContext, VolumeManager, adapters,
    logging,
};
use storage_types::BlockEvent;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "storage-volctl", version, about = "Mount, unmount and format storage volumes")]
struct Cli {
    /// Volume configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose per-volume logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every volume as JSON
    Status,
    Mount {
        label: String,
    },
    Unmount {
        label: String,
        /// Signal processes that keep the volume busy
        #[arg(long)]
        force: bool,
        /// Tear down the decrypted mapping afterwards
        #[arg(long)]
        revert: bool,
    },
    Format {
        label: String,
        /// Discard every block before formatting
        #[arg(long)]
        wipe: bool,
    },
    Share {
        label: String,
    },
    Unshare {
        label: String,
    },
    /// Apply a kernel uevent payload read from stdin
    Event,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(&cli.config)?;
    logging::init(&config.logging)?;

    info!("Starting storage-volctl v{}", env!("CARGO_PKG_VERSION"));

    if !matches!(cli.command, Command::Status) && unsafe { libc::geteuid() } != 0 {
        error!("storage-volctl must run as root");
        bail!("Volume commands require root privileges");
    }

    let manager = build_manager(&config).await?;
    if cli.debug {
        manager.set_debug(true).await;
    }

    let mut events = manager.subscribe();
    let outcome = run(&manager, cli.command).await;

    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    for snapshot in manager.snapshot().await {
        println!("{}", serde_json::to_string(&snapshot)?);
    }

    outcome.map_err(|e| {
        anyhow::anyhow!("{} (errno {})", e, e.kind.errno())
    })
}

async fn run(manager: &VolumeManager, command: Command) -> Result<(), StorageError> {
    match command {
        Command::Status => Ok(()),
        Command::Mount { label } => manager.mount(&label).await,
        Command::Unmount {
            label,
            force,
            revert,
        } => manager.unmount(&label, force, revert).await,
        Command::Format { label, wipe } => manager.format(&label, wipe).await,
        Command::Share { label } => manager.share(&label).await,
        Command::Unshare { label } => manager.unshare(&label).await,
        Command::Event => {
            let mut payload = String::new();
            std::io::stdin().read_to_string(&mut payload)?;
            let Some(event) = BlockEvent::from_uevent(&payload) else {
                warn!("Ignoring uevent outside the block subsystem");
                return Ok(());
            };
            for (label, outcome) in manager.handle_block_event(&event).await {
                info!("{label}: {outcome:?}");
            }
            Ok(())
        }
    }
}

async fn build_manager(config: &ServiceConfig) -> Result<VolumeManager> {
    let ctx = Arc::new(VolumeContext::new(
        adapters::system_collaborators(config),
        config.settings(),
    ));
    let mut manager = VolumeManager::new(EventSink::default());

    for volume_config in &config.volumes {
        let spec = volume_config.to_spec()?;
        let disk = volume_config.disk;

        let partitions = storage_sys::sysfs::disk_partitions(disk).unwrap_or_else(|e| {
            warn!("Cannot list partitions of {disk}: {e}");
            Vec::new()
        });
        let device = DirectDevice::new(disk, spec.partition).with_partitions(partitions);

        let mut volume = Volume::new(spec, Box::new(device), ctx.clone(), manager.events().clone());
        volume.media_detected(storage_sys::sysfs::block_device_present(disk));
        volume.reconcile().await;

        manager
            .add_volume(volume)
            .with_context(|| format!("registering volume {}", volume_config.label))?;
    }

    Ok(manager)
}
