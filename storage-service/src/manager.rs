// SPDX-License-Identifier: GPL-3.0-only

//! Registry of volumes serializing commands per volume

use std::collections::BTreeMap;
use std::sync::Arc;

use storage_contracts::{StorageError, StorageErrorKind};
use storage_types::{BlockEvent, VolumeEvent, VolumeSnapshot};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::device::BlockEventOutcome;
use crate::events::EventSink;
use crate::volume::Volume;

/// Owns every volume; one command at a time per volume.
pub struct VolumeManager {
    volumes: BTreeMap<String, Arc<Mutex<Volume>>>,
    events: EventSink,
}

impl VolumeManager {
    pub fn new(events: EventSink) -> Self {
        Self {
            volumes: BTreeMap::new(),
            events,
        }
    }

    /// Sink volumes must be built with so their events reach subscribers.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VolumeEvent> {
        self.events.subscribe()
    }

    pub fn add_volume(&mut self, volume: Volume) -> Result<(), StorageError> {
        let label = volume.label().to_string();
        if self.volumes.contains_key(&label) {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("volume {label} already registered"),
            ));
        }
        info!("Registered volume {label}");
        self.volumes.insert(label, Arc::new(Mutex::new(volume)));
        Ok(())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }

    pub fn volume(&self, label: &str) -> Result<Arc<Mutex<Volume>>, StorageError> {
        self.volumes.get(label).cloned().ok_or_else(|| {
            StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("unknown volume {label}"),
            )
        })
    }

    pub async fn mount(&self, label: &str) -> Result<(), StorageError> {
        let volume = self.volume(label)?;
        let mut volume = volume.lock().await;
        volume.mount().await
    }

    pub async fn unmount(&self, label: &str, force: bool, revert: bool) -> Result<(), StorageError> {
        let volume = self.volume(label)?;
        let mut volume = volume.lock().await;
        volume.unmount(force, revert).await
    }

    pub async fn format(&self, label: &str, wipe: bool) -> Result<(), StorageError> {
        let volume = self.volume(label)?;
        let mut volume = volume.lock().await;
        volume.format(wipe).await
    }

    pub async fn share(&self, label: &str) -> Result<(), StorageError> {
        let volume = self.volume(label)?;
        let mut volume = volume.lock().await;
        volume.share()
    }

    pub async fn unshare(&self, label: &str) -> Result<(), StorageError> {
        let volume = self.volume(label)?;
        let mut volume = volume.lock().await;
        volume.unshare()
    }

    pub async fn set_debug(&self, enable: bool) {
        for volume in self.volumes.values() {
            volume.lock().await.set_debug(enable);
        }
    }

    /// Offer `event` to every volume; returns the volumes that acted on it.
    pub async fn handle_block_event(&self, event: &BlockEvent) -> Vec<(String, BlockEventOutcome)> {
        let mut handled = Vec::new();

        for (label, volume) in &self.volumes {
            let mut volume = volume.lock().await;
            match volume.handle_block_event(event).await {
                Ok(BlockEventOutcome::Ignored) => {}
                Ok(outcome) => {
                    debug!("Volume {label} handled {:?}: {outcome:?}", event.action);
                    handled.push((label.clone(), outcome));
                }
                Err(e) if e.kind == StorageErrorKind::NotImplemented => {}
                Err(e) => warn!("Volume {label} failed to handle block event: {}", e.message),
            }
        }

        handled
    }

    pub async fn snapshot(&self) -> Vec<VolumeSnapshot> {
        let mut snapshots = Vec::with_capacity(self.volumes.len());
        for volume in self.volumes.values() {
            snapshots.push(volume.lock().await.snapshot());
        }
        snapshots
    }
}
