// SPDX-License-Identifier: GPL-3.0-only

//! Fan-out of volume notifications to listeners

use storage_types::VolumeEvent;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle that every volume of a manager broadcasts through.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<VolumeEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VolumeEvent> {
        self.tx.subscribe()
    }

    /// Delivery is best-effort; having no listener is not an error.
    pub fn emit(&self, event: VolumeEvent) {
        if self.tx.send(event).is_err() {
            trace!("No listener for volume event");
        }
    }
}
