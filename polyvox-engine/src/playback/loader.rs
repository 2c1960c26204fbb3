//! Deferred resource loading
//!
//! Resources are queued as they are declared and loaded together on `sync`,
//! which may run on a worker thread while the pool keeps ticking. Every
//! transition is published on the event bus.

use super::resource::AudioResource;
use crate::config::DecoderConfig;
use parking_lot::Mutex;
use polyvox_common::events::{EngineEvent, EventBus, LoadState};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LoadQueue {
    pending: Mutex<VecDeque<Arc<AudioResource>>>,
    config: DecoderConfig,
    events: Option<Arc<EventBus>>,
}

impl LoadQueue {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            config,
            events: None,
        }
    }

    /// Publish load transitions on `bus`
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    fn publish(&self, resource: &AudioResource, state: LoadState) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(EngineEvent::load_state(resource.id(), state));
        }
    }

    /// Record a resource for the next `sync`
    pub fn queue(&self, resource: Arc<AudioResource>) {
        debug!(resource = %resource.id(), path = %resource.path().display(), "Load queued");
        self.publish(&resource, LoadState::Declared);
        self.pending.lock().push_back(resource);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Load everything queued, in order.
    ///
    /// # Returns
    /// Number of resources that loaded successfully.
    pub fn sync(&self) -> usize {
        let batch: Vec<Arc<AudioResource>> = self.pending.lock().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let mut loaded = 0;
        for resource in batch {
            self.publish(&resource, LoadState::Loading);
            // load() records the outcome on the resource itself
            let _ = resource.load(&self.config);
            let state = resource.load_state();
            if state.is_ready() {
                loaded += 1;
            }
            self.publish(&resource, state);
        }

        info!("Loaded {}/{} resources", loaded, total);
        loaded
    }
}

impl std::fmt::Debug for LoadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadQueue")
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish()
    }
}
