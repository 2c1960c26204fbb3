//! Notification types and the EventBus
//!
//! The engine publishes load-lifecycle transitions and device changes, and
//! listens for configuration changes. Transport is a `tokio` broadcast
//! channel; receivers may be polled with `try_recv` from a synchronous loop.

use crate::resource::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Config key: audio output enabled ("true"/"false")
pub const KEY_AUDIO_ENABLED: &str = "audio.enabled";
/// Config key: effect category volume (0.0-1.0)
pub const KEY_EFFECT_VOLUME: &str = "audio.effect_volume";
/// Config key: music category volume (0.0-1.0)
pub const KEY_MUSIC_VOLUME: &str = "audio.music_volume";
/// Config key: output device name (empty = first enumerated)
pub const KEY_AUDIO_DEVICE: &str = "audio.device";

/// Load lifecycle of an audio resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    /// Known to the loader, not yet started
    Declared,
    /// Decoder is opening and pre-filling
    Loading,
    /// Decoder ready; the resource can be bound to a voice
    Ready,
    /// Load aborted; no decoder state was retained
    Failed { reason: String },
}

impl LoadState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed { .. })
    }
}

/// Events exchanged between the engine and its collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A resource moved through its load lifecycle
    LoadStateChanged {
        resource_id: ResourceId,
        state: LoadState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Live configuration change
    ///
    /// Keys are the `KEY_*` constants of this module. Unknown keys are ignored
    /// by the engine.
    ConfigChanged {
        values: HashMap<String, String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Output device opened or torn down (None = no device)
    DeviceChanged {
        device: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    pub fn load_state(resource_id: ResourceId, state: LoadState) -> Self {
        EngineEvent::LoadStateChanged {
            resource_id,
            state,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn config_changed(values: HashMap<String, String>) -> Self {
        EngineEvent::ConfigChanged {
            values,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn device_changed(device: Option<String>) -> Self {
        EngineEvent::DeviceChanged {
            device,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::LoadStateChanged { .. } => "LoadStateChanged",
            EngineEvent::ConfigChanged { .. } => "ConfigChanged",
            EngineEvent::DeviceChanged { .. } => "DeviceChanged",
        }
    }
}

/// Broadcast bus for [`EngineEvent`]s
///
/// Cloning a receiver is not possible; every consumer calls `subscribe()`.
/// Slow receivers lose the oldest events once `capacity` is exceeded.
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per receiver before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
