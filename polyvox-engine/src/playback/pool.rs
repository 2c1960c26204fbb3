//! Voice pool
//!
//! The single entry point for playback. Owns the output device, a fixed array
//! of voice slots and the registry of sounds keyed by resource identity.
//!
//! **Allocation:** `use_sound` takes the first inactive slot; failing that it
//! steals the first slot whose stored priority is numerically less than the
//! requested one. Nothing changes when neither search succeeds.
//!
//! **Threading:** the pool is driven from one thread. Configuration events
//! arrive through a broadcast receiver drained in `update`.
//!
//! Without an output device the pool is silent: transport and gain calls
//! succeed and do nothing.

use super::emitter::Emitter;
use super::resource::AudioResource;
use super::sound::Sound;
use super::voice::Voice;
use crate::audio::{sniff_path, sniff_reader, FileType};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::hardware::{AudioHost, Context, OutputDevice};
use chrono::{DateTime, Utc};
use polyvox_common::events::{
    EngineEvent, EventBus, KEY_AUDIO_DEVICE, KEY_AUDIO_ENABLED, KEY_EFFECT_VOLUME,
    KEY_MUSIC_VOLUME,
};
use polyvox_common::ResourceId;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// One voice slot
#[derive(Debug, Default)]
struct VoiceSlot {
    active: bool,
    priority: u8,
    sound: Option<ResourceId>,
    voice: Option<Voice>,
    bound_at: Option<DateTime<Utc>>,
}

impl VoiceSlot {
    fn clear(&mut self) {
        self.active = false;
        self.priority = 0;
        self.sound = None;
        self.bound_at = None;
    }
}

/// Snapshot of a slot for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotState {
    pub index: usize,
    pub active: bool,
    pub priority: u8,
    pub resource: Option<ResourceId>,
    pub bound_at: Option<DateTime<Utc>>,
}

struct RegistryEntry {
    resource: Arc<AudioResource>,
    sound: Sound,
}

pub struct VoicePool {
    config: PoolConfig,
    host: Box<dyn AudioHost>,
    device: Option<OutputDevice>,
    slots: Box<[VoiceSlot]>,
    registry: HashMap<ResourceId, RegistryEntry>,
    effect_gain: f32,
    music_gain: f32,
    events: Option<Arc<EventBus>>,
    config_rx: Option<broadcast::Receiver<EngineEvent>>,
    elapsed: Duration,
}

impl VoicePool {
    /// Create a pool with `config.voice_count` slots; no device is opened
    /// until [`initialize`](Self::initialize).
    pub fn new(config: PoolConfig, host: Box<dyn AudioHost>) -> Self {
        let slots = (0..config.voice_count.max(1))
            .map(|_| VoiceSlot::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let effect_gain = valid_gain(config.effect_volume).unwrap_or(1.0);
        let music_gain = valid_gain(config.music_volume).unwrap_or(1.0);
        Self {
            config,
            host,
            device: None,
            slots,
            registry: HashMap::new(),
            effect_gain,
            music_gain,
            events: None,
            config_rx: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Publish device changes on `bus` and apply `ConfigChanged` events
    /// received from it during `update`
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.config_rx = Some(bus.subscribe());
        self.events = Some(bus);
        self
    }

    // ----- device -----

    /// Open the configured device.
    ///
    /// Disabled audio is not an error; the pool stays silent.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("Audio disabled; running without output");
            return Ok(());
        }
        let name = self.config.device.clone();
        self.set_output_device(name.as_deref())
    }

    /// Switch to another output device.
    ///
    /// The new device is opened first; on failure the current device (if
    /// any) keeps playing and the error is returned.
    pub fn set_output_device(&mut self, name: Option<&str>) -> Result<()> {
        let device = match self.host.open_output(name) {
            Ok(device) => device,
            Err(e) => {
                warn!("Failed to open output device {:?}: {}", name, e);
                return Err(e);
            }
        };

        self.teardown_voices();
        let context = Arc::clone(device.context());
        for slot in self.slots.iter_mut() {
            slot.voice = Some(Voice::new(Arc::clone(&context)));
        }

        info!(
            voices = self.slots.len(),
            "Output device ready: {}",
            device.name()
        );
        let device_name = device.name().to_string();
        self.device = Some(device);
        self.config.device = name.map(str::to_string);
        self.publish(EngineEvent::device_changed(Some(device_name)));
        Ok(())
    }

    /// Tear down voices, context and device; the pool becomes silent
    pub fn shutdown(&mut self) {
        if self.device.is_none() {
            return;
        }
        self.teardown_voices();
        self.device = None;
        info!("Audio output shut down");
        self.publish(EngineEvent::device_changed(None));
    }

    fn teardown_voices(&mut self) {
        for slot in self.slots.iter_mut() {
            if let (Some(id), Some(voice)) = (slot.sound, slot.voice.as_mut()) {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.sound.stop(voice);
                    entry.sound.unbind(voice);
                }
            }
            slot.clear();
            slot.voice = None;
        }
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(OutputDevice::name)
    }

    /// Mixing context of the open device
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.device.as_ref().map(OutputDevice::context)
    }

    /// Names of all output devices; empty if enumeration fails
    pub fn get_all_output_devices(&self) -> Vec<String> {
        match self.host.output_device_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Sniff the container format of a file; unreadable files are `Invalid`
    pub fn get_filetype(&self, path: &Path) -> FileType {
        match sniff_path(path) {
            Ok(file_type) => file_type,
            Err(e) => {
                debug!(path = %path.display(), "Cannot sniff file: {}", e);
                FileType::Invalid
            }
        }
    }

    /// Sniff the container format from an open handle; read errors are `Invalid`.
    ///
    /// The handle is restored to its position on entry.
    pub fn get_filetype_reader<R: Read + Seek>(&self, reader: &mut R) -> FileType {
        match sniff_reader(reader) {
            Ok(file_type) => file_type,
            Err(e) => {
                debug!("Cannot sniff stream: {}", e);
                FileType::Invalid
            }
        }
    }

    // ----- registry -----

    /// Register a sound for `resource`.
    ///
    /// # Errors
    /// `NoDevice` without an output device, `AlreadyExists` if the resource
    /// already has a sound.
    pub fn create_sound(&mut self, resource: Arc<AudioResource>) -> Result<ResourceId> {
        if self.device.is_none() {
            return Err(Error::NoDevice);
        }
        let id = resource.id();
        if self.registry.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        let sound = Sound::new(&resource, self.effect_gain, self.music_gain);
        debug!(resource = %id, kind = ?resource.kind(), "Sound created");
        self.registry.insert(id, RegistryEntry { resource, sound });
        Ok(id)
    }

    pub fn find_sound(&self, id: ResourceId) -> Option<&Sound> {
        self.registry.get(&id).map(|entry| &entry.sound)
    }

    pub fn sound_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop the sound if bound and forget it
    pub fn release_sound(&mut self, id: ResourceId) -> Result<()> {
        if !self.registry.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        if let Some(index) = self.slot_of(id) {
            self.release_slot(index, true);
        }
        self.registry.remove(&id);
        debug!(resource = %id, "Sound released");
        Ok(())
    }

    // ----- allocation -----

    fn slot_of(&self, id: ResourceId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.active && slot.sound == Some(id))
    }

    fn find_slot(&self, priority: u8) -> Option<usize> {
        if let Some(index) = self.slots.iter().position(|slot| !slot.active) {
            return Some(index);
        }
        // Stored priority below the requested one is stolen (lower = more important)
        self.slots
            .iter()
            .position(|slot| slot.priority < priority)
    }

    /// Unbind whatever occupies `index`; `stop` also rewinds the sound
    fn release_slot(&mut self, index: usize, stop: bool) {
        let slot = &mut self.slots[index];
        if let (Some(id), Some(voice)) = (slot.sound, slot.voice.as_mut()) {
            if let Some(entry) = self.registry.get_mut(&id) {
                if stop && !entry.sound.is_finished() {
                    entry.sound.stop(voice);
                }
                entry.sound.unbind(voice);
            }
        }
        slot.clear();
    }

    /// Bind a registered sound to a voice and start it.
    ///
    /// # Returns
    /// Index of the slot now playing the sound.
    ///
    /// # Errors
    /// `NoDevice`, `NotFound`, `NotReady` when the resource has no decoded
    /// audio, and `NoVoiceAvailable` when every slot is busy with nothing to
    /// steal. None of these change the pool.
    pub fn use_sound(
        &mut self,
        emitter: Option<Emitter>,
        id: ResourceId,
        priority: u8,
    ) -> Result<usize> {
        if self.device.is_none() {
            return Err(Error::NoDevice);
        }
        let entry = self.registry.get(&id).ok_or(Error::NotFound(id))?;
        if !entry.resource.is_ready() {
            return Err(Error::NotReady(id));
        }

        // Already playing: restart in place
        let index = match self.slot_of(id) {
            Some(index) => {
                self.release_slot(index, true);
                index
            }
            None => {
                let Some(index) = self.find_slot(priority) else {
                    warn!(resource = %id, priority, "No voice available");
                    return Err(Error::NoVoiceAvailable { priority });
                };
                if self.slots[index].active {
                    debug!(
                        slot = index,
                        evicted_priority = self.slots[index].priority,
                        priority,
                        "Stealing voice"
                    );
                    self.release_slot(index, true);
                }
                index
            }
        };

        let slot = &mut self.slots[index];
        let Some(voice) = slot.voice.as_mut() else {
            return Err(Error::NoDevice);
        };
        let Some(entry) = self.registry.get_mut(&id) else {
            return Err(Error::NotFound(id));
        };

        entry.sound.set_emitter(emitter);
        entry.sound.set_sound_gain(self.effect_gain, self.music_gain);
        if !entry.sound.finish_setup(voice) {
            entry.sound.unbind(voice);
            slot.clear();
            return Err(Error::NotReady(id));
        }
        entry.sound.play(voice);

        slot.active = true;
        slot.priority = priority;
        slot.sound = Some(id);
        slot.bound_at = Some(Utc::now());
        debug!(slot = index, resource = %id, priority, "Voice bound");
        Ok(index)
    }

    // ----- transport -----

    pub fn global_pause(&mut self) {
        let Some(device) = &self.device else {
            return;
        };
        device.context().suspend();
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            if let (Some(id), Some(voice)) = (slot.sound, slot.voice.as_ref()) {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.sound.pause(voice);
                }
            }
        }
    }

    pub fn global_resume(&mut self) {
        let Some(device) = &self.device else {
            return;
        };
        device.context().process();
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            if let (Some(id), Some(voice)) = (slot.sound, slot.voice.as_ref()) {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.sound.resume(voice);
                }
            }
        }
    }

    /// Stop every sound and free every slot
    pub fn global_stop(&mut self) {
        let Some(device) = &self.device else {
            return;
        };
        device.context().stop_all();
        for index in 0..self.slots.len() {
            if self.slots[index].active {
                self.release_slot(index, true);
            }
        }
    }

    // ----- gain -----

    /// Set category volumes. Values outside [0, 1] leave that category
    /// unchanged.
    pub fn set_sound_gain(&mut self, effects: f32, music: f32) {
        match valid_gain(effects) {
            Some(gain) => self.effect_gain = gain,
            None => debug!(effects, "Ignoring invalid effect gain"),
        }
        match valid_gain(music) {
            Some(gain) => self.music_gain = gain,
            None => debug!(music, "Ignoring invalid music gain"),
        }

        for slot in self.slots.iter().filter(|s| s.active) {
            if let Some(entry) = slot.sound.and_then(|id| self.registry.get_mut(&id)) {
                entry.sound.set_sound_gain(self.effect_gain, self.music_gain);
            }
        }
    }

    pub fn effect_gain(&self) -> f32 {
        self.effect_gain
    }

    pub fn music_gain(&self) -> f32 {
        self.music_gain
    }

    // ----- configuration -----

    /// Apply configuration keys: enable/disable audio, switch device or
    /// change volumes. Unknown keys are ignored.
    pub fn apply_config_change(&mut self, values: &HashMap<String, String>) {
        if let Some(raw) = values.get(KEY_AUDIO_ENABLED) {
            match raw.trim().parse::<bool>() {
                Ok(false) => {
                    self.config.enabled = false;
                    self.shutdown();
                }
                Ok(true) => {
                    self.config.enabled = true;
                    if self.device.is_none() {
                        if let Err(e) = self.initialize() {
                            warn!("Re-enabling audio failed: {}", e);
                        }
                    }
                }
                Err(_) => warn!(value = %raw, "Invalid {} value", KEY_AUDIO_ENABLED),
            }
        }

        if let Some(raw) = values.get(KEY_AUDIO_DEVICE) {
            let name = Some(raw.trim()).filter(|n| !n.is_empty());
            if self.config.enabled && self.config.device.as_deref() != name {
                if let Err(e) = self.set_output_device(name) {
                    debug!("Keeping current output device after failed switch: {}", e);
                }
            } else if !self.config.enabled {
                self.config.device = name.map(str::to_string);
            }
        }

        let effects = values.get(KEY_EFFECT_VOLUME);
        let music = values.get(KEY_MUSIC_VOLUME);
        if effects.is_some() || music.is_some() {
            let parse = |raw: Option<&String>, current: f32| {
                raw.map_or(current, |r| r.trim().parse::<f32>().unwrap_or(f32::NAN))
            };
            let effects = parse(effects, self.effect_gain);
            let music = parse(music, self.music_gain);
            self.set_sound_gain(effects, music);
        }
    }

    fn drain_events(&mut self) {
        let Some(rx) = self.config_rx.as_mut() else {
            return;
        };
        let mut changes = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(EngineEvent::ConfigChanged { values, .. }) => changes.push(values),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event receiver lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        for values in changes {
            self.apply_config_change(&values);
        }
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }

    // ----- tick -----

    /// Per-tick drive: apply pending configuration, refill voices, smooth
    /// gains and release slots whose sound finished.
    pub fn update(&mut self, delta: Duration) {
        self.elapsed += delta;
        self.drain_events();

        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if !slot.active {
                continue;
            }
            let (Some(id), Some(voice)) = (slot.sound, slot.voice.as_mut()) else {
                continue;
            };
            let Some(entry) = self.registry.get_mut(&id) else {
                slot.clear();
                continue;
            };

            entry.sound.update(voice);
            entry.sound.update_gain(voice);
            if entry.sound.is_finished() {
                debug!(slot = index, resource = %id, "Sound finished; releasing voice");
                self.release_slot(index, false);
            }
        }
    }

    /// Total time passed to `update`
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn voice_count(&self) -> usize {
        self.slots.len()
    }

    pub fn active_voice_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotState {
                index,
                active: slot.active,
                priority: slot.priority,
                resource: slot.sound,
                bound_at: slot.bound_at,
            })
            .collect()
    }
}

impl Drop for VoicePool {
    fn drop(&mut self) {
        self.teardown_voices();
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("device", &self.device_name())
            .field("voices", &self.slots.len())
            .field("active", &self.active_voice_count())
            .field("sounds", &self.registry.len())
            .field("effect_gain", &self.effect_gain)
            .field("music_gain", &self.music_gain)
            .finish()
    }
}

fn valid_gain(gain: f32) -> Option<f32> {
    (gain.is_finite() && (0.0..=1.0).contains(&gain)).then_some(gain)
}
