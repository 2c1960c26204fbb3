//! Sounds
//!
//! A [`Sound`] ties one audio resource to whichever [`Voice`] the pool lends
//! it. It moves decoded chunks from the resource's ring buffer into the
//! voice's hardware queue and smooths gain changes.
//!
//! The sound never owns its voice; the pool passes the slot's voice into each
//! call. The resource is held weakly, the registry being its owner.

use super::emitter::Emitter;
use super::gain::SmoothedGain;
use super::resource::AudioResource;
use super::voice::Voice;
use crate::audio::ChunkRingBuffer;
use polyvox_common::{MediaKind, ResourceId};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Transport state as seen by the sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundState {
    /// Not started since creation or last unbind
    #[default]
    Ready,
    Playing,
    Paused,
    /// Finished or stopped; decoder rewound for replay
    Stopped,
}

/// Looping configuration. Not acted on yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSettings {
    pub enabled: bool,
    pub count: Option<u32>,
}

pub struct Sound {
    resource: Weak<AudioResource>,
    id: ResourceId,
    kind: MediaKind,
    emitter: Option<Emitter>,
    effect_gain: SmoothedGain,
    music_gain: SmoothedGain,
    state: SoundState,
    buffers_created: bool,
    loop_settings: LoopSettings,
}

impl Sound {
    /// Sound for `resource` with the pool's current category gains
    pub fn new(resource: &Arc<AudioResource>, effect_gain: f32, music_gain: f32) -> Self {
        Self {
            resource: Arc::downgrade(resource),
            id: resource.id(),
            kind: resource.kind(),
            emitter: None,
            effect_gain: SmoothedGain::new(effect_gain),
            music_gain: SmoothedGain::new(music_gain),
            state: SoundState::Ready,
            buffers_created: false,
            loop_settings: LoopSettings::default(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> SoundState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SoundState::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.state == SoundState::Stopped
    }

    pub fn emitter(&self) -> Option<&Emitter> {
        self.emitter.as_ref()
    }

    pub fn set_emitter(&mut self, emitter: Option<Emitter>) {
        self.emitter = emitter;
    }

    pub fn loop_settings(&self) -> LoopSettings {
        self.loop_settings
    }

    pub fn set_loop_settings(&mut self, settings: LoopSettings) {
        self.loop_settings = settings;
    }

    pub fn buffers_created(&self) -> bool {
        self.buffers_created
    }

    pub fn resource(&self) -> Option<Arc<AudioResource>> {
        self.resource.upgrade()
    }

    fn category_gain(&self) -> &SmoothedGain {
        match self.kind {
            MediaKind::Music => &self.music_gain,
            MediaKind::Effect => &self.effect_gain,
        }
    }

    fn category_gain_mut(&mut self) -> &mut SmoothedGain {
        match self.kind {
            MediaKind::Music => &mut self.music_gain,
            MediaKind::Effect => &mut self.effect_gain,
        }
    }

    fn positional_gain(&self) -> f32 {
        self.emitter.as_ref().map_or(1.0, Emitter::positional_gain)
    }

    /// Gain currently pushed to the voice
    pub fn applied_gain(&self) -> f32 {
        self.category_gain().current() * self.positional_gain()
    }

    /// Gain the sound is moving toward
    pub fn target_gain(&self) -> f32 {
        self.category_gain().target() * self.positional_gain()
    }

    /// Store new category targets; the one matching this sound's kind applies
    pub fn set_sound_gain(&mut self, effect_gain: f32, music_gain: f32) {
        self.effect_gain.set_target(effect_gain);
        self.music_gain.set_target(music_gain);
    }

    /// Apply the target gain, create hardware buffers if needed and queue
    /// whatever the ring buffer holds.
    ///
    /// # Returns
    /// `true` when the voice has at least one buffer queued.
    pub fn finish_setup(&mut self, voice: &mut Voice) -> bool {
        let Some(resource) = self.resource.upgrade() else {
            warn!(resource = %self.id, "Resource dropped before setup");
            return false;
        };
        let Some(ring) = resource.ring() else {
            debug!(resource = %self.id, "Resource has no decoder yet");
            return false;
        };

        self.category_gain_mut().snap();
        voice.set_gain(self.applied_gain());

        if !self.buffers_created {
            if resource.is_static() {
                voice.create_buffer();
            } else {
                voice.create_buffers(&ring);
            }
            self.buffers_created = voice.has_buffers();
            trace!(
                resource = %self.id,
                buffers = voice.buffer_count(),
                "Created voice buffers"
            );
        }

        Self::queue_ready_chunks(voice, &resource, &ring);
        // Room was freed in the ring; decode ahead now rather than next tick
        if let Some(Err(e)) = resource.with_decoder(|d| d.update()) {
            warn!(resource = %self.id, "Decoder update failed: {}", e);
        }

        voice.queued_buffers() > 0
    }

    /// Fill idle buffers, then recycle processed ones, until the ring runs dry.
    ///
    /// The chunk that empties the ring of a finished decoder is queued as the
    /// stream's last, which also drains the voice's rate conversion.
    fn queue_ready_chunks(
        voice: &mut Voice,
        resource: &AudioResource,
        ring: &ChunkRingBuffer,
    ) -> usize {
        let at_eof = || resource.with_decoder(|d| d.is_eof()).unwrap_or(true);
        let mut queued = 0;
        loop {
            let buffer = match voice.next_idle_buffer() {
                Some(buffer) => buffer,
                None => match voice.pop_buffer() {
                    Some(buffer) => buffer,
                    None => break,
                },
            };
            let Some(chunk) = ring.next_read() else {
                break;
            };
            let accepted = if ring.is_empty() && at_eof() {
                voice.queue_last_buffer(buffer, &chunk)
            } else {
                voice.queue_buffer(buffer, &chunk)
            };
            if !accepted {
                break;
            }
            queued += 1;
        }
        // End of stream noticed only after the last chunk went out
        if ring.is_empty() && at_eof() && voice.flush_stream() {
            queued += 1;
        }
        queued
    }

    pub fn play(&mut self, voice: &Voice) {
        voice.play();
        self.state = SoundState::Playing;
    }

    pub fn pause(&mut self, voice: &Voice) {
        if self.state == SoundState::Playing {
            voice.pause();
            self.state = SoundState::Paused;
        }
    }

    pub fn resume(&mut self, voice: &Voice) {
        if self.state == SoundState::Paused {
            voice.resume();
            self.state = SoundState::Playing;
        }
    }

    /// Refill the voice from the ring buffer and stop once the voice drains.
    pub fn update(&mut self, voice: &mut Voice) {
        let Some(resource) = self.resource.upgrade() else {
            return;
        };

        if voice.processed_buffers() > 0 || voice.next_idle_buffer().is_some() {
            if let Some(Err(e)) = resource.with_decoder(|d| d.update()) {
                warn!(resource = %self.id, "Decoder update failed: {}", e);
            }
            if let Some(ring) = resource.ring() {
                let queued = Self::queue_ready_chunks(voice, &resource, &ring);
                if queued > 0 {
                    trace!(resource = %self.id, queued, "Refilled voice");
                }
            }
        }

        if self.state == SoundState::Playing && voice.is_stopped() {
            debug!(resource = %self.id, "Voice drained");
            self.stop(voice);
        }
    }

    /// Stop playback, rewind the decoder and clear the voice queue
    pub fn stop(&mut self, voice: &mut Voice) {
        voice.stop(false);
        if let Some(resource) = self.resource.upgrade() {
            let rewound = resource.with_decoder(|d| d.reset().and_then(|()| d.update()));
            if let Some(Err(e)) = rewound {
                warn!(resource = %self.id, "Decoder reset failed: {}", e);
            }
        }
        voice.remove_all_queued_buffers();
        self.state = SoundState::Stopped;
    }

    /// Step (while playing) or snap the category gain and push it to the voice
    pub fn update_gain(&mut self, voice: &Voice) {
        if self.state == SoundState::Playing {
            self.category_gain_mut().step();
        } else {
            self.category_gain_mut().snap();
        }
        voice.set_gain(self.applied_gain());
    }

    /// Detach from `voice`, deleting its buffers
    pub fn unbind(&mut self, voice: &mut Voice) {
        voice.release_buffers();
        self.buffers_created = false;
        self.emitter = None;
        if self.state != SoundState::Stopped {
            self.state = SoundState::Ready;
        }
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("gain", &self.applied_gain())
            .field("buffers_created", &self.buffers_created)
            .finish()
    }
}
