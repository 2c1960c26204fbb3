//! # Polyvox Playback Engine (polyvox-engine)
//!
//! Real-time streaming audio playback with a fixed voice pool.
//!
//! **Purpose:** Decode WAV and Ogg files incrementally into ring buffers of
//! PCM chunks, feed those chunks into hardware voices, and share a bounded set
//! of voices between competing sounds using priority-based stealing.
//!
//! **Architecture:** symphonia (Ogg demux/decoding) + rubato (rate
//! conversion) + a software mixing context rendered through cpal.
//!
//! Nothing here blocks the caller: ring-buffer fullness and voice exhaustion
//! are "try again next tick" conditions polled from `VoicePool::update`.

pub mod audio;
pub mod config;
pub mod error;
pub mod hardware;
pub mod playback;

pub use audio::{FileType, PcmChunk};
pub use config::{DecoderConfig, PoolConfig};
pub use error::{Error, Result};
pub use playback::{AudioResource, Emitter, LoadQueue, SlotState, VoicePool};
