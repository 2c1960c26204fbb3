//! Playback: voices, sounds and the pool that shares voices between them
//!
//! [`VoicePool`] is the public surface. Resources are loaded through
//! [`LoadQueue`], registered with `create_sound` and started with
//! `use_sound`; `update` is then called once per tick.

pub mod emitter;
pub mod gain;
pub mod loader;
pub mod pool;
pub mod resource;
pub mod sound;
pub mod voice;

pub use emitter::{Emitter, EmitterId};
pub use gain::SmoothedGain;
pub use loader::LoadQueue;
pub use pool::{SlotState, VoicePool};
pub use resource::AudioResource;
pub use sound::{LoopSettings, Sound, SoundState};
pub use voice::Voice;
