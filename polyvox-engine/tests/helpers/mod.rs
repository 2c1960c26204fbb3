//! Test helper modules for polyvox-engine integration tests
//!
//! - audio_generator: WAV files and malformed container bytes
//! - engine fixtures: decoders, resources and headless pools

#![allow(dead_code)]

pub mod audio_generator;

use polyvox_common::MediaKind;
use polyvox_engine::hardware::HeadlessHost;
use polyvox_engine::{AudioResource, DecoderConfig, PoolConfig, VoicePool};
use std::io::Cursor;
use std::sync::Arc;

pub use audio_generator::*;

/// 10 ms chunks, four per ring, never static
pub fn streaming_config() -> DecoderConfig {
    DecoderConfig {
        ring_capacity: 4,
        chunk_duration_ms: 10,
        static_threshold_bytes: 0,
    }
}

/// Frames in one chunk of [`streaming_config`] at [`TEST_SAMPLE_RATE`]
pub const CHUNK_FRAMES: usize = (TEST_SAMPLE_RATE / 100) as usize;

/// A loaded in-memory sine resource
pub fn sine_resource(kind: MediaKind, frames: usize, config: &DecoderConfig) -> Arc<AudioResource> {
    let resource = Arc::new(AudioResource::new("sine.wav", kind));
    resource
        .load_from_reader(
            Cursor::new(sine_wav_bytes(TEST_SAMPLE_RATE, 1, frames)),
            config,
        )
        .expect("sine resource loads");
    resource
}

/// Headless host rendering mono at [`TEST_SAMPLE_RATE`]
pub fn headless_host(names: &[&str]) -> Arc<HeadlessHost> {
    Arc::new(HeadlessHost::with_format(
        names.iter().copied(),
        TEST_SAMPLE_RATE,
        1,
    ))
}

/// Initialized pool with `voices` slots on a one-device headless host
pub fn headless_pool(voices: usize) -> VoicePool {
    let config = PoolConfig {
        voice_count: voices,
        ..PoolConfig::default()
    };
    let mut pool = VoicePool::new(config, Box::new(headless_host(&["Test Output"])));
    pool.initialize().expect("headless device opens");
    pool
}

/// Render `frames` frames of mono output from the pool's context
pub fn render(pool: &VoicePool, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; frames];
    if let Some(context) = pool.context() {
        context.render(&mut out);
    }
    out
}
