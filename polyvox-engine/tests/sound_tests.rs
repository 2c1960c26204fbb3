//! Integration tests for Sound driving a Voice
//!
//! **Test Coverage:**
//! - Buffer creation (static vs streaming) and idempotent setup
//! - Refill drive loop until the voice drains
//! - Stop rewinds the decoder for replay
//! - Gain smoothing per category

mod helpers;

use helpers::*;
use polyvox_common::MediaKind;
use polyvox_engine::hardware::Context;
use polyvox_engine::playback::{AudioResource, Sound, SoundState, Voice};
use polyvox_engine::DecoderConfig;
use std::sync::Arc;

fn voice() -> (Arc<Context>, Voice) {
    let context = Arc::new(Context::new(TEST_SAMPLE_RATE, 1));
    let voice = Voice::new(Arc::clone(&context));
    (context, voice)
}

fn render(context: &Context, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; frames];
    context.render(&mut out);
    out
}

/// Test 1: Streaming Setup
///
/// **Scenario:** finish_setup on a streaming resource, twice
/// **Expected:** One buffer per initial chunk, all queued; second call changes nothing
#[test]
fn test_streaming_setup_is_idempotent() {
    let config = streaming_config();
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 10, &config);
    let (_context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    assert!(sound.finish_setup(&mut voice));
    assert!(sound.buffers_created());
    assert!(voice.is_streaming());
    assert_eq!(voice.buffer_count(), config.ring_capacity);
    assert_eq!(voice.queued_buffers(), config.ring_capacity);
    // Decoder topped the ring up again after priming
    assert!(resource.ring().unwrap().is_full());

    assert!(sound.finish_setup(&mut voice));
    assert_eq!(voice.buffer_count(), config.ring_capacity);
    assert_eq!(voice.queued_buffers(), config.ring_capacity);
}

/// Test 2: Static Setup
///
/// **Scenario:** finish_setup on a resource below the static threshold
/// **Expected:** Exactly one buffer holding the whole sound
#[test]
fn test_static_setup_uses_one_buffer() {
    let resource = sine_resource(MediaKind::Effect, 800, &DecoderConfig::default());
    let (context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    assert!(sound.finish_setup(&mut voice));
    assert_eq!(voice.buffer_count(), 1);
    assert!(!voice.is_streaming());
    assert_eq!(context.buffer_count(), 1);
}

/// Test 3: Play To Completion
///
/// **Scenario:** Play ten chunks, rendering one chunk per update
/// **Expected:** Voice never starves; sound stops after the last chunk with
/// the decoder rewound and the voice queue cleared
#[test]
fn test_streaming_playback_drains_and_stops() {
    let config = streaming_config();
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 10, &config);
    let (context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    assert!(sound.finish_setup(&mut voice));
    sound.play(&voice);
    assert_eq!(sound.state(), SoundState::Playing);

    let mut ticks = 0;
    let mut heard = false;
    while !sound.is_finished() {
        let out = render(&context, CHUNK_FRAMES);
        heard |= out.iter().any(|s| s.abs() > 0.01);
        sound.update(&mut voice);
        ticks += 1;
        assert!(ticks <= 20, "sound never finished");
    }

    assert!(heard);
    assert_eq!(ticks, 10);
    assert_eq!(voice.queued_buffers(), 0);
    let ring = resource.ring().unwrap();
    assert!(ring.is_full());
    let decoded_read = resource
        .with_decoder(|d| d.streaming_state().decoded_read)
        .unwrap();
    assert_eq!(decoded_read, (config.ring_capacity * CHUNK_FRAMES * 2) as u64);
}

/// Test 4: Stop Mid-Stream
///
/// **Scenario:** Stop after two chunks played
/// **Expected:** Stopped, queue empty, decoder back at the start
#[test]
fn test_stop_rewinds_for_replay() {
    let config = streaming_config();
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 20, &config);
    let (context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    sound.finish_setup(&mut voice);
    sound.play(&voice);
    for _ in 0..2 {
        render(&context, CHUNK_FRAMES);
        sound.update(&mut voice);
    }

    sound.stop(&mut voice);
    assert_eq!(sound.state(), SoundState::Stopped);
    assert!(voice.is_stopped());
    assert_eq!(voice.queued_buffers(), 0);
    assert!(!resource.with_decoder(|d| d.is_eof()).unwrap());

    // Replay on the same voice
    assert!(sound.finish_setup(&mut voice));
    assert_eq!(voice.queued_buffers(), config.ring_capacity);
    sound.play(&voice);
    assert!(voice.is_playing());
}

/// Test 5: Static Replay
///
/// **Scenario:** Static sound plays out, then is set up and played again
/// **Expected:** The single buffer is recycled with the rewound chunk
#[test]
fn test_static_sound_replays() {
    let resource = sine_resource(MediaKind::Effect, 400, &DecoderConfig::default());
    let (context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    sound.finish_setup(&mut voice);
    sound.play(&voice);
    render(&context, 400);
    sound.update(&mut voice);
    assert!(sound.is_finished());

    assert!(sound.finish_setup(&mut voice));
    assert_eq!(voice.buffer_count(), 1);
    sound.play(&voice);
    assert!(voice.is_playing());
    assert!(render(&context, 400).iter().any(|s| s.abs() > 0.01));
}

/// Test 6: Gain Smoothing
///
/// **Scenario:** Change the effect target while stopped, then while playing
/// **Expected:** Snap when not playing; 0.05 per update while playing
#[test]
fn test_gain_snaps_then_steps() {
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 50, &streaming_config());
    let (_context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 0.2, 0.9);
    assert_eq!(sound.applied_gain(), 0.2);

    sound.set_sound_gain(0.5, 0.9);
    sound.update_gain(&voice);
    assert_eq!(sound.applied_gain(), 0.5);
    assert_eq!(voice.gain(), 0.5);

    sound.finish_setup(&mut voice);
    sound.play(&voice);
    sound.set_sound_gain(0.3, 0.9);
    sound.update_gain(&voice);
    assert!((sound.applied_gain() - 0.45).abs() < 1e-6);
    assert!((voice.gain() - 0.45).abs() < 1e-6);

    for _ in 0..10 {
        sound.update_gain(&voice);
    }
    assert!((sound.applied_gain() - 0.3).abs() < 1e-6);
}

/// Test 7: Category Selection
///
/// **Scenario:** Music and effect sounds given the same pair of gains
/// **Expected:** Each applies its own category
#[test]
fn test_music_uses_music_gain() {
    let config = DecoderConfig::default();
    let music = sine_resource(MediaKind::Music, 100, &config);
    let effect = sine_resource(MediaKind::Effect, 100, &config);

    let music_sound = Sound::new(&music, 0.25, 0.75);
    let effect_sound = Sound::new(&effect, 0.25, 0.75);
    assert_eq!(music_sound.applied_gain(), 0.75);
    assert_eq!(effect_sound.applied_gain(), 0.25);
    assert_eq!(music_sound.kind(), MediaKind::Music);
}

/// Test 8: Missing Audio
///
/// **Scenario:** Setup with an unloaded resource, and after the resource is dropped
/// **Expected:** finish_setup reports failure and creates nothing
#[test]
fn test_setup_without_audio_fails() {
    let (context, mut voice) = voice();

    let unloaded = Arc::new(AudioResource::new("later.wav", MediaKind::Effect));
    let mut sound = Sound::new(&unloaded, 1.0, 1.0);
    assert!(!sound.finish_setup(&mut voice));
    assert!(!sound.buffers_created());

    let dropped = sine_resource(MediaKind::Effect, 100, &DecoderConfig::default());
    let mut orphan = Sound::new(&dropped, 1.0, 1.0);
    drop(dropped);
    assert!(orphan.resource().is_none());
    assert!(!orphan.finish_setup(&mut voice));
    assert_eq!(context.buffer_count(), 0);
}

/// Test 9: Unbind
///
/// **Scenario:** Unbind a playing sound from its voice
/// **Expected:** Hardware buffers deleted, sound ready to bind elsewhere
#[test]
fn test_unbind_releases_buffers() {
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 10, &streaming_config());
    let (context, mut voice) = voice();
    let mut sound = Sound::new(&resource, 1.0, 1.0);
    sound.finish_setup(&mut voice);
    sound.play(&voice);

    sound.unbind(&mut voice);
    assert_eq!(context.buffer_count(), 0);
    assert_eq!(voice.buffer_count(), 0);
    assert!(!sound.buffers_created());
    assert_eq!(sound.state(), SoundState::Ready);
}

/// Test 10: Rate Conversion Across Chunks
///
/// **Scenario:** Stream an 8 kHz sine (44 whole cycles) to a 16 kHz context
/// **Expected:** Output has no step larger than the sine itself produces,
/// runs exactly twice the input length, and is silent afterwards
#[test]
fn test_streaming_conversion_is_continuous() {
    let resource = sine_resource(MediaKind::Effect, CHUNK_FRAMES * 10, &streaming_config());
    let context = Arc::new(Context::new(16000, 1));
    let mut voice = Voice::new(Arc::clone(&context));
    let mut sound = Sound::new(&resource, 1.0, 1.0);

    assert!(sound.finish_setup(&mut voice));
    sound.play(&voice);

    let mut out = Vec::new();
    let mut ticks = 0;
    while !sound.is_finished() {
        out.extend(render(&context, CHUNK_FRAMES * 2));
        sound.update(&mut voice);
        ticks += 1;
        assert!(ticks <= 30, "sound never finished");
    }

    let expected = CHUNK_FRAMES * 10 * 2;
    assert!(out.len() >= expected);
    let max_step = out[..expected]
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0f32, f32::max);
    // A 440 Hz sine at half scale moves at most ~0.086 per 16 kHz frame
    assert!(max_step < 0.12, "discontinuity of {}", max_step);
    assert!(out[expected - 100..expected].iter().any(|s| s.abs() > 0.01));
    assert!(out[expected..].iter().all(|s| *s == 0.0));
}
