//! Integration tests for the streaming decoders
//!
//! **Test Coverage:**
//! - Full streaming round trip of a WAV file written by hound
//! - Replay after reset reproduces the initial fill
//! - Static/streaming decision
//! - RIFF chunk ordering, extensions and unknown chunks
//! - Load failures leave the decoder unloaded
//! - Real Ogg Vorbis: full stream, replay, chained links, damaged pages

mod helpers;

use helpers::*;
use polyvox_engine::audio::decoder::SourceHandle;
use polyvox_engine::audio::{Decoder, DecoderState};
use polyvox_common::MediaKind;
use polyvox_engine::{AudioResource, DecoderConfig, Error, FileType};
use std::fs::File;
use std::io::Cursor;
use tempfile::TempDir;

fn handle(bytes: Vec<u8>) -> Box<dyn SourceHandle> {
    Box::new(Cursor::new(bytes))
}

/// Drain the ring, topping it up until end of stream
fn drain(decoder: &mut Decoder) -> Vec<u8> {
    let ring = decoder.ring();
    let mut out = Vec::new();
    loop {
        while let Some(chunk) = ring.next_read() {
            out.extend_from_slice(&chunk.data);
        }
        if decoder.is_eof() && ring.is_empty() {
            break;
        }
        decoder.update().unwrap();
    }
    out
}

/// Test 1: Streaming Round Trip
///
/// **Scenario:** Stream a 1 s mono WAV from disk in 10 ms chunks
/// **Expected:** decoded_read == decoded_size == data chunk length, bytes intact
#[test]
fn test_wave_streaming_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sine.wav");
    generate_sine_wav(&path, TEST_SAMPLE_RATE, 1, 1000).unwrap();
    let expected = sine_pcm_bytes(TEST_SAMPLE_RATE, 1, TEST_SAMPLE_RATE as usize);

    let mut decoder = Decoder::new(FileType::Wave, streaming_config());
    decoder.load(Box::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(decoder.state(), DecoderState::Streaming);
    assert!(decoder.ring().is_full());

    let decoded = drain(&mut decoder);
    let state = decoder.streaming_state();
    assert_eq!(state.decoded_size, expected.len() as u64);
    assert_eq!(state.decoded_read, state.decoded_size);
    assert_eq!(state.bytes_read, state.file_size);
    assert_eq!(decoded, expected);
    assert_eq!(decoder.state(), DecoderState::Eof);
    assert_eq!(state.duration.as_millis(), 1000);
}

/// Test 2: Chunk Sizing
///
/// **Scenario:** Load a streaming WAV with 10 ms chunks
/// **Expected:** Every chunk but the last holds exactly 10 ms of audio
#[test]
fn test_chunks_follow_configured_duration() {
    // 2.5 chunks of audio
    let frames = CHUNK_FRAMES * 5 / 2;
    let mut decoder = Decoder::new(FileType::Wave, streaming_config());
    decoder
        .load(handle(sine_wav_bytes(TEST_SAMPLE_RATE, 1, frames)))
        .unwrap();

    let ring = decoder.ring();
    assert_eq!(ring.size(), 3);
    assert_eq!(ring.next_read().unwrap().frame_count(), CHUNK_FRAMES);
    assert_eq!(ring.next_read().unwrap().duration_ms(), 10);
    assert_eq!(ring.next_read().unwrap().frame_count(), CHUNK_FRAMES / 2);
    assert!(decoder.is_eof());
}

/// Test 3: Replay After Reset
///
/// **Scenario:** Consume part of a stream, reset, refill
/// **Expected:** The first chunk after reset matches the first chunk after load
#[test]
fn test_reset_reproduces_first_chunk() {
    let mut decoder = Decoder::new(FileType::Wave, streaming_config());
    decoder
        .load(handle(sine_wav_bytes(TEST_SAMPLE_RATE, 1, 4000)))
        .unwrap();
    let ring = decoder.ring();
    let first = ring.next_read().unwrap();

    for _ in 0..10 {
        ring.next_read();
        decoder.update().unwrap();
    }
    assert!(decoder.streaming_state().decoded_read > first.len() as u64 * 4);

    decoder.reset().unwrap();
    assert!(ring.is_empty());
    assert_eq!(decoder.streaming_state().decoded_read, 0);
    decoder.update().unwrap();

    assert_eq!(ring.next_read().unwrap(), first);
    assert!(!decoder.is_eof());
}

/// Test 4: Replay After End Of Stream
///
/// **Scenario:** Stream to EOF, then reset
/// **Expected:** EOF flag cleared and the whole stream decodes again
#[test]
fn test_reset_after_eof_decodes_again() {
    let mut decoder = Decoder::new(FileType::Wave, streaming_config());
    decoder
        .load(handle(sine_wav_bytes(TEST_SAMPLE_RATE, 1, 1000)))
        .unwrap();
    let first_pass = drain(&mut decoder);
    assert!(decoder.is_eof());

    decoder.reset().unwrap();
    assert!(!decoder.is_eof());
    decoder.update().unwrap();
    assert_eq!(drain(&mut decoder), first_pass);
}

/// Test 5: Static Sounds
///
/// **Scenario:** Load a WAV below the static threshold
/// **Expected:** One chunk holding the whole file; EOF right after load
#[test]
fn test_small_file_is_static() {
    let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
    decoder
        .load(handle(sine_wav_bytes(TEST_SAMPLE_RATE, 2, 2000)))
        .unwrap();

    assert!(decoder.is_static());
    assert!(decoder.is_eof());
    let ring = decoder.ring();
    assert_eq!(ring.size(), 1);
    let chunk = ring.next_read().unwrap();
    assert_eq!(chunk.channels, 2);
    assert_eq!(chunk.frame_count(), 2000);
    assert_eq!(decoder.update().unwrap(), 0);
}

/// Test 6: 8-bit Stereo
///
/// **Scenario:** Decode an 8-bit stereo WAV written by hound
/// **Expected:** Chunks report 8 bits, 2 channels, unsigned samples intact
#[test]
fn test_eight_bit_stereo() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp8.wav");
    generate_ramp_wav_8bit(&path, 11025, 2, 300).unwrap();

    let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
    decoder.load(Box::new(File::open(&path).unwrap())).unwrap();
    let chunk = decoder.ring().next_read().unwrap();
    assert_eq!(chunk.bits_per_sample, 8);
    assert_eq!(chunk.channels, 2);
    assert_eq!(chunk.sample_rate, 11025);
    assert_eq!(chunk.len(), 600);
    // i8 -128 is stored as unsigned 0
    assert_eq!(chunk.data[0], 0);
    assert_eq!(chunk.data[2], 1);
}

/// Test 7: Unknown Chunks And fmt Extension
///
/// **Scenario:** fmt chunk with an extension, a LIST chunk (odd size) before data
/// **Expected:** Both are skipped by their declared length
#[test]
fn test_extension_and_unknown_chunks_are_skipped() {
    let pcm = sine_pcm_bytes(TEST_SAMPLE_RATE, 1, 100);
    let bytes = riff_file(&[
        (b"fmt ", fmt_body(1, TEST_SAMPLE_RATE, 16, 22)),
        (b"LIST", b"INFOISFT\x05\0\0\0abcde".to_vec()),
        (b"data", pcm.clone()),
    ]);

    let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
    decoder.load(handle(bytes)).unwrap();
    assert_eq!(decoder.ring().next_read().unwrap().data, pcm);
}

/// Test 8: Chunk Order
///
/// **Scenario:** data chunk placed before fmt chunk
/// **Expected:** Format error, decoder unloaded with an empty ring
#[test]
fn test_data_before_fmt_fails() {
    let bytes = riff_file(&[
        (b"data", vec![0u8; 64]),
        (b"fmt ", fmt_body(1, TEST_SAMPLE_RATE, 16, 0)),
    ]);
    let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
    let err = decoder.load(handle(bytes)).unwrap_err();
    assert!(matches!(err, Error::Format(_)), "got {:?}", err);
    assert_eq!(decoder.state(), DecoderState::Unloaded);
    assert!(!decoder.is_loaded());
    assert!(decoder.ring().is_empty());
}

/// Test 9: Missing Chunks
///
/// **Scenario:** RIFF with only a fmt chunk; RIFF with only a data chunk
/// **Expected:** Both fail to load
#[test]
fn test_missing_mandatory_chunks_fail() {
    let no_data = riff_file(&[(b"fmt ", fmt_body(1, TEST_SAMPLE_RATE, 16, 0))]);
    let no_fmt = riff_file(&[(b"data", vec![0u8; 64])]);

    for bytes in [no_data, no_fmt] {
        let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
        assert!(decoder.load(handle(bytes)).is_err());
        assert!(!decoder.is_loaded());
    }
}

/// Test 10: Unsupported Sample Layout
///
/// **Scenario:** 24-bit PCM in an otherwise valid file
/// **Expected:** Load fails
#[test]
fn test_24_bit_rejected() {
    let bytes = riff_file(&[
        (b"fmt ", fmt_body(1, TEST_SAMPLE_RATE, 24, 0)),
        (b"data", vec![0u8; 30]),
    ]);
    let mut decoder = Decoder::new(FileType::Wave, DecoderConfig::default());
    assert!(decoder.load(handle(bytes)).is_err());
}

/// Test 11: Truncated Data Chunk
///
/// **Scenario:** data chunk declares more bytes than the file holds
/// **Expected:** Streams what is present; decoded_size settles on the real length
#[test]
fn test_truncated_data_chunk() {
    let mut bytes = riff_file(&[
        (b"fmt ", fmt_body(1, TEST_SAMPLE_RATE, 16, 0)),
        (b"data", vec![0x22u8; 400]),
    ]);
    // Claim 4000 bytes of data
    let data_size_at = bytes.len() - 400 - 4;
    bytes[data_size_at..data_size_at + 4].copy_from_slice(&4000u32.to_le_bytes());

    let mut decoder = Decoder::new(FileType::Wave, streaming_config());
    decoder.load(handle(bytes)).unwrap();
    let decoded = drain(&mut decoder);
    assert_eq!(decoded.len(), 400);
    assert_eq!(decoder.streaming_state().decoded_size, 400);
    assert_eq!(decoder.streaming_state().decoded_read, 400);
}

/// Test 12: Invalid File Type
///
/// **Scenario:** Decoder constructed for an unsniffable file
/// **Expected:** Format error
#[test]
fn test_invalid_file_type_fails() {
    let mut decoder = Decoder::new(FileType::Invalid, DecoderConfig::default());
    let err = decoder.load(handle(vec![0u8; 128])).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

/// Test 13: Broken Ogg Vorbis
///
/// **Scenario:** A lone identification page with no further headers
/// **Expected:** Load fails, nothing retained
#[cfg(feature = "vorbis")]
#[test]
fn test_vorbis_without_setup_headers_fails() {
    let bytes = ogg_page(&vorbis_identification(2, 44100));
    let mut decoder = Decoder::new(FileType::OggVorbis, DecoderConfig::default());
    assert!(decoder.load(handle(bytes)).is_err());
    assert!(!decoder.is_loaded());
    assert!(decoder.ring().is_empty());
}

/// Test 14: Opus Without The Feature
///
/// **Scenario:** Opus decoding requested in a build without the opus feature
/// **Expected:** Unsupported error
#[cfg(not(feature = "opus"))]
#[test]
fn test_opus_unsupported_without_feature() {
    let bytes = ogg_page(&opus_head(2));
    let mut decoder = Decoder::new(FileType::OggOpus, DecoderConfig::default());
    assert!(matches!(
        decoder.load(handle(bytes)),
        Err(Error::Unsupported(_))
    ));
}

/// Largest absolute 16-bit little-endian sample
#[cfg(feature = "vorbis")]
fn peak(pcm: &[u8]) -> i32 {
    pcm.chunks_exact(2)
        .map(|b| i32::from(i16::from_le_bytes([b[0], b[1]])).abs())
        .max()
        .unwrap_or(0)
}

/// Test 15: Vorbis Streaming
///
/// **Scenario:** Stream a 1 s stereo Vorbis file in 10 ms chunks
/// **Expected:** 16-bit stereo output, decoded_read == decoded_size at the
/// end, about one second of half-scale sine
#[cfg(feature = "vorbis")]
#[test]
fn test_vorbis_streams_to_end() {
    let frames = 44100;
    let mut decoder = Decoder::new(FileType::OggVorbis, streaming_config());
    decoder.load(handle(vorbis_bytes(44100, 2, frames, 1))).unwrap();
    assert_eq!(decoder.state(), DecoderState::Streaming);

    let first = decoder.ring().next_read().unwrap();
    assert_eq!(first.bits_per_sample, 16);
    assert_eq!(first.channels, 2);
    assert_eq!(first.sample_rate, 44100);

    let mut decoded = first.data.clone();
    decoded.extend(drain(&mut decoder));
    let state = decoder.streaming_state();
    assert!(decoder.is_eof());
    assert_eq!(state.decoded_read, state.decoded_size);
    assert_eq!(state.decoded_read, decoded.len() as u64);
    assert_eq!(state.bytes_read, state.file_size);

    // Lossy, and without granule trimming the tail may run one block long
    let decoded_frames = decoded.len() / 4;
    assert!(decoded_frames.abs_diff(frames) < 4096, "{} frames", decoded_frames);
    let peak = peak(&decoded);
    assert!((8000..24000).contains(&peak), "peak {}", peak);
}

/// Test 16: Vorbis Replay
///
/// **Scenario:** Consume part of a Vorbis stream, reset, refill
/// **Expected:** First chunk after reset matches the first chunk after load
#[cfg(feature = "vorbis")]
#[test]
fn test_vorbis_reset_reproduces_first_chunk() {
    let mut decoder = Decoder::new(FileType::OggVorbis, streaming_config());
    decoder.load(handle(vorbis_bytes(44100, 2, 44100, 1))).unwrap();
    let ring = decoder.ring();
    let first = ring.next_read().unwrap();

    for _ in 0..10 {
        ring.next_read();
        decoder.update().unwrap();
    }

    decoder.reset().unwrap();
    assert_eq!(decoder.streaming_state().decoded_read, 0);
    decoder.update().unwrap();
    assert_eq!(ring.next_read().unwrap(), first);
}

/// Test 17: Chained Vorbis
///
/// **Scenario:** Two complete Vorbis files with different serials, back to back
/// **Expected:** Format error once decoding reaches the second link
#[cfg(feature = "vorbis")]
#[test]
fn test_chained_vorbis_fails() {
    let mut bytes = vorbis_bytes(22050, 1, 4410, 1);
    bytes.extend(vorbis_bytes(22050, 1, 4410, 100));

    let mut decoder = Decoder::new(FileType::OggVorbis, streaming_config());
    let result = decoder.load(handle(bytes)).and_then(|()| {
        let ring = decoder.ring();
        for _ in 0..100 {
            while ring.next_read().is_some() {}
            decoder.update()?;
            if decoder.is_eof() {
                break;
            }
        }
        Ok(())
    });
    assert!(matches!(result, Err(Error::Format(_))), "{:?}", result);
}

/// Test 18: Damaged Vorbis Page
///
/// **Scenario:** 200 bytes scrambled in the middle of a 2 s Vorbis file
/// **Expected:** Load succeeds with small and large chunks, the damage is
/// skipped, the stream still reaches its end and replays after reset
#[cfg(feature = "vorbis")]
#[test]
fn test_corrupt_vorbis_page_is_skipped() {
    let mut bytes = vorbis_bytes(44100, 2, 88200, 1);
    let mid = bytes.len() / 2;
    for b in &mut bytes[mid..mid + 200] {
        *b ^= 0xA5;
    }

    // Default chunking decodes past the damage while loading
    let mut whole = Decoder::new(FileType::OggVorbis, DecoderConfig::default());
    whole.load(handle(bytes.clone())).unwrap();
    let whole_pass = drain(&mut whole);

    let mut decoder = Decoder::new(FileType::OggVorbis, streaming_config());
    decoder.load(handle(bytes)).unwrap();
    let first_pass = drain(&mut decoder);
    assert_eq!(first_pass, whole_pass);
    let state = decoder.streaming_state();
    assert!(decoder.is_eof());
    assert!(state.decoded_read > 0);
    assert_eq!(state.decoded_read, state.decoded_size);
    assert_eq!(state.decoded_read, first_pass.len() as u64);
    // Most of the file survives
    assert!(first_pass.len() > 88200 * 4 / 2);

    decoder.reset().unwrap();
    decoder.update().unwrap();
    assert_eq!(drain(&mut decoder), first_pass);
}

/// Test 19: Vorbis Resource
///
/// **Scenario:** Load a Vorbis file through AudioResource
/// **Expected:** Sniffed as Ogg Vorbis and ready to play
#[cfg(feature = "vorbis")]
#[test]
fn test_vorbis_resource_loads() {
    let resource = AudioResource::new("tone.ogg", MediaKind::Music);
    resource
        .load_from_reader(Cursor::new(vorbis_bytes(48000, 1, 9600, 7)), &streaming_config())
        .unwrap();
    assert!(resource.is_ready());
    assert_eq!(resource.file_type(), FileType::OggVorbis);
    assert!(!resource.is_static());
}
