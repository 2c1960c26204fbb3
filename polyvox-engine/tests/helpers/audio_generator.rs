//! Audio test file generation
//!
//! Deterministic WAV files written with `hound`, plus hand-assembled RIFF
//! and Ogg byte streams for container edge cases that `hound` cannot produce.
//! Real Ogg Vorbis files come from `vorbis_rs`.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::num::{NonZeroU32, NonZeroU8};
use std::path::Path;
use vorbis_rs::VorbisEncoderBuilder;

/// Sample rate used by most tests; keeps chunk arithmetic simple
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Frames of a sine wave at `frequency_hz`, interleaved over `channels`
fn sine_samples(sample_rate: u32, channels: u16, frames: usize, frequency_hz: f32) -> Vec<i16> {
    let mut samples = Vec::with_capacity(frames * usize::from(channels));
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let value = ((2.0 * PI * frequency_hz * t).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

/// Generate a 16-bit sine WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `sample_rate` - Frames per second
/// * `channels` - 1 or 2
/// * `duration_ms` - Length of the file
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = (u64::from(sample_rate) * duration_ms / 1000) as usize;

    let mut writer = WavWriter::create(path, spec)?;
    for sample in sine_samples(sample_rate, channels, frames, 440.0) {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Generate an 8-bit WAV file of a rising ramp
pub fn generate_ramp_wav_8bit<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 8,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for n in 0..frames {
        let value = ((n % 256) as i16 - 128) as i8;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()
}

/// In-memory 16-bit sine WAV
pub fn sine_wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for sample in sine_samples(sample_rate, channels, frames, 440.0) {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Raw little-endian PCM payload of [`sine_wav_bytes`]
pub fn sine_pcm_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    sine_samples(sample_rate, channels, frames, 440.0)
        .into_iter()
        .flat_map(i16::to_le_bytes)
        .collect()
}

/// A `fmt ` chunk body for integer PCM, with `extra` zero bytes of extension
pub fn fmt_body(channels: u16, sample_rate: u32, bits_per_sample: u16, extra: usize) -> Vec<u8> {
    let block_align = channels * bits_per_sample / 8;
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&channels.to_le_bytes());
    body.extend_from_slice(&sample_rate.to_le_bytes());
    body.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    body.extend_from_slice(&block_align.to_le_bytes());
    body.extend_from_slice(&bits_per_sample.to_le_bytes());
    if extra > 0 {
        body.extend_from_slice(&((extra - 2) as u16).to_le_bytes());
        body.resize(body.len() + extra - 2, 0);
    }
    body
}

/// Assemble a RIFF/WAVE file from `(id, body)` chunks in the given order
pub fn riff_file(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut payload = b"WAVE".to_vec();
    for (id, body) in chunks {
        payload.extend_from_slice(*id);
        payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
        payload.extend_from_slice(body);
        if body.len() % 2 == 1 {
            payload.push(0);
        }
    }
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// A single beginning-of-stream Ogg page carrying `packet`.
///
/// The CRC field is left zero.
pub fn ogg_page(packet: &[u8]) -> Vec<u8> {
    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(0x02);
    page.extend_from_slice(&0u64.to_le_bytes());
    page.extend_from_slice(&0x5eed_u32.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes());

    let mut lacing = vec![255u8; packet.len() / 255];
    lacing.push((packet.len() % 255) as u8);
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    page.extend_from_slice(packet);
    page
}

/// Vorbis identification header packet
pub fn vorbis_identification(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut packet = vec![0x01];
    packet.extend_from_slice(b"vorbis");
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&sample_rate.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.extend_from_slice(&128_000i32.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.push(0xB8);
    packet.push(0x01);
    packet
}

/// OpusHead packet
pub fn opus_head(channels: u8) -> Vec<u8> {
    let mut packet = b"OpusHead".to_vec();
    packet.push(1);
    packet.push(channels);
    packet.extend_from_slice(&312u16.to_le_bytes());
    packet.extend_from_slice(&48_000u32.to_le_bytes());
    packet.extend_from_slice(&0i16.to_le_bytes());
    packet.push(0);
    packet
}

/// In-memory Ogg Vorbis sine (440 Hz, half scale) encoded by libvorbis
///
/// `serial` names the logical stream, so two calls with different serials
/// can be concatenated into a chained file.
pub fn vorbis_bytes(sample_rate: u32, channels: u8, frames: usize, serial: i32) -> Vec<u8> {
    let mut encoder = VorbisEncoderBuilder::new_with_serial(
        NonZeroU32::new(sample_rate).unwrap(),
        NonZeroU8::new(channels).unwrap(),
        Vec::new(),
        serial,
    )
    .build()
    .unwrap();

    let mut start = 0;
    while start < frames {
        let len = (frames - start).min(1024);
        let block: Vec<f32> = (start..start + len)
            .map(|n| (2.0 * PI * 440.0 * n as f32 / sample_rate as f32).sin() * 0.5)
            .collect();
        let planar = vec![block; usize::from(channels)];
        encoder.encode_audio_block(&planar).unwrap();
        start += len;
    }
    encoder.finish().unwrap()
}
