//! Core audio data types
//!
//! `PcmChunk` is the unit of exchange between decoders and voices: one
//! decoded slice of interleaved little-endian PCM plus its layout.

use serde::Serialize;
use std::fmt;

/// One decoded chunk of interleaved PCM
///
/// **Format:**
/// - 8-bit samples are unsigned, 16-bit samples are signed little-endian
/// - Channels interleaved: [L, R, L, R, ...] for stereo
///
/// Immutable once pushed into a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub data: Vec<u8>,
}

impl PcmChunk {
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16, data: Vec<u8>) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }

    /// Number of whole frames in the payload
    pub fn frame_count(&self) -> usize {
        match self.frame_size() {
            0 => 0,
            size => self.data.len() / size,
        }
    }

    /// Playback duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Hardware format tag for this chunk's layout
    pub fn format(&self) -> Option<PcmFormat> {
        PcmFormat::from_layout(self.channels, self.bits_per_sample)
    }
}

/// Sample layout tag understood by the hardware context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl PcmFormat {
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Option<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Some(PcmFormat::Mono8),
            (1, 16) => Some(PcmFormat::Mono16),
            (2, 8) => Some(PcmFormat::Stereo8),
            (2, 16) => Some(PcmFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Mono16 => 1,
            PcmFormat::Stereo8 | PcmFormat::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Stereo8 => 8,
            PcmFormat::Mono16 | PcmFormat::Stereo16 => 16,
        }
    }
}

/// Container/codec detected by signature sniffing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FileType {
    /// Unknown or not compiled in
    #[default]
    Invalid,
    /// RIFF/WAVE container
    Wave,
    /// Ogg container carrying Vorbis
    OggVorbis,
    /// Ogg container carrying Opus
    OggOpus,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::Invalid => "invalid",
            FileType::Wave => "wave",
            FileType::OggVorbis => "ogg/vorbis",
            FileType::OggOpus => "ogg/opus",
        };
        f.write_str(name)
    }
}
