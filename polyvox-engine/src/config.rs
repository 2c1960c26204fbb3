//! Engine configuration derived from the shared TOML file

use polyvox_common::config::TomlConfig;

/// Voice pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Whether to open an output device at all
    pub enabled: bool,
    /// Device to open (None = first enumerated)
    pub device: Option<String>,
    /// Number of voice slots; fixed for the pool's lifetime
    pub voice_count: usize,
    pub effect_volume: f32,
    pub music_volume: f32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            voice_count: 32,
            effect_volume: 1.0,
            music_volume: 1.0,
        }
    }
}

impl From<&TomlConfig> for PoolConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            enabled: config.audio.enabled,
            device: config.audio.device.clone(),
            voice_count: config.audio.voice_count.max(1),
            effect_volume: config.audio.effect_volume,
            music_volume: config.audio.music_volume,
        }
    }
}

/// Decode-ahead configuration shared by every decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Chunks per ring buffer
    pub ring_capacity: usize,
    /// Playback duration one chunk should hold
    pub chunk_duration_ms: u32,
    /// Decoded sizes up to this are loaded as a single static chunk
    pub static_threshold_bytes: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 4,
            chunk_duration_ms: 250,
            static_threshold_bytes: 256 * 1024,
        }
    }
}

impl From<&TomlConfig> for DecoderConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            ring_capacity: config.streaming.ring_capacity.max(1),
            chunk_duration_ms: config.streaming.chunk_duration_ms.max(1),
            static_threshold_bytes: config.streaming.static_threshold_bytes,
        }
    }
}

impl DecoderConfig {
    /// Target chunk size in bytes for the given PCM layout, rounded down to
    /// whole frames and never smaller than one frame.
    pub fn chunk_bytes(&self, sample_rate: u32, channels: u16, bits_per_sample: u16) -> usize {
        let frame = usize::from(channels) * usize::from(bits_per_sample / 8);
        let frame = frame.max(1);
        let frames = (u64::from(sample_rate) * u64::from(self.chunk_duration_ms) / 1000) as usize;
        frames.max(1) * frame
    }
}
