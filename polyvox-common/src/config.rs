//! Configuration loading and config file resolution
//!
//! Configuration is read once at startup. The engine never writes it back;
//! `write_toml_config` exists for the preferences layer that owns the file.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `POLYVOX_CONFIG` environment variable
//! 3. `<user config dir>/polyvox/config.toml`
//!
//! A missing file is not an error: defaults are used and a warning is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "POLYVOX_CONFIG";

/// Smallest accepted chunk duration
pub const MIN_CHUNK_DURATION_MS: u32 = 10;

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub audio: AudioConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
}

/// `[audio]` section: device and volume settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Whether audio output is enabled at all
    pub enabled: bool,
    /// Output device name (None = first enumerated device)
    pub device: Option<String>,
    /// Effect category volume (0.0-1.0)
    pub effect_volume: f32,
    /// Music category volume (0.0-1.0)
    pub music_volume: f32,
    /// Number of simultaneously playable voices
    pub voice_count: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            effect_volume: 1.0,
            music_volume: 1.0,
            voice_count: 32,
        }
    }
}

/// `[streaming]` section: decode-ahead buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Chunks held by each decoder's ring buffer
    pub ring_capacity: usize,
    /// Playback duration of one decoded chunk
    pub chunk_duration_ms: u32,
    /// Decoded sizes up to this many bytes are loaded in one piece
    pub static_threshold_bytes: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 4,
            chunk_duration_ms: 250,
            static_threshold_bytes: 256 * 1024,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,
    /// Optional log file path
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and normalise out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.normalize();
        Ok(config)
    }

    /// Clamp values into their valid ranges.
    ///
    /// Volumes are clamped to [0, 1]; counts and durations get a floor so the
    /// engine never builds an empty voice pool or zero-sized ring buffer.
    pub fn normalize(&mut self) {
        if !(0.0..=1.0).contains(&self.audio.effect_volume) {
            warn!("effect_volume {} out of range, clamping", self.audio.effect_volume);
            self.audio.effect_volume = clamp_volume(self.audio.effect_volume);
        }
        if !(0.0..=1.0).contains(&self.audio.music_volume) {
            warn!("music_volume {} out of range, clamping", self.audio.music_volume);
            self.audio.music_volume = clamp_volume(self.audio.music_volume);
        }
        if self.audio.voice_count == 0 {
            warn!("voice_count must be at least 1");
            self.audio.voice_count = 1;
        }
        if self.streaming.ring_capacity == 0 {
            warn!("ring_capacity must be at least 1");
            self.streaming.ring_capacity = 1;
        }
        if self.streaming.chunk_duration_ms < MIN_CHUNK_DURATION_MS {
            warn!(
                "chunk_duration_ms {} below minimum, using {}",
                self.streaming.chunk_duration_ms, MIN_CHUNK_DURATION_MS
            );
            self.streaming.chunk_duration_ms = MIN_CHUNK_DURATION_MS;
        }
        if self.audio.device.as_deref().is_some_and(|d| d.trim().is_empty()) {
            self.audio.device = None;
        }
    }
}

fn clamp_volume(value: f32) -> f32 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Resolve which config file to read.
///
/// Returns `None` when no candidate exists; callers then run on defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    let user_config = default_config_path()?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("polyvox").join("config.toml"))
}

/// Load configuration, falling back to defaults when the file is missing.
///
/// # Errors
/// Only a file that exists but cannot be parsed is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using defaults");
        return Ok(TomlConfig::default());
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            debug!("Loading config from {}", path.display());
            TomlConfig::from_toml_str(&content)
        }
        Err(e) => {
            warn!(
                "Could not read config file {}: {}; using defaults",
                path.display(),
                e
            );
            Ok(TomlConfig::default())
        }
    }
}

/// Write configuration atomically (temp file + rename).
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp = target.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, target)?;
    Ok(())
}
