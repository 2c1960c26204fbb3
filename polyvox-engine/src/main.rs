//! Command-line player (polyvox-play)
//!
//! Loads each file through the load queue, starts it on the voice pool and
//! ticks the pool until every sound has drained or Ctrl+C is pressed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use polyvox_common::config::{load_config, LoggingConfig};
use polyvox_common::events::EventBus;
use polyvox_common::MediaKind;
use polyvox_engine::hardware::{AudioHost, CpalHost};
use polyvox_engine::{
    AudioResource, DecoderConfig, Emitter, FileType, LoadQueue, PoolConfig, VoicePool,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TICK: Duration = Duration::from_millis(10);

/// Command-line arguments for polyvox-play
#[derive(Parser, Debug)]
#[command(name = "polyvox-play")]
#[command(about = "Play audio files through the polyvox voice pool")]
#[command(version)]
struct Args {
    /// WAV or Ogg files to play
    files: Vec<PathBuf>,

    /// Output device name (default: first available)
    #[arg(short, long, env = "POLYVOX_DEVICE")]
    device: Option<String>,

    /// Print output device names and exit
    #[arg(long)]
    list_devices: bool,

    /// Voice priority, 0 = most important
    #[arg(short, long, default_value_t = 128)]
    priority: u8,

    /// Effect category volume (0.0-1.0)
    #[arg(long)]
    effect_volume: Option<f32>,

    /// Music category volume (0.0-1.0)
    #[arg(long)]
    music_volume: Option<f32>,

    /// Treat inputs as music rather than effects
    #[arg(long)]
    music: bool,

    /// Configuration file (overrides POLYVOX_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = logging.level.trim();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "polyvox_engine={0},polyvox_common={0},polyvox_play={0}",
            level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match &logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&toml.logging)?;

    let mut pool_config = PoolConfig::from(&toml);
    if args.device.is_some() {
        pool_config.device = args.device.clone();
    }
    if let Some(volume) = args.effect_volume {
        pool_config.effect_volume = volume;
    }
    if let Some(volume) = args.music_volume {
        pool_config.music_volume = volume;
    }

    let host = CpalHost::new();
    if args.list_devices {
        for name in host
            .output_device_names()
            .context("Failed to enumerate output devices")?
        {
            println!("{}", name);
        }
        return Ok(());
    }
    if args.files.is_empty() {
        bail!("No input files given");
    }

    let bus = Arc::new(EventBus::default());
    let mut pool = VoicePool::new(pool_config, Box::new(host)).with_events(Arc::clone(&bus));
    pool.initialize().context("Failed to open audio output")?;
    info!(
        "Playing on {} ({} voices)",
        pool.device_name().unwrap_or("no device"),
        pool.voice_count()
    );

    let kind = if args.music {
        MediaKind::Music
    } else {
        MediaKind::Effect
    };
    let loader = Arc::new(LoadQueue::new(DecoderConfig::from(&toml)).with_events(Arc::clone(&bus)));

    let mut resources = Vec::new();
    for path in &args.files {
        let file_type = pool.get_filetype(path);
        if file_type == FileType::Invalid {
            warn!("Skipping {}: unsupported format", path.display());
            continue;
        }
        debug!("{}: {}", path.display(), file_type);
        let resource = Arc::new(AudioResource::new(path.clone(), kind));
        loader.queue(Arc::clone(&resource));
        resources.push(resource);
    }

    let worker = Arc::clone(&loader);
    let loaded = tokio::task::spawn_blocking(move || worker.sync())
        .await
        .context("Load worker panicked")?;
    if loaded == 0 {
        bail!("No file could be loaded");
    }

    for resource in resources.into_iter().filter(|r| r.is_ready()) {
        let label = resource
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = match pool.create_sound(Arc::clone(&resource)) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}: {}", label, e);
                continue;
            }
        };
        match pool.use_sound(Some(Emitter::labeled(label.clone())), id, args.priority) {
            Ok(slot) => info!("{} started on voice {}", label, slot),
            Err(e) => warn!("{}: {}", label, e),
        }
    }

    let mut interval = tokio::time::interval(TICK);
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                pool.update(now - last);
                last = now;
                if pool.active_voice_count() == 0 {
                    info!("Playback finished after {:.1}s", pool.elapsed().as_secs_f32());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                pool.global_stop();
                break;
            }
        }
    }

    pool.shutdown();
    Ok(())
}
