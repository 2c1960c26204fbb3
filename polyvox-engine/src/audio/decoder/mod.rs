//! Streaming decoders
//!
//! One [`Decoder`] per loaded resource. It validates the container, then
//! decodes ahead into its [`ChunkRingBuffer`] in chunks of a configured
//! playback duration until the ring is full or the source is exhausted.
//!
//! **Lifecycle:** `Unloaded -> Loading -> {Streaming | Static} -> Eof`
//!
//! Small files (decoded size at or below the static threshold) are decoded
//! into a single chunk. Everything else streams: `update()` is called once per
//! engine tick and tops the ring up again.
//!
//! The set of formats is closed: RIFF/WAVE, Ogg Vorbis and (with the `opus`
//! feature) Ogg Opus.

mod ogg;
pub mod opus;
pub mod vorbis;
pub mod wave;

pub use ogg::OggStream;
pub use wave::{WaveHeader, WaveStream};

use crate::audio::ring_buffer::ChunkRingBuffer;
use crate::audio::types::{FileType, PcmChunk};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Largest single read request handed to a format stream
const READ_BLOCK_BYTES: usize = 64 * 1024;

/// Anything a decoder can stream from
pub trait SourceHandle: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> SourceHandle for T {}

/// Byte source that records how far into the file decoding has read
///
/// Implements symphonia's `MediaSource` so the same handle feeds both the
/// hand-written WAV parser and the Ogg demuxer. Clones share the underlying
/// handle and position, which lets a demuxer be rebuilt over the same file.
#[derive(Clone)]
pub struct CountingSource {
    inner: Arc<Mutex<Box<dyn SourceHandle>>>,
    len: u64,
    position: Arc<AtomicU64>,
    seekable: bool,
}

impl CountingSource {
    pub fn new(mut inner: Box<dyn SourceHandle>) -> std::io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            len,
            position: Arc::new(AtomicU64::new(0)),
            seekable: true,
        })
    }

    /// Same handle, reported to symphonia as not seekable
    pub fn unseekable(&self) -> Self {
        Self {
            seekable: false,
            ..self.clone()
        }
    }

    pub fn seekable(&self) -> bool {
        self.seekable
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shared view of the current read position
    pub fn position_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.position)
    }
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.lock().read(buf)?;
        self.position.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl Seek for CountingSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let at = self.inner.lock().seek(pos)?;
        self.position.store(at, Ordering::Relaxed);
        Ok(at)
    }
}

impl symphonia::core::io::MediaSource for CountingSource {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// Decoder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Unloaded,
    Loading,
    /// Decoding incrementally, several chunks in flight
    Streaming,
    /// Entire sound decoded into one chunk
    Static,
    /// Source exhausted; queued chunks may still be draining
    Eof,
}

/// Per-decoder progress counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingState {
    /// Size of the source file
    pub file_size: u64,
    /// Source bytes consumed so far
    pub bytes_read: u64,
    /// Total decodable PCM bytes (from container metadata, finalised at EOF)
    pub decoded_size: u64,
    /// PCM bytes delivered into the ring buffer since load or reset
    pub decoded_read: u64,
    /// Playback duration of `decoded_size`
    pub duration: Duration,
}

/// PCM layout produced by a format stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmLayout {
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels) * u64::from(self.bits_per_sample / 8)
    }

    pub fn duration_of(&self, bytes: u64) -> Duration {
        match self.bytes_per_second() {
            0 => Duration::ZERO,
            bps => Duration::from_secs_f64(bytes as f64 / bps as f64),
        }
    }
}

/// Format-specific PCM producer
enum FormatStream {
    Wave(WaveStream),
    #[cfg(feature = "vorbis")]
    Vorbis(OggStream),
    #[cfg(feature = "opus")]
    Opus(OggStream),
}

impl FormatStream {
    fn open(file_type: FileType, source: CountingSource) -> Result<Self> {
        match file_type {
            FileType::Wave => Ok(FormatStream::Wave(WaveStream::open(source)?)),
            #[cfg(feature = "vorbis")]
            FileType::OggVorbis => Ok(FormatStream::Vorbis(vorbis::open(source)?)),
            #[cfg(feature = "opus")]
            FileType::OggOpus => Ok(FormatStream::Opus(opus::open(source)?)),
            FileType::Invalid => Err(Error::Format("unrecognized file signature".into())),
            #[allow(unreachable_patterns)]
            other => Err(Error::Unsupported(format!("{} support not compiled in", other))),
        }
    }

    fn layout(&self) -> PcmLayout {
        match self {
            FormatStream::Wave(s) => s.layout(),
            #[cfg(feature = "vorbis")]
            FormatStream::Vorbis(s) => s.layout(),
            #[cfg(feature = "opus")]
            FormatStream::Opus(s) => s.layout(),
        }
    }

    fn decoded_size_hint(&self) -> Option<u64> {
        match self {
            FormatStream::Wave(s) => Some(s.data_len()),
            #[cfg(feature = "vorbis")]
            FormatStream::Vorbis(s) => s.decoded_size_hint(),
            #[cfg(feature = "opus")]
            FormatStream::Opus(s) => s.decoded_size_hint(),
        }
    }

    fn read_pcm(&mut self, out: &mut Vec<u8>, max: usize) -> Result<usize> {
        match self {
            FormatStream::Wave(s) => s.read_pcm(out, max),
            #[cfg(feature = "vorbis")]
            FormatStream::Vorbis(s) => s.read_pcm(out, max),
            #[cfg(feature = "opus")]
            FormatStream::Opus(s) => s.read_pcm(out, max),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match self {
            FormatStream::Wave(s) => s.rewind(),
            #[cfg(feature = "vorbis")]
            FormatStream::Vorbis(s) => s.rewind(),
            #[cfg(feature = "opus")]
            FormatStream::Opus(s) => s.rewind(),
        }
    }
}

/// Streaming decoder feeding one ring buffer
pub struct Decoder {
    file_type: FileType,
    config: DecoderConfig,
    ring: Arc<ChunkRingBuffer>,
    stream: Option<FormatStream>,
    bytes_read: Option<Arc<AtomicU64>>,
    streaming: StreamingState,
    state: DecoderState,
    layout: Option<PcmLayout>,
    is_static: bool,
    eof: bool,
    /// Decoded bytes not yet pushed as a chunk
    scratch: Vec<u8>,
    /// Chunk size in bytes; unbounded for static sounds
    target: usize,
}

impl Decoder {
    /// Create an unloaded decoder for a sniffed file type
    pub fn new(file_type: FileType, config: DecoderConfig) -> Self {
        Self {
            file_type,
            config,
            ring: Arc::new(ChunkRingBuffer::new(config.ring_capacity)),
            stream: None,
            bytes_read: None,
            streaming: StreamingState::default(),
            state: DecoderState::Unloaded,
            layout: None,
            is_static: false,
            eof: false,
            scratch: Vec::new(),
            target: 0,
        }
    }

    /// Validate the container and pre-fill the ring buffer.
    ///
    /// # Errors
    /// Format, I/O and decode failures abort the load; the decoder returns to
    /// `Unloaded` with no stream and an empty ring.
    pub fn load(&mut self, handle: Box<dyn SourceHandle>) -> Result<()> {
        self.state = DecoderState::Loading;
        match self.try_load(handle) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.unload();
                Err(e)
            }
        }
    }

    fn try_load(&mut self, handle: Box<dyn SourceHandle>) -> Result<()> {
        let source = CountingSource::new(handle)?;
        let file_size = source.len();
        let position = source.position_handle();

        let stream = FormatStream::open(self.file_type, source)?;
        let layout = stream.layout();
        let hint = stream.decoded_size_hint();

        self.is_static = hint.is_some_and(|size| size <= self.config.static_threshold_bytes);
        self.target = if self.is_static {
            usize::MAX
        } else {
            self.config
                .chunk_bytes(layout.sample_rate, layout.channels, layout.bits_per_sample)
        };

        let decoded_size = hint.unwrap_or(0);
        self.streaming = StreamingState {
            file_size,
            bytes_read: position.load(Ordering::Relaxed),
            decoded_size,
            decoded_read: 0,
            duration: layout.duration_of(decoded_size),
        };
        self.bytes_read = Some(position);
        self.layout = Some(layout);
        self.stream = Some(stream);
        self.eof = false;
        self.scratch.clear();
        self.ring.reset();
        self.state = if self.is_static {
            DecoderState::Static
        } else {
            DecoderState::Streaming
        };

        debug!(
            file_type = %self.file_type,
            static_sound = self.is_static,
            "Decoder loaded: {} Hz, {} ch, {} bit, {} bytes",
            layout.sample_rate,
            layout.channels,
            layout.bits_per_sample,
            decoded_size
        );

        self.fill()?;
        Ok(())
    }

    fn unload(&mut self) {
        self.stream = None;
        self.bytes_read = None;
        self.layout = None;
        self.scratch.clear();
        self.eof = false;
        self.ring.reset();
        self.streaming = StreamingState::default();
        self.state = DecoderState::Unloaded;
    }

    /// Top up the ring buffer; no-op at end of stream.
    ///
    /// # Returns
    /// Number of chunks pushed.
    pub fn update(&mut self) -> Result<usize> {
        if self.eof || self.stream.is_none() {
            return Ok(0);
        }
        self.fill()
    }

    /// Rewind to the start for replay without reopening the file.
    pub fn reset(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        stream.rewind()?;
        self.streaming.decoded_read = 0;
        self.scratch.clear();
        self.eof = false;
        self.ring.reset();
        self.state = if self.is_static {
            DecoderState::Static
        } else {
            DecoderState::Streaming
        };
        trace!(file_type = %self.file_type, "Decoder reset");
        Ok(())
    }

    fn fill(&mut self) -> Result<usize> {
        let Some(layout) = self.layout else {
            return Ok(0);
        };
        let mut pushed = 0;

        loop {
            if self.ring.is_full() {
                break;
            }

            if self.scratch.len() >= self.target {
                let rest = self.scratch.split_off(self.target);
                let data = std::mem::replace(&mut self.scratch, rest);
                if !self.push(layout, data) {
                    break;
                }
                pushed += 1;
                continue;
            }

            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            let want = (self.target - self.scratch.len()).min(READ_BLOCK_BYTES);
            let n = stream.read_pcm(&mut self.scratch, want)?;
            self.sync_bytes_read();

            if n == 0 {
                if !self.scratch.is_empty() {
                    let data = std::mem::take(&mut self.scratch);
                    if !self.push(layout, data) {
                        break;
                    }
                    pushed += 1;
                }
                self.finish();
                break;
            }
        }

        Ok(pushed)
    }

    /// Push one chunk; hands the bytes back to scratch when the ring is full
    fn push(&mut self, layout: PcmLayout, data: Vec<u8>) -> bool {
        let len = data.len() as u64;
        let chunk = PcmChunk::new(
            layout.sample_rate,
            layout.bits_per_sample,
            layout.channels,
            data,
        );
        match self.ring.write(chunk) {
            Ok(()) => {
                self.streaming.decoded_read += len;
                if self.streaming.decoded_read > self.streaming.decoded_size {
                    self.streaming.decoded_size = self.streaming.decoded_read;
                }
                true
            }
            Err(chunk) => {
                let mut data = chunk.data;
                data.append(&mut self.scratch);
                self.scratch = data;
                false
            }
        }
    }

    fn finish(&mut self) {
        self.eof = true;
        self.state = DecoderState::Eof;

        let delivered = self.streaming.decoded_read;
        if delivered != self.streaming.decoded_size {
            if delivered < self.streaming.decoded_size {
                warn!(
                    file_type = %self.file_type,
                    "Stream ended after {} of {} declared bytes",
                    delivered,
                    self.streaming.decoded_size
                );
            }
            self.streaming.decoded_size = delivered;
        }
        if let Some(layout) = self.layout {
            self.streaming.duration = layout.duration_of(self.streaming.decoded_size);
        }
        trace!(file_type = %self.file_type, "Decoder reached end of stream");
    }

    fn sync_bytes_read(&mut self) {
        if let Some(position) = &self.bytes_read {
            self.streaming.bytes_read = position.load(Ordering::Relaxed);
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_loaded(&self) -> bool {
        self.stream.is_some()
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn layout(&self) -> Option<PcmLayout> {
        self.layout
    }

    pub fn streaming_state(&self) -> &StreamingState {
        &self.streaming
    }

    /// Shared handle to this decoder's ring buffer
    pub fn ring(&self) -> Arc<ChunkRingBuffer> {
        Arc::clone(&self.ring)
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("file_type", &self.file_type)
            .field("state", &self.state)
            .field("streaming", &self.streaming)
            .finish()
    }
}
