//! Software playback context
//!
//! Holds every buffer and source behind one lock. Uploaded PCM is converted
//! to f32 at the device rate on upload, so `render` only copies and scales.
//!
//! **Source states:** `Initial -> Playing <-> Paused -> Stopped`
//!
//! Buffers queued on a source play in order. A buffer becomes *processed*
//! once fully played (or when the source is stopped) and may then be
//! unqueued and refilled. A playing source whose queue runs dry stops.

use super::{HwError, HwResult};
use crate::audio::resampler::Resampler;
use crate::audio::types::PcmFormat;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Most buffers a context hands out
pub const MAX_BUFFERS: usize = 4096;
/// Most sources a context hands out
pub const MAX_SOURCES: usize = 256;

/// Handle to an uploaded PCM buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

/// Handle to a playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

/// Transport state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

struct BufferData {
    /// Interleaved at device rate, in the buffer's own channel count
    samples: Vec<f32>,
    channels: u16,
    /// Number of source queues holding this buffer
    queued_on: usize,
}

impl BufferData {
    fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            ch => self.samples.len() / usize::from(ch),
        }
    }
}

struct QueueEntry {
    buffer: BufferId,
    processed: bool,
}

#[derive(Default)]
struct SourceData {
    state: SourceState,
    gain: f32,
    queue: VecDeque<QueueEntry>,
    /// Index of the entry being played
    current: usize,
    /// Frame offset inside the current entry
    cursor: usize,
}

impl SourceData {
    fn processed_count(&self) -> usize {
        self.queue.iter().take_while(|e| e.processed).count()
    }

    fn restart(&mut self) {
        for entry in &mut self.queue {
            entry.processed = false;
        }
        self.current = 0;
        self.cursor = 0;
    }
}

#[derive(Default)]
struct Inner {
    buffers: HashMap<BufferId, BufferData>,
    sources: HashMap<SourceId, SourceData>,
    next_id: u32,
    suspended: bool,
}

impl Inner {
    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn source_mut(&mut self, id: SourceId) -> HwResult<&mut SourceData> {
        self.sources.get_mut(&id).ok_or(HwError::InvalidName)
    }

    fn source(&self, id: SourceId) -> HwResult<&SourceData> {
        self.sources.get(&id).ok_or(HwError::InvalidName)
    }
}

/// Mixing context for one output device
pub struct Context {
    inner: Mutex<Inner>,
    sample_rate: u32,
    channels: u16,
}

impl Context {
    /// Create a context mixing to `channels` interleaved channels at `sample_rate`
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        debug!(
            "Creating playback context: {} Hz, {} channels",
            sample_rate, channels
        );
        Self {
            inner: Mutex::new(Inner::default()),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    // ----- buffers -----

    pub fn gen_buffer(&self) -> HwResult<BufferId> {
        let mut inner = self.inner.lock();
        if inner.buffers.len() >= MAX_BUFFERS {
            return Err(HwError::OutOfMemory);
        }
        let id = BufferId(inner.next_id());
        inner.buffers.insert(
            id,
            BufferData {
                samples: Vec::new(),
                channels: 1,
                queued_on: 0,
            },
        );
        Ok(id)
    }

    /// Delete a buffer; refused while it is queued on any source
    pub fn delete_buffer(&self, id: BufferId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let buffer = inner.buffers.get(&id).ok_or(HwError::InvalidName)?;
        if buffer.queued_on > 0 {
            return Err(HwError::InvalidOperation);
        }
        inner.buffers.remove(&id);
        Ok(())
    }

    /// Upload PCM into a buffer.
    ///
    /// # Arguments
    /// * `format` - Sample layout of `bytes` (8-bit unsigned or 16-bit signed LE)
    /// * `bytes` - Whole frames of interleaved PCM
    /// * `frequency` - Sample rate of `bytes`; converted to the device rate
    pub fn buffer_data(
        &self,
        id: BufferId,
        format: PcmFormat,
        bytes: &[u8],
        frequency: u32,
    ) -> HwResult<()> {
        let channels = format.channels();
        let sample_width = usize::from(format.bits_per_sample() / 8);
        let frame = usize::from(channels) * sample_width;
        if frequency == 0 || bytes.len() % frame != 0 {
            return Err(HwError::InvalidValue);
        }

        {
            let inner = self.inner.lock();
            let buffer = inner.buffers.get(&id).ok_or(HwError::InvalidName)?;
            if buffer.queued_on > 0 {
                return Err(HwError::InvalidOperation);
            }
        }

        // Conversion happens outside the lock; the render callback keeps running
        let samples = pcm_to_f32(format, bytes);
        let samples = Resampler::resample(&samples, frequency, self.sample_rate, channels)
            .map_err(|_| HwError::InvalidValue)?;
        self.store(id, channels, samples)
    }

    /// Upload interleaved f32 samples already at the device rate.
    ///
    /// Used by streams that carry rate conversion state across buffers.
    pub fn buffer_samples(&self, id: BufferId, channels: u16, samples: Vec<f32>) -> HwResult<()> {
        if channels == 0 || samples.len() % usize::from(channels) != 0 {
            return Err(HwError::InvalidValue);
        }
        self.store(id, channels, samples)
    }

    fn store(&self, id: BufferId, channels: u16, samples: Vec<f32>) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let buffer = inner.buffers.get_mut(&id).ok_or(HwError::InvalidName)?;
        if buffer.queued_on > 0 {
            return Err(HwError::InvalidOperation);
        }
        buffer.samples = samples;
        buffer.channels = channels;
        Ok(())
    }

    /// Frames held by a buffer, at the device rate
    pub fn buffer_frames(&self, id: BufferId) -> HwResult<usize> {
        let inner = self.inner.lock();
        inner
            .buffers
            .get(&id)
            .map(BufferData::frames)
            .ok_or(HwError::InvalidName)
    }

    pub fn buffer_count(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    // ----- sources -----

    pub fn gen_source(&self) -> HwResult<SourceId> {
        let mut inner = self.inner.lock();
        if inner.sources.len() >= MAX_SOURCES {
            return Err(HwError::OutOfMemory);
        }
        let id = SourceId(inner.next_id());
        inner.sources.insert(
            id,
            SourceData {
                gain: 1.0,
                ..Default::default()
            },
        );
        Ok(id)
    }

    /// Delete a source, releasing every buffer queued on it
    pub fn delete_source(&self, id: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let source = inner.sources.remove(&id).ok_or(HwError::InvalidName)?;
        for entry in source.queue {
            if let Some(buffer) = inner.buffers.get_mut(&entry.buffer) {
                buffer.queued_on = buffer.queued_on.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Append buffers to a source's queue
    pub fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> HwResult<()> {
        let mut inner = self.inner.lock();
        inner.source(source)?;
        if buffers.iter().any(|id| !inner.buffers.contains_key(id)) {
            return Err(HwError::InvalidName);
        }
        for id in buffers {
            if let Some(buffer) = inner.buffers.get_mut(id) {
                buffer.queued_on += 1;
            }
        }
        let data = inner.source_mut(source)?;
        for id in buffers {
            data.queue.push_back(QueueEntry {
                buffer: *id,
                processed: false,
            });
        }
        Ok(())
    }

    /// Remove `count` processed buffers from the front of the queue.
    ///
    /// # Errors
    /// `InvalidValue` if fewer than `count` buffers are processed.
    pub fn unqueue_buffers(&self, source: SourceId, count: usize) -> HwResult<Vec<BufferId>> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        if count > data.processed_count() {
            return Err(HwError::InvalidValue);
        }

        let removed: Vec<BufferId> = data.queue.drain(..count).map(|e| e.buffer).collect();
        data.current = data.current.saturating_sub(count);

        for id in &removed {
            if let Some(buffer) = inner.buffers.get_mut(id) {
                buffer.queued_on = buffer.queued_on.saturating_sub(1);
            }
        }
        Ok(removed)
    }

    /// Drop the whole queue; only allowed on an initial or stopped source
    pub fn detach_buffers(&self, source: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        if !matches!(data.state, SourceState::Initial | SourceState::Stopped) {
            return Err(HwError::InvalidOperation);
        }
        let removed: Vec<BufferId> = data.queue.drain(..).map(|e| e.buffer).collect();
        data.current = 0;
        data.cursor = 0;
        data.state = SourceState::Initial;

        for id in &removed {
            if let Some(buffer) = inner.buffers.get_mut(id) {
                buffer.queued_on = buffer.queued_on.saturating_sub(1);
            }
        }
        Ok(())
    }

    pub fn buffers_processed(&self, source: SourceId) -> HwResult<usize> {
        Ok(self.inner.lock().source(source)?.processed_count())
    }

    pub fn buffers_queued(&self, source: SourceId) -> HwResult<usize> {
        Ok(self.inner.lock().source(source)?.queue.len())
    }

    /// Start or resume playback
    ///
    /// Starting from `Initial` or `Stopped` replays the whole queue; a source
    /// with nothing queued goes straight to `Stopped`.
    pub fn play(&self, source: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        match data.state {
            SourceState::Playing => {}
            SourceState::Paused => data.state = SourceState::Playing,
            SourceState::Initial | SourceState::Stopped => {
                data.restart();
                data.state = if data.queue.is_empty() {
                    SourceState::Stopped
                } else {
                    SourceState::Playing
                };
            }
        }
        trace!(?source, state = ?data.state, "play");
        Ok(())
    }

    pub fn pause(&self, source: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        if data.state == SourceState::Playing {
            data.state = SourceState::Paused;
        }
        Ok(())
    }

    /// Stop playback; every queued buffer becomes processed
    pub fn stop(&self, source: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        Self::stop_source(data);
        Ok(())
    }

    fn stop_source(data: &mut SourceData) {
        for entry in &mut data.queue {
            entry.processed = true;
        }
        data.current = data.queue.len();
        data.cursor = 0;
        data.state = SourceState::Stopped;
    }

    /// Return to `Initial` with the queue unplayed
    pub fn rewind(&self, source: SourceId) -> HwResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.source_mut(source)?;
        data.restart();
        data.state = SourceState::Initial;
        Ok(())
    }

    /// Set linear gain; values outside [0, 1] are rejected
    pub fn set_gain(&self, source: SourceId, gain: f32) -> HwResult<()> {
        if !gain.is_finite() || !(0.0..=1.0).contains(&gain) {
            return Err(HwError::InvalidValue);
        }
        let mut inner = self.inner.lock();
        inner.source_mut(source)?.gain = gain;
        Ok(())
    }

    pub fn gain(&self, source: SourceId) -> HwResult<f32> {
        Ok(self.inner.lock().source(source)?.gain)
    }

    pub fn source_state(&self, source: SourceId) -> HwResult<SourceState> {
        Ok(self.inner.lock().source(source)?.state)
    }

    pub fn source_count(&self) -> usize {
        self.inner.lock().sources.len()
    }

    // ----- context -----

    /// Freeze all output; sources keep their state
    pub fn suspend(&self) {
        self.inner.lock().suspended = true;
    }

    /// Resume output after `suspend`
    pub fn process(&self) {
        self.inner.lock().suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().suspended
    }

    /// Stop every source
    pub fn stop_all(&self) {
        let mut inner = self.inner.lock();
        for data in inner.sources.values_mut() {
            Self::stop_source(data);
        }
    }

    /// Mix all playing sources into `out` (interleaved, device channel count).
    ///
    /// A suspended context writes silence and does not advance.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let mut inner = self.inner.lock();
        if inner.suspended {
            return;
        }

        let out_channels = usize::from(self.channels);
        let total_frames = out.len() / out_channels;
        let Inner {
            buffers, sources, ..
        } = &mut *inner;

        for data in sources.values_mut() {
            if data.state != SourceState::Playing {
                continue;
            }

            let mut frame = 0;
            while frame < total_frames {
                let Some(entry) = data.queue.get_mut(data.current) else {
                    data.state = SourceState::Stopped;
                    break;
                };
                let Some(buffer) = buffers.get(&entry.buffer) else {
                    entry.processed = true;
                    data.current += 1;
                    data.cursor = 0;
                    continue;
                };

                let available = buffer.frames().saturating_sub(data.cursor);
                if available == 0 {
                    entry.processed = true;
                    data.current += 1;
                    data.cursor = 0;
                    continue;
                }

                let n = available.min(total_frames - frame);
                mix_into(
                    &mut out[frame * out_channels..(frame + n) * out_channels],
                    out_channels,
                    &buffer.samples,
                    usize::from(buffer.channels),
                    data.cursor,
                    n,
                    data.gain,
                );
                frame += n;
                data.cursor += n;
            }

            // A buffer that finished exactly at the end of this block
            if let Some(entry) = data.queue.get_mut(data.current) {
                let done = buffers
                    .get(&entry.buffer)
                    .map_or(true, |b| data.cursor >= b.frames());
                if done {
                    entry.processed = true;
                    data.current += 1;
                    data.cursor = 0;
                }
            }
            if data.state == SourceState::Playing && data.current >= data.queue.len() {
                data.state = SourceState::Stopped;
            }
        }
    }
}

/// Add `frames` frames from `src` (starting at `offset`) into `out`
fn mix_into(
    out: &mut [f32],
    out_channels: usize,
    src: &[f32],
    src_channels: usize,
    offset: usize,
    frames: usize,
    gain: f32,
) {
    let src = &src[offset * src_channels..(offset + frames) * src_channels];
    for (dst, frame) in out
        .chunks_exact_mut(out_channels)
        .zip(src.chunks_exact(src_channels))
    {
        match (src_channels, out_channels) {
            (1, _) => {
                for d in dst.iter_mut() {
                    *d += frame[0] * gain;
                }
            }
            (_, 1) => {
                let mono: f32 = frame.iter().sum::<f32>() / src_channels as f32;
                dst[0] += mono * gain;
            }
            _ => {
                for (d, s) in dst.iter_mut().zip(frame.iter()) {
                    *d += s * gain;
                }
            }
        }
    }
}

/// 8-bit unsigned or 16-bit signed little-endian PCM to f32 in [-1, 1]
pub(crate) fn pcm_to_f32(format: PcmFormat, bytes: &[u8]) -> Vec<f32> {
    match format.bits_per_sample() {
        8 => bytes.iter().map(|&b| (f32::from(b) - 128.0) / 128.0).collect(),
        _ => bytes
            .chunks_exact(2)
            .map(|s| f32::from(i16::from_le_bytes([s[0], s[1]])) / 32768.0)
            .collect(),
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}
