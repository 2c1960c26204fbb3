//! Voices
//!
//! A voice is one hardware source plus the buffers it created. Every hardware
//! call goes through [`Voice::check`]: failures are logged and the operation
//! degrades to a no-op instead of propagating.
//!
//! Streaming voices whose chunks arrive at a rate other than the device rate
//! keep one [`StatefulResampler`] for the whole stream, so buffer boundaries
//! stay continuous. Static buffers are converted by the context on upload.

use crate::audio::resampler::{StatefulResampler, STREAM_BLOCK_FRAMES};
use crate::audio::{ChunkRingBuffer, PcmChunk, PcmFormat};
use crate::hardware::context::pcm_to_f32;
use crate::hardware::{BufferId, Context, HwResult, SourceId, SourceState};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub struct Voice {
    context: Arc<Context>,
    source: Option<SourceId>,
    /// Every buffer this voice generated
    buffers: Vec<BufferId>,
    /// Generated buffers not currently queued on the source
    idle: Vec<BufferId>,
    streaming: bool,
    /// Rate conversion carried across the buffers of one stream
    resampler: Option<StatefulResampler>,
}

impl Voice {
    /// Allocate a source on `context`.
    ///
    /// A failed allocation yields a voice whose calls are all no-ops.
    pub fn new(context: Arc<Context>) -> Self {
        let source = Self::check("gen_source", context.gen_source());
        Self {
            context,
            source,
            buffers: Vec::new(),
            idle: Vec::new(),
            streaming: false,
            resampler: None,
        }
    }

    fn check<T>(op: &str, result: HwResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Hardware call {} failed: {}", op, e);
                None
            }
        }
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn has_buffers(&self) -> bool {
        !self.buffers.is_empty()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Single buffer for a static sound
    pub fn create_buffer(&mut self) -> Option<BufferId> {
        let id = Self::check("gen_buffer", self.context.gen_buffer())?;
        self.buffers.push(id);
        self.idle.push(id);
        self.streaming = false;
        Some(id)
    }

    /// One buffer per chunk currently held by `ring`.
    ///
    /// # Returns
    /// Number of buffers created.
    pub fn create_buffers(&mut self, ring: &ChunkRingBuffer) -> usize {
        let wanted = ring.size();
        let mut created = 0;
        for _ in 0..wanted {
            let Some(id) = Self::check("gen_buffer", self.context.gen_buffer()) else {
                break;
            };
            self.buffers.push(id);
            self.idle.push(id);
            created += 1;
        }
        self.streaming = true;
        created
    }

    /// Oldest buffer waiting to be filled
    pub fn next_idle_buffer(&self) -> Option<BufferId> {
        self.idle.first().copied()
    }

    /// Upload `chunk` into `buffer` and append it to the source queue.
    ///
    /// Trailing bytes that do not form a whole frame are dropped.
    pub fn queue_buffer(&mut self, buffer: BufferId, chunk: &PcmChunk) -> bool {
        self.upload(buffer, chunk, false)
    }

    /// Queue the final chunk of a stream, draining any held-back converted audio
    pub fn queue_last_buffer(&mut self, buffer: BufferId, chunk: &PcmChunk) -> bool {
        self.upload(buffer, chunk, true)
    }

    /// Queue converted audio still held back after the last chunk.
    ///
    /// # Returns
    /// `true` if a buffer was queued; `false` when nothing was pending or no
    /// buffer is free yet.
    pub fn flush_stream(&mut self) -> bool {
        if !self.resampler.as_ref().is_some_and(StatefulResampler::has_pending) {
            return false;
        }
        let Some(source) = self.source else {
            return false;
        };
        let Some(buffer) = self.next_idle_buffer().or_else(|| self.pop_buffer()) else {
            return false;
        };
        let Some(resampler) = self.resampler.as_mut() else {
            return false;
        };
        let channels = resampler.channels();
        let samples = match resampler.flush() {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Stream flush failed: {}", e);
                return false;
            }
        };
        self.store(source, buffer, channels, samples)
    }

    fn upload(&mut self, buffer: BufferId, chunk: &PcmChunk, last: bool) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let Some(format) = chunk.format() else {
            warn!(
                "Unsupported chunk layout: {} ch, {} bit",
                chunk.channels, chunk.bits_per_sample
            );
            return false;
        };

        let whole = chunk.frame_count() * chunk.frame_size();
        let bytes = &chunk.data[..whole];
        if self.streaming && chunk.sample_rate != self.context.sample_rate() {
            let Some(samples) = self.convert(format, bytes, chunk.sample_rate, last) else {
                return false;
            };
            return self.store(source, buffer, format.channels(), samples);
        }

        let uploaded = Self::check(
            "buffer_data",
            self.context.buffer_data(buffer, format, bytes, chunk.sample_rate),
        );
        if uploaded.is_none() {
            return false;
        }
        self.enqueue(source, buffer, whole)
    }

    /// Run stream audio through the voice's resampler, creating it on first use
    fn convert(
        &mut self,
        format: PcmFormat,
        bytes: &[u8],
        rate: u32,
        last: bool,
    ) -> Option<Vec<f32>> {
        let channels = format.channels();
        let reusable = self
            .resampler
            .as_ref()
            .is_some_and(|r| r.input_rate() == rate && r.channels() == channels);
        if !reusable {
            let created = StatefulResampler::new(
                rate,
                self.context.sample_rate(),
                channels,
                STREAM_BLOCK_FRAMES,
            );
            match created {
                Ok(resampler) => self.resampler = Some(resampler),
                Err(e) => {
                    warn!("Cannot convert {} Hz stream: {}", rate, e);
                    return None;
                }
            }
        }
        let resampler = self.resampler.as_mut()?;

        let converted = resampler.process_chunk(&pcm_to_f32(format, bytes));
        let flushed = match converted {
            Ok(mut samples) if last => resampler.flush().map(|tail| {
                samples.extend(tail);
                samples
            }),
            other => other,
        };
        match flushed {
            Ok(samples) => Some(samples),
            Err(e) => {
                warn!("Stream conversion failed: {}", e);
                None
            }
        }
    }

    fn store(
        &mut self,
        source: SourceId,
        buffer: BufferId,
        channels: u16,
        samples: Vec<f32>,
    ) -> bool {
        let len = samples.len();
        let uploaded = Self::check(
            "buffer_samples",
            self.context.buffer_samples(buffer, channels, samples),
        );
        if uploaded.is_none() {
            return false;
        }
        self.enqueue(source, buffer, len)
    }

    fn enqueue(&mut self, source: SourceId, buffer: BufferId, size: usize) -> bool {
        if Self::check("queue_buffers", self.context.queue_buffers(source, &[buffer])).is_none() {
            return false;
        }
        self.idle.retain(|id| *id != buffer);
        trace!(?buffer, size, "Queued buffer");
        true
    }

    /// Dequeue the oldest fully played buffer
    pub fn pop_buffer(&mut self) -> Option<BufferId> {
        let source = self.source?;
        if self.processed_buffers() == 0 {
            return None;
        }
        let id = Self::check("unqueue_buffers", self.context.unqueue_buffers(source, 1))?
            .into_iter()
            .next()?;
        self.idle.push(id);
        Some(id)
    }

    pub fn processed_buffers(&self) -> usize {
        self.source
            .and_then(|s| Self::check("buffers_processed", self.context.buffers_processed(s)))
            .unwrap_or(0)
    }

    pub fn queued_buffers(&self) -> usize {
        self.source
            .and_then(|s| Self::check("buffers_queued", self.context.buffers_queued(s)))
            .unwrap_or(0)
    }

    pub fn play(&self) {
        if let Some(source) = self.source {
            Self::check("play", self.context.play(source));
        }
    }

    pub fn pause(&self) {
        if let Some(source) = self.source {
            Self::check("pause", self.context.pause(source));
        }
    }

    /// Resume from pause
    pub fn resume(&self) {
        if self.state() == SourceState::Paused {
            self.play();
        }
    }

    /// Stop; with `rewind` the source returns to its initial state
    pub fn stop(&self, rewind: bool) {
        let Some(source) = self.source else {
            return;
        };
        Self::check("stop", self.context.stop(source));
        if rewind {
            Self::check("rewind", self.context.rewind(source));
        }
    }

    pub fn set_gain(&self, gain: f32) {
        if let Some(source) = self.source {
            Self::check("set_gain", self.context.set_gain(source, gain));
        }
    }

    pub fn gain(&self) -> f32 {
        self.source
            .and_then(|s| Self::check("gain", self.context.gain(s)))
            .unwrap_or(0.0)
    }

    pub fn state(&self) -> SourceState {
        self.source
            .and_then(|s| Self::check("source_state", self.context.source_state(s)))
            .unwrap_or_default()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == SourceState::Stopped
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SourceState::Playing
    }

    fn accepts_queue_changes(&self, op: &str) -> bool {
        if self.streaming && self.is_stopped() {
            return true;
        }
        debug!(
            streaming = self.streaming,
            state = ?self.state(),
            "Ignoring {} on a voice that is not a stopped stream",
            op
        );
        false
    }

    /// Unqueue every processed buffer so all buffers are idle again
    pub fn remove_all_queued_buffers(&mut self) {
        if !self.accepts_queue_changes("remove_all_queued_buffers") {
            return;
        }
        self.resampler = None;
        let Some(source) = self.source else {
            return;
        };
        let processed = self.processed_buffers();
        if processed == 0 {
            return;
        }
        if let Some(ids) =
            Self::check("unqueue_buffers", self.context.unqueue_buffers(source, processed))
        {
            self.idle.extend(ids);
        }
    }

    /// Detach the whole queue from the source, returning it to initial
    pub fn reset_buffer(&mut self) {
        if !self.accepts_queue_changes("reset_buffer") {
            return;
        }
        self.resampler = None;
        let Some(source) = self.source else {
            return;
        };
        if Self::check("detach_buffers", self.context.detach_buffers(source)).is_some() {
            self.idle = self.buffers.clone();
        }
    }

    /// Stop and delete every buffer this voice created.
    ///
    /// The source itself survives and can take new buffers.
    pub fn release_buffers(&mut self) {
        if let Some(source) = self.source {
            Self::check("stop", self.context.stop(source));
            Self::check("detach_buffers", self.context.detach_buffers(source));
        }
        for id in self.buffers.drain(..) {
            Self::check("delete_buffer", self.context.delete_buffer(id));
        }
        self.idle.clear();
        self.streaming = false;
        self.resampler = None;
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.release_buffers();
        if let Some(source) = self.source.take() {
            Self::check("delete_source", self.context.delete_source(source));
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("source", &self.source)
            .field("buffers", &self.buffers.len())
            .field("idle", &self.idle.len())
            .field("streaming", &self.streaming)
            .finish()
    }
}
