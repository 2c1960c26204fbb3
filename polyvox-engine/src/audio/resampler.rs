//! Sample rate conversion using rubato
//!
//! Static buffers are converted in one shot with [`Resampler::resample`].
//! Streams go through a [`StatefulResampler`] that keeps filter history and
//! unprocessed input between chunks, so consecutive buffers join without a
//! gap and the stream ends with the exact converted length.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::trace;

/// Input frames handed to rubato per call when streaming
pub const STREAM_BLOCK_FRAMES: usize = 64;

/// One-shot rate converter for whole buffers
pub struct Resampler;

impl Resampler {
    /// Resample interleaved f32 audio.
    ///
    /// # Arguments
    /// - `input`: Interleaved samples
    /// - `input_rate`: Rate of `input`
    /// - `output_rate`: Desired rate
    /// - `channels`: Interleaved channel count
    ///
    /// # Returns
    /// Interleaved samples at `output_rate`, `input frames * output_rate /
    /// input_rate` frames long. Identical rates return a copy.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input.to_vec());
        }
        let frames = input.len() / usize::from(channels.max(1));
        let mut resampler =
            StatefulResampler::new(input_rate, output_rate, channels, frames.max(1))?;
        let mut output = resampler.process_chunk(input)?;
        output.extend(resampler.flush()?);
        Ok(output)
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let channels = channels as usize;
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        planar
    }

    fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };
        let frames = first.len();
        let mut interleaved = Vec::with_capacity(frames * planar.len());
        for i in 0..frames {
            for channel in planar {
                interleaved.push(channel.get(i).copied().unwrap_or(0.0));
            }
        }
        interleaved
    }
}

/// Rate converter that carries state from one chunk to the next.
///
/// Input is buffered until a full block is available; the filter delay is
/// trimmed from the start of the output and [`flush`](Self::flush) drains the
/// tail so the total output length matches the input duration.
pub struct StatefulResampler {
    /// None when input and output rates match
    inner: Option<FastFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: u16,
    block_frames: usize,
    /// Planar input not yet handed to rubato
    pending: Vec<Vec<f32>>,
    /// Output frames still to discard for the filter delay
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StatefulResampler {
    /// Create a converter from `input_rate` to `output_rate`.
    ///
    /// `block_frames` is the number of input frames processed per rubato
    /// call; smaller blocks hold back less audio between chunks.
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        block_frames: usize,
    ) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || channels == 0 || block_frames == 0 {
            return Err(Error::Decode(format!(
                "Cannot resample {} Hz -> {} Hz with {} channels in blocks of {}",
                input_rate, output_rate, channels, block_frames
            )));
        }

        let inner = if input_rate == output_rate {
            None
        } else {
            Some(
                FastFixedIn::<f32>::new(
                    output_rate as f64 / input_rate as f64,
                    1.0,
                    PolynomialDegree::Cubic,
                    block_frames,
                    usize::from(channels),
                )
                .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?,
            )
        };
        let delay = inner.as_ref().map_or(0, |r| r.output_delay());

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            block_frames,
            pending: vec![Vec::new(); usize::from(channels)],
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn is_pass_through(&self) -> bool {
        self.inner.is_none()
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Output frames the input seen so far converts to
    fn expected_frames(&self) -> u64 {
        (self.frames_in as f64 * self.output_rate as f64 / self.input_rate as f64).round() as u64
    }

    /// Input has been taken whose output has not been returned yet
    pub fn has_pending(&self) -> bool {
        self.inner.is_some() && self.frames_out < self.expected_frames()
    }

    /// Convert the next chunk of interleaved input.
    ///
    /// Up to one block of input may be held back until the next call or
    /// [`flush`](Self::flush).
    pub fn process_chunk(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.inner.is_none() {
            return Ok(input.to_vec());
        }

        let planar = Resampler::deinterleave(input, self.channels);
        let frames = planar.first().map_or(0, Vec::len);
        for (pending, channel) in self.pending.iter_mut().zip(planar) {
            pending.extend(channel);
        }
        self.frames_in += frames as u64;

        let mut output = vec![Vec::new(); usize::from(self.channels)];
        while self.pending[0].len() >= self.block_frames {
            let Some(inner) = self.inner.as_mut() else {
                break;
            };
            let block: Vec<&[f32]> = self
                .pending
                .iter()
                .map(|c| &c[..self.block_frames])
                .collect();
            let produced = inner.process(&block, None).map_err(resample_error)?;
            for channel in &mut self.pending {
                channel.drain(..self.block_frames);
            }
            self.emit(produced, &mut output);
        }

        trace!(
            "Resampled chunk of {} frames, {} frames held back",
            frames,
            self.pending[0].len()
        );
        Ok(Resampler::interleave(&output))
    }

    /// Drain held-back input and the filter tail.
    ///
    /// Leaves the converter ready for a new stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.inner.is_none() {
            return Ok(Vec::new());
        }

        let expected = self.expected_frames();
        let mut output = vec![Vec::new(); usize::from(self.channels)];

        if !self.pending[0].is_empty() {
            if let Some(inner) = self.inner.as_mut() {
                let partial: Vec<&[f32]> = self.pending.iter().map(Vec::as_slice).collect();
                let produced = inner
                    .process_partial(Some(partial.as_slice()), None)
                    .map_err(resample_error)?;
                self.emit(produced, &mut output);
            }
        }
        while self.frames_out < expected {
            let Some(inner) = self.inner.as_mut() else {
                break;
            };
            let produced = inner
                .process_partial::<&[f32]>(None, None)
                .map_err(resample_error)?;
            if produced.first().map_or(true, Vec::is_empty) {
                break;
            }
            self.emit(produced, &mut output);
        }

        // Zero padding fed above may run past the true end
        let excess = (self.frames_out.saturating_sub(expected)) as usize;
        if excess > 0 {
            for channel in &mut output {
                let keep = channel.len().saturating_sub(excess);
                channel.truncate(keep);
            }
        }

        self.reset();
        Ok(Resampler::interleave(&output))
    }

    /// Forget all history; the next chunk starts a new stream
    pub fn reset(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
            self.delay = inner.output_delay();
        }
        for channel in &mut self.pending {
            channel.clear();
        }
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Append `produced` to `output`, dropping the leading filter delay
    fn emit(&mut self, produced: Vec<Vec<f32>>, output: &mut [Vec<f32>]) {
        let frames = produced.first().map_or(0, Vec::len);
        let skip = self.delay.min(frames);
        self.delay -= skip;
        for (out, channel) in output.iter_mut().zip(produced) {
            out.extend_from_slice(&channel[skip..]);
        }
        self.frames_out += (frames - skip) as u64;
    }
}

fn resample_error(e: rubato::ResampleError) -> Error {
    Error::Decode(format!("Resampling failed: {}", e))
}

impl std::fmt::Debug for StatefulResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulResampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels)
            .field("pending_frames", &self.pending.first().map_or(0, Vec::len))
            .finish()
    }
}
