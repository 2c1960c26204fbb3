//! Ogg container stream shared by the Vorbis and Opus decoders
//!
//! Demuxing and codec work go through symphonia. Output is always 16-bit
//! signed little-endian interleaved PCM, independent of host byte order.
//!
//! Only single-link streams are accepted: more than one logical stream at
//! open time, a packet from a foreign stream, or a mid-stream reset is a
//! format error. Corrupt packets are logged and skipped.
//!
//! A seekable source is indexed by symphonia at open time. If that scan runs
//! into a corrupt page the stream is reopened as unseekable, which reads
//! forward and resyncs past damage; rewinding then rebuilds the reader.

use super::{CountingSource, PcmLayout};
use crate::error::{Error, Result};
use std::io::{Seek, SeekFrom};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, CodecType, Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::OggReader;
use tracing::{debug, warn};

/// Output sample width of every compressed stream
pub const OUTPUT_BITS_PER_SAMPLE: u16 = 16;

/// Decoded Ogg logical stream
pub struct OggStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    layout: PcmLayout,
    n_frames: Option<u64>,
    sample_buf: Option<SampleBuffer<i16>>,
    /// Decoded bytes not yet handed out
    pending: Vec<u8>,
    /// Drained offset into `pending`
    pending_pos: usize,
    finished: bool,
    codec_name: &'static str,
    /// Kept for rebuilding the reader when the source is read unseekable
    source: CountingSource,
    seekable: bool,
}

impl OggStream {
    /// Open the container and create a decoder for its only stream.
    ///
    /// # Arguments
    /// * `registry` - Codec registry that can build `expected`
    /// * `expected` - Codec the sniffed file type promised
    /// * `codec_name` - Used in log and error messages
    pub(crate) fn open(
        source: CountingSource,
        registry: &CodecRegistry,
        expected: CodecType,
        codec_name: &'static str,
    ) -> Result<Self> {
        let (format, source) = match Self::reader(source.clone()) {
            Ok(format) => (format, source),
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(
                    "Corrupt page while indexing {} stream ({}), reading it unseekable",
                    codec_name, reason
                );
                let unseekable = source.unseekable();
                (Self::reader(unseekable.clone())?, unseekable)
            }
            Err(e) => return Err(e.into()),
        };
        let seekable = source.seekable();

        let tracks = format.tracks();
        if tracks.len() != 1 {
            return Err(Error::Format(format!(
                "expected a single logical stream, found {}",
                tracks.len()
            )));
        }
        let track = &tracks[0];
        let params = track.codec_params.clone();
        let track_id = track.id;

        if params.codec != expected {
            return Err(Error::Format(format!("Ogg stream is not {}", codec_name)));
        }

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Format(format!("{} stream has no sample rate", codec_name)))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Format(format!("{} stream has no channel layout", codec_name)))?;
        if !matches!(channels, 1 | 2) {
            return Err(Error::Format(format!(
                "unsupported {} channel count {}",
                codec_name, channels
            )));
        }

        let decoder = registry
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create {} decoder: {}", codec_name, e)))?;

        debug!(
            "Ogg {}: {} Hz, {} ch, {:?} frames",
            codec_name, sample_rate, channels, params.n_frames
        );

        Ok(Self {
            format: Box::new(format),
            decoder,
            track_id,
            layout: PcmLayout {
                sample_rate,
                channels,
                bits_per_sample: OUTPUT_BITS_PER_SAMPLE,
            },
            n_frames: params.n_frames,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
            codec_name,
            source,
            seekable,
        })
    }

    /// Demuxer over `source`, reading from the start of the file
    fn reader(mut source: CountingSource) -> std::result::Result<OggReader, SymphoniaError> {
        source.seek(SeekFrom::Start(0))?;
        let mss = MediaSourceStream::new(Box::new(source), Default::default());
        OggReader::try_new(mss, &FormatOptions::default())
    }

    pub fn layout(&self) -> PcmLayout {
        self.layout
    }

    /// Decoded byte count from the container's frame count, when known
    pub fn decoded_size_hint(&self) -> Option<u64> {
        self.n_frames
            .map(|frames| frames * u64::from(self.layout.channels) * u64::from(OUTPUT_BITS_PER_SAMPLE / 8))
    }

    /// Append up to `max` decoded bytes to `out`.
    ///
    /// # Returns
    /// Bytes appended; 0 once the stream is exhausted.
    pub fn read_pcm(&mut self, out: &mut Vec<u8>, max: usize) -> Result<usize> {
        while self.pending.len() - self.pending_pos < max && !self.finished {
            self.decode_next()?;
        }

        let available = self.pending.len() - self.pending_pos;
        let n = available.min(max);
        out.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;

        if self.pending_pos == self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        Ok(n)
    }

    /// Decode one packet into `pending`, or mark the stream finished
    fn decode_next(&mut self) -> Result<()> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finished = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(Error::Format("chained Ogg streams are not supported".into()));
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!("Hole in {} stream, resyncing: {}", self.codec_name, reason);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != self.track_id {
            return Err(Error::Format(
                "multiplexed or chained Ogg streams are not supported".into(),
            ));
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if spec.channels.count() as u16 != self.layout.channels {
                    return Err(Error::Format(format!(
                        "{} channel layout changed mid-stream",
                        self.codec_name
                    )));
                }
                let capacity = decoded.capacity() as u64;
                let needed = capacity as usize * spec.channels.count();
                if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                    self.sample_buf = Some(SampleBuffer::<i16>::new(capacity, spec));
                }
                let Some(buf) = self.sample_buf.as_mut() else {
                    return Ok(());
                };
                buf.copy_interleaved_ref(decoded);
                self.pending.reserve(buf.samples().len() * 2);
                for sample in buf.samples() {
                    self.pending.extend_from_slice(&sample.to_le_bytes());
                }
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!("Hole in {} stream, skipping packet: {}", self.codec_name, reason);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Seek back to the first sample
    pub fn rewind(&mut self) -> Result<()> {
        if self.seekable {
            self.format.seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )?;
        } else {
            let format = Self::reader(self.source.clone())?;
            self.track_id = format
                .tracks()
                .first()
                .map(|track| track.id)
                .ok_or_else(|| Error::Format(format!("{} stream lost its track", self.codec_name)))?;
            self.format = Box::new(format);
        }
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.finished = false;
        Ok(())
    }
}
