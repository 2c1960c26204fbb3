//! RIFF/WAVE stream
//!
//! Manual chunk walk: `fmt ` must precede `data`, unknown chunks are skipped
//! by their declared length (plus pad byte), and a `fmt ` chunk larger than
//! the 16-byte minimum carries an extension that is skipped. PCM is streamed
//! straight from the data chunk without conversion.
//!
//! Supported: integer PCM (format tag 1, or EXTENSIBLE with a PCM subformat),
//! 8 or 16 bits, mono or stereo.

use super::{CountingSource, PcmLayout};
use crate::error::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
const FMT_MIN_SIZE: u32 = 16;
/// fmt size that includes cbSize, validBits, channelMask and SubFormat GUID
const FMT_EXTENSIBLE_SIZE: u32 = 40;

/// Fields of the `fmt ` chunk that decoding depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveHeader {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

/// PCM reader positioned inside a WAV data chunk
pub struct WaveStream {
    source: CountingSource,
    header: WaveHeader,
    data_offset: u64,
    data_len: u64,
    /// Bytes of the data chunk consumed
    position: u64,
}

fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_tag<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn truncated(what: &str) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Format(format!("truncated {}", what))
        } else {
            Error::Io(e)
        }
    }
}

impl WaveStream {
    /// Parse the header and position the stream at the first PCM byte.
    pub fn open(mut source: CountingSource) -> Result<Self> {
        let file_len = source.len();
        source.seek(SeekFrom::Start(0))?;

        let riff = read_tag(&mut source).map_err(truncated("RIFF header"))?;
        let _riff_size = read_u32_le(&mut source).map_err(truncated("RIFF header"))?;
        let wave = read_tag(&mut source).map_err(truncated("RIFF header"))?;
        if &riff != b"RIFF" || &wave != b"WAVE" {
            return Err(Error::Format("missing RIFF/WAVE signature".into()));
        }

        let mut header: Option<WaveHeader> = None;
        let (data_offset, declared_len) = loop {
            let tag = match read_tag(&mut source) {
                Ok(tag) => tag,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    let missing = if header.is_none() { "fmt" } else { "data" };
                    return Err(Error::Format(format!("missing {} chunk", missing)));
                }
                Err(e) => return Err(e.into()),
            };
            let size = read_u32_le(&mut source).map_err(truncated("chunk header"))?;

            match &tag {
                b"fmt " => {
                    header = Some(Self::parse_fmt(&mut source, size)?);
                    if size % 2 == 1 {
                        source.seek(SeekFrom::Current(1))?;
                    }
                }
                b"data" => {
                    if header.is_none() {
                        return Err(Error::Format("data chunk precedes fmt chunk".into()));
                    }
                    let offset = source.stream_position()?;
                    break (offset, u64::from(size));
                }
                other => {
                    trace!(
                        "Skipping WAV chunk '{}' ({} bytes)",
                        String::from_utf8_lossy(other),
                        size
                    );
                    let skip = i64::from(size) + i64::from(size & 1);
                    source.seek(SeekFrom::Current(skip))?;
                }
            }
        };

        let Some(header) = header else {
            return Err(Error::Format("missing fmt chunk".into()));
        };

        let available = file_len.saturating_sub(data_offset);
        let data_len = if declared_len > available {
            warn!(
                "WAV data chunk declares {} bytes but only {} remain",
                declared_len, available
            );
            available
        } else {
            declared_len
        };

        debug!(
            "WAV: {} Hz, {} ch, {} bit, {} data bytes at offset {}",
            header.sample_rate, header.channels, header.bits_per_sample, data_len, data_offset
        );

        Ok(Self {
            source,
            header,
            data_offset,
            data_len,
            position: 0,
        })
    }

    fn parse_fmt(source: &mut CountingSource, size: u32) -> Result<WaveHeader> {
        if size < FMT_MIN_SIZE {
            return Err(Error::Format(format!("fmt chunk too small ({} bytes)", size)));
        }

        let mut format_tag = read_u16_le(source).map_err(truncated("fmt chunk"))?;
        let channels = read_u16_le(source).map_err(truncated("fmt chunk"))?;
        let sample_rate = read_u32_le(source).map_err(truncated("fmt chunk"))?;
        let _byte_rate = read_u32_le(source).map_err(truncated("fmt chunk"))?;
        let block_align = read_u16_le(source).map_err(truncated("fmt chunk"))?;
        let bits_per_sample = read_u16_le(source).map_err(truncated("fmt chunk"))?;

        let mut extension = u64::from(size - FMT_MIN_SIZE);
        if format_tag == WAVE_FORMAT_EXTENSIBLE && size >= FMT_EXTENSIBLE_SIZE {
            let _cb_size = read_u16_le(source).map_err(truncated("fmt extension"))?;
            let _valid_bits = read_u16_le(source).map_err(truncated("fmt extension"))?;
            let _channel_mask = read_u32_le(source).map_err(truncated("fmt extension"))?;
            // First two bytes of the SubFormat GUID carry the real format tag
            format_tag = read_u16_le(source).map_err(truncated("fmt extension"))?;
            extension -= 10;
        }
        if extension > 0 {
            source.seek(SeekFrom::Current(extension as i64))?;
        }

        let header = WaveHeader {
            format_tag,
            channels,
            sample_rate,
            block_align,
            bits_per_sample,
        };
        Self::validate(&header)?;
        Ok(header)
    }

    fn validate(header: &WaveHeader) -> Result<()> {
        if header.format_tag != WAVE_FORMAT_PCM {
            return Err(Error::Format(format!(
                "unsupported WAV format tag {:#06x}",
                header.format_tag
            )));
        }
        if !matches!(header.bits_per_sample, 8 | 16) {
            return Err(Error::Format(format!(
                "unsupported WAV sample width {} bits",
                header.bits_per_sample
            )));
        }
        if !matches!(header.channels, 1 | 2) {
            return Err(Error::Format(format!(
                "unsupported WAV channel count {}",
                header.channels
            )));
        }
        if header.sample_rate == 0 {
            return Err(Error::Format("WAV sample rate is zero".into()));
        }
        Ok(())
    }

    pub fn header(&self) -> &WaveHeader {
        &self.header
    }

    pub fn layout(&self) -> PcmLayout {
        PcmLayout {
            sample_rate: self.header.sample_rate,
            channels: self.header.channels,
            bits_per_sample: self.header.bits_per_sample,
        }
    }

    /// Data chunk length (clamped to what the file actually holds)
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    fn frame_size(&self) -> usize {
        usize::from(self.header.channels) * usize::from(self.header.bits_per_sample / 8)
    }

    /// Append up to `max` PCM bytes to `out`, whole frames where possible.
    ///
    /// # Returns
    /// Bytes appended; 0 once the data chunk is exhausted.
    pub fn read_pcm(&mut self, out: &mut Vec<u8>, max: usize) -> Result<usize> {
        let remaining = self.data_len - self.position;
        if remaining == 0 || max == 0 {
            return Ok(0);
        }

        let frame = self.frame_size().max(1);
        let mut want = (max as u64).min(remaining) as usize;
        if want >= frame {
            want -= want % frame;
        }

        let start = out.len();
        out.resize(start + want, 0);
        let mut filled = 0;
        while filled < want {
            match self.source.read(&mut out[start + filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    out.truncate(start);
                    return Err(e.into());
                }
            }
        }
        out.truncate(start + filled);

        if filled < want {
            // File shorter than its data chunk; end here
            self.data_len = self.position + filled as u64;
        }
        self.position += filled as u64;
        Ok(filled)
    }

    /// Seek back to the first PCM byte
    pub fn rewind(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(self.data_offset))?;
        self.position = 0;
        Ok(())
    }
}
