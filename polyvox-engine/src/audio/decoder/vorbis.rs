//! Ogg Vorbis
//!
//! Decoding uses symphonia's pure-Rust Vorbis decoder.

#[cfg(feature = "vorbis")]
use super::{CountingSource, OggStream};
#[cfg(feature = "vorbis")]
use crate::error::Result;

/// Size of a Vorbis identification header packet
pub const IDENTIFICATION_HEADER_LEN: usize = 30;

/// Check a first Ogg packet for a Vorbis identification header.
///
/// Layout: packet type 1, "vorbis", version (must be 0), channels, sample
/// rate, three bitrates, block sizes, framing bit.
pub fn is_identification_header(packet: &[u8]) -> bool {
    if packet.len() < IDENTIFICATION_HEADER_LEN || &packet[..7] != b"\x01vorbis" {
        return false;
    }
    let version = u32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    let channels = packet[11];
    let sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
    let framing = packet[29] & 0x01;
    version == 0 && channels > 0 && sample_rate > 0 && framing == 1
}

/// Open a Vorbis stream
#[cfg(feature = "vorbis")]
pub(crate) fn open(source: CountingSource) -> Result<OggStream> {
    use symphonia::core::codecs::CODEC_TYPE_VORBIS;
    OggStream::open(
        source,
        symphonia::default::get_codecs(),
        CODEC_TYPE_VORBIS,
        "Vorbis",
    )
}
