//! Ogg Opus
//!
//! Decoding goes through libopus via `symphonia-adapter-libopus`, which is
//! only built with the `opus` feature. Header detection is always available
//! so that sniffing can tell an Opus file from an unknown one.

#[cfg(feature = "opus")]
use super::{CountingSource, OggStream};
#[cfg(feature = "opus")]
use crate::error::Result;

/// Minimum size of an OpusHead packet (mapping family 0)
pub const OPUS_HEAD_MIN_LEN: usize = 19;

/// Check a first Ogg packet for an `OpusHead` identification header.
///
/// Accepts any minor version of major version 0 and requires at least one
/// output channel.
pub fn is_opus_head(packet: &[u8]) -> bool {
    if packet.len() < OPUS_HEAD_MIN_LEN || &packet[..8] != b"OpusHead" {
        return false;
    }
    let version = packet[8];
    let channels = packet[9];
    version & 0xF0 == 0 && channels > 0
}

/// Codec registry with the libopus decoder registered
#[cfg(feature = "opus")]
fn codec_registry() -> &'static symphonia::core::codecs::CodecRegistry {
    use std::sync::OnceLock;
    use symphonia::core::codecs::CodecRegistry;
    use symphonia_adapter_libopus::OpusDecoder;

    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusDecoder>();
        registry
    })
}

/// Open an Opus stream
#[cfg(feature = "opus")]
pub(crate) fn open(source: CountingSource) -> Result<OggStream> {
    use symphonia::core::codecs::CODEC_TYPE_OPUS;
    OggStream::open(source, codec_registry(), CODEC_TYPE_OPUS, "Opus")
}
