//! Audio data path: chunk types, ring buffers, decoders and rate conversion

pub mod decoder;
pub mod resampler;
pub mod ring_buffer;
pub mod sniff;
pub mod types;

pub use decoder::{Decoder, DecoderState, StreamingState};
pub use ring_buffer::ChunkRingBuffer;
pub use sniff::{sniff_bytes, sniff_path, sniff_reader};
pub use types::{FileType, PcmChunk, PcmFormat};
