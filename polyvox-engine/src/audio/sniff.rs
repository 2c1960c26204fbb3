//! File type detection by signature
//!
//! WAV is checked first and is always supported. Ogg files are told apart by
//! the identification header in the first packet of the first page. Only
//! formats compiled into this build are reported; anything else is
//! [`FileType::Invalid`].

use super::decoder::{opus, vorbis};
use super::types::FileType;
use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

/// Bytes read from the start of a file for sniffing
pub const SNIFF_LEN: usize = 4096;

/// Smallest file accepted as WAV (RIFF header + minimal fmt + data header)
pub const MIN_WAVE_LEN: usize = 44;

const OGG_PAGE_HEADER_LEN: usize = 27;

/// Detect the file type of an in-memory prefix
pub fn sniff_bytes(bytes: &[u8]) -> FileType {
    if is_wave(bytes) {
        return FileType::Wave;
    }

    if let Some(packet) = first_ogg_packet(bytes) {
        if cfg!(feature = "vorbis") && vorbis::is_identification_header(packet) {
            return FileType::OggVorbis;
        }
        if cfg!(feature = "opus") && opus::is_opus_head(packet) {
            return FileType::OggOpus;
        }
        trace!("Ogg stream with unsupported codec");
    }

    FileType::Invalid
}

/// Detect the file type from a seekable reader, restoring its position
pub fn sniff_reader<R: Read + Seek>(reader: &mut R) -> Result<FileType> {
    let start = reader.stream_position()?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;
    reader.seek(SeekFrom::Start(start))?;
    Ok(sniff_bytes(&prefix))
}

/// Detect the file type of a file on disk
pub fn sniff_path(path: &Path) -> Result<FileType> {
    let mut file = File::open(path)?;
    sniff_reader(&mut file)
}

fn is_wave(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_WAVE_LEN && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Payload of the first packet on the first Ogg page
///
/// Only the page structure is checked; the CRC is not verified.
fn first_ogg_packet(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < OGG_PAGE_HEADER_LEN || &bytes[0..4] != b"OggS" || bytes[4] != 0 {
        return None;
    }

    let segments = usize::from(bytes[26]);
    let table = bytes.get(OGG_PAGE_HEADER_LEN..OGG_PAGE_HEADER_LEN + segments)?;

    let mut packet_len = 0usize;
    for &lacing in table {
        packet_len += usize::from(lacing);
        if lacing < 255 {
            break;
        }
    }

    let body = OGG_PAGE_HEADER_LEN + segments;
    bytes.get(body..body + packet_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ogg_page(packet: &[u8]) -> Vec<u8> {
        let mut v = b"OggS".to_vec();
        v.push(0); // version
        v.push(0x02); // beginning of stream
        v.extend_from_slice(&0u64.to_le_bytes());
        v.extend_from_slice(&1234u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.push(1);
        v.push(packet.len() as u8);
        v.extend_from_slice(packet);
        v
    }

    #[test]
    fn test_short_riff_is_invalid() {
        let mut bytes = b"RIFF\0\0\0\0WAVE".to_vec();
        assert_eq!(sniff_bytes(&bytes), FileType::Invalid);
        bytes.resize(MIN_WAVE_LEN, 0);
        assert_eq!(sniff_bytes(&bytes), FileType::Wave);
    }

    #[test]
    fn test_ogg_with_unknown_codec_is_invalid() {
        let page = ogg_page(b"\x80theora-video-header-bytes-here");
        assert_eq!(sniff_bytes(&page), FileType::Invalid);
    }

    #[test]
    fn test_truncated_ogg_page_is_invalid() {
        let page = ogg_page(b"OpusHead\x01\x02\x38\x01\x80\xbb\0\0\0\0\0");
        assert_eq!(sniff_bytes(&page[..30]), FileType::Invalid);
    }

    #[test]
    fn test_reader_position_restored() {
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        bytes.resize(100, 0);
        let mut cursor = std::io::Cursor::new(bytes);
        cursor.set_position(8);
        assert_eq!(sniff_reader(&mut cursor).unwrap(), FileType::Wave);
        assert_eq!(cursor.position(), 8);
    }
}
