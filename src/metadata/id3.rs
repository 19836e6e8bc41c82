//! Shared ID3v1/ID3v2 helpers: syncsafe integers, the frame-id hash lookup,
//! and text-frame content decoding.
//!
//! Grounded in `original_source/src/inc/id3v2/frame.c` and
//! `original_source/src/inc/id3v2/utils.h`. The frame-id hash's body is not
//! present in the kept original source (only its prototype survives); per
//! SPEC_FULL.md §F.4 this reuses the project's case-folded rolling hash for
//! internal consistency.

use crate::hash::rolling_hash_bytes;

/// Which `Song` field a recognized ID3v2 frame id maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Composer,
    Conductor,
    Year,
    Date,
    Track,
    Disk,
    Compilation,
    Picture,
}

/// Deterministic 32-bit-style hash over a 4-byte ID3v2 frame id, used for
/// table dispatch instead of direct string compare (see module docs).
pub fn calc_hash_id(id: &[u8; 4]) -> u64 {
    rolling_hash_bytes(id)
}

const FRAME_TABLE: &[(&[u8; 4], FrameField)] = &[
    (b"TIT2", FrameField::Title),
    (b"TPE1", FrameField::Artist),
    (b"TALB", FrameField::Album),
    (b"TPE2", FrameField::AlbumArtist),
    (b"TCON", FrameField::Genre),
    (b"TCOM", FrameField::Composer),
    (b"TPE3", FrameField::Conductor),
    (b"TYER", FrameField::Year),
    (b"TDRC", FrameField::Date),
    (b"TRCK", FrameField::Track),
    (b"TPOS", FrameField::Disk),
    (b"TCMP", FrameField::Compilation),
    (b"APIC", FrameField::Picture),
];

/// Resolves a raw 4-byte frame id to the field it populates, by comparing
/// `calc_hash_id` hashes against the fixed frame table (mirroring the
/// original's hash-keyed frame dispatch).
pub fn lookup_frame_field(id: &[u8; 4]) -> Option<FrameField> {
    let target = calc_hash_id(id);
    FRAME_TABLE
        .iter()
        .find(|(candidate, _)| calc_hash_id(candidate) == target)
        .map(|(_, field)| *field)
}

/// Decodes the syncsafe 28-bit size field used by ID3v2.4 (and the tag
/// header's overall size field in both v2.3 and v2.4).
pub fn syncsafe_to_u32(bytes: &[u8; 4]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}

/// Decodes the raw 32-bit size field used by ID3v2.3 frame headers.
pub fn raw_to_u32(bytes: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*bytes)
}

/// Decodes an ID3v2 text-frame body: first byte is the text encoding
/// (0=Latin-1, 1=UTF-16 with BOM, 2=UTF-16BE, 3=UTF-8), followed by the
/// encoded text. Strips a leading BOM and embedded control bytes, per the
/// normalization in `frame.c`.
pub fn decode_text_frame(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let encoding = body[0];
    let payload = &body[1..];
    let raw = match encoding {
        0 | 3 => String::from_utf8_lossy(payload).into_owned(),
        1 => decode_utf16_with_bom(payload),
        2 => decode_utf16_be(payload),
        _ => String::from_utf8_lossy(payload).into_owned(),
    };
    strip_control_bytes(&raw)
}

fn decode_utf16_with_bom(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        decode_utf16_le(&bytes[2..])
    } else if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        decode_utf16_be(&bytes[2..])
    } else {
        decode_utf16_le(bytes)
    }
}

fn decode_utf16_le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn decode_utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn strip_control_bytes(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect::<String>()
        .trim_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Parsed ID3v1 fixed-layout trailer (spec §4.1: 128-byte trailer at EOF).
#[derive(Debug, Clone, Default)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub track_number: Option<u8>,
}

/// Reads the trailing 128-byte ID3v1 tag, if present.
pub fn parse_id3v1(file_bytes: &[u8]) -> Option<Id3v1Tag> {
    if file_bytes.len() < 128 {
        return None;
    }
    let tail = &file_bytes[file_bytes.len() - 128..];
    if &tail[0..3] != b"TAG" {
        return None;
    }

    let field = |range: std::ops::Range<usize>| -> String {
        String::from_utf8_lossy(&tail[range])
            .trim_end_matches('\0')
            .trim()
            .to_string()
    };

    // ID3v1.1: byte 125 is 0 and byte 126 holds the track number.
    let track_number = if tail[125] == 0 && tail[126] != 0 {
        Some(tail[126])
    } else {
        None
    };

    Some(Id3v1Tag {
        title: field(3..33),
        artist: field(33..63),
        album: field(63..93),
        year: field(93..97),
        track_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_hash_resolves_known_ids() {
        assert_eq!(lookup_frame_field(b"TIT2"), Some(FrameField::Title));
        assert_eq!(lookup_frame_field(b"TPE1"), Some(FrameField::Artist));
        assert_eq!(lookup_frame_field(b"ZZZZ"), None);
    }

    #[test]
    fn syncsafe_decodes_28_bit_size() {
        let bytes = [0x00, 0x00, 0x02, 0x01];
        assert_eq!(syncsafe_to_u32(&bytes), 257);
    }

    #[test]
    fn decodes_latin1_text_frame() {
        let mut body = vec![0u8];
        body.extend_from_slice(b"Abbey Road");
        assert_eq!(decode_text_frame(&body), "Abbey Road");
    }

    #[test]
    fn parses_id3v1_trailer() {
        let mut tail = vec![0u8; 128];
        tail[0..3].copy_from_slice(b"TAG");
        tail[3..13].copy_from_slice(b"Test Title");
        let tag = parse_id3v1(&tail).unwrap();
        assert_eq!(tag.title, "Test Title");
    }
}
