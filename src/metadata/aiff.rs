//! AIFF container parser (big-endian; sample rate stored as an 80-bit IEEE
//! 754 extended float).

use std::fs;
use std::path::Path;

use super::ieee754::extended_to_f64;
use super::{MetadataDescriptor, MetadataError, ScanResult, StreamDescriptor};

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Parses an AIFF file's `COMM`/`SSND` chunks.
pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let data = fs::read(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    if data.len() < 12 || &data[0..4] != b"FORM" || &data[8..12] != b"AIFF" {
        return Err(MetadataError::corrupt("not a FORM/AIFF file"));
    }

    let mut offset = 12usize;
    let mut channels = 0u16;
    let mut sample_frames = 0u32;
    let mut sample_size = 0u16;
    let mut sample_rate = 0u32;
    let mut ssnd_size: u64 = 0;
    let metadata = MetadataDescriptor::default();

    while offset + 8 <= data.len() {
        let id = &data[offset..offset + 4];
        let size = read_u32_be(&data[offset + 4..offset + 8]) as usize;
        let body_start = offset + 8;
        let body_end = (body_start + size).min(data.len());

        match id {
            b"COMM" => {
                if body_end - body_start < 18 {
                    return Err(MetadataError::corrupt("COMM chunk too small"));
                }
                let body = &data[body_start..body_end];
                channels = read_u16_be(&body[0..2]);
                sample_frames = read_u32_be(&body[2..6]);
                sample_size = read_u16_be(&body[6..8]);
                let mut extended = [0u8; 10];
                extended.copy_from_slice(&body[8..18]);
                sample_rate = extended_to_f64(&extended).round() as u32;
            }
            b"SSND" => {
                // first 8 bytes of the body are offset/blockSize, the rest is audio data.
                ssnd_size = (body_end - body_start).saturating_sub(8) as u64;
            }
            _ => {}
        }

        offset = body_start + size + (size % 2);
    }

    if channels == 0 || sample_rate == 0 || sample_size == 0 {
        return Err(MetadataError::corrupt("missing COMM chunk"));
    }

    let bit_rate = if sample_frames == 0 {
        0
    } else {
        let duration_ms = (sample_frames as u64 * 1000) / sample_rate as u64;
        if duration_ms == 0 {
            0
        } else {
            ((ssnd_size * 8) / duration_ms / 1000) as u32
        }
    };

    let stream = StreamDescriptor {
        codec: "AIFF".to_string(),
        sample_rate,
        bits_per_sample: sample_size,
        channels,
        sample_count: sample_frames as u64,
        byte_size: ssnd_size,
        bit_rate,
    };

    Ok(ScanResult { stream, metadata, picture: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ieee754::f64_to_extended;
    use std::io::Write;

    fn write_minimal_aiff(path: &Path, sample_rate: u32, bits: u16, channels: u16, frames: u32) {
        let bytes_per_sample = (bits / 8) as u32;
        let ssnd_data_size = frames * bytes_per_sample * channels as u32;
        let comm_size = 18u32;
        let ssnd_size = 8 + ssnd_data_size;
        let form_size = 4 + (8 + comm_size) + (8 + ssnd_size);

        let mut f = fs::File::create(path).unwrap();
        f.write_all(b"FORM").unwrap();
        f.write_all(&form_size.to_be_bytes()).unwrap();
        f.write_all(b"AIFF").unwrap();

        f.write_all(b"COMM").unwrap();
        f.write_all(&comm_size.to_be_bytes()).unwrap();
        f.write_all(&channels.to_be_bytes()).unwrap();
        f.write_all(&frames.to_be_bytes()).unwrap();
        f.write_all(&bits.to_be_bytes()).unwrap();
        f.write_all(&f64_to_extended(sample_rate as f64)).unwrap();

        f.write_all(b"SSND").unwrap();
        f.write_all(&ssnd_size.to_be_bytes()).unwrap();
        f.write_all(&0u32.to_be_bytes()).unwrap();
        f.write_all(&0u32.to_be_bytes()).unwrap();
        f.write_all(&vec![0u8; ssnd_data_size as usize]).unwrap();
    }

    #[test]
    fn parses_stream_descriptor_from_minimal_aiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.aiff");
        write_minimal_aiff(&path, 44_100, 16, 2, 44_100);

        let result = parse(&path).unwrap();
        assert_eq!(result.stream.channels, 2);
        assert_eq!(result.stream.bits_per_sample, 16);
        assert_eq!(result.stream.sample_count, 44_100);
        assert!((result.stream.sample_rate as i64 - 44_100).abs() <= 1);
    }
}
