//! WAV/RIFF container parser (little-endian).

use std::fs;
use std::path::Path;

use super::{MetadataDescriptor, MetadataError, ScanResult, StreamDescriptor};

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Parses a WAV file's `fmt `/`data` chunks and any `LIST/INFO` tag chunk.
pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let data = fs::read(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(MetadataError::corrupt("not a RIFF/WAVE file"));
    }

    let mut offset = 12usize;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut bits_per_sample = 0u16;
    let mut data_size = 0u64;
    let mut metadata = MetadataDescriptor::default();

    while offset + 8 <= data.len() {
        let id = &data[offset..offset + 4];
        let size = read_u32_le(&data[offset + 4..offset + 8]) as usize;
        let body_start = offset + 8;
        let body_end = (body_start + size).min(data.len());

        match id {
            b"fmt " => {
                if body_end - body_start < 16 {
                    return Err(MetadataError::corrupt("fmt chunk too small"));
                }
                let body = &data[body_start..body_end];
                channels = read_u16_le(&body[2..4]);
                sample_rate = read_u32_le(&body[4..8]);
                bits_per_sample = read_u16_le(&body[14..16]);
            }
            b"data" => {
                data_size = (body_end - body_start) as u64;
            }
            b"LIST" if body_end - body_start >= 4 && &data[body_start..body_start + 4] == b"INFO" => {
                parse_info_chunk(&data[body_start + 4..body_end], &mut metadata);
            }
            _ => {}
        }

        offset = body_start + size + (size % 2);
    }

    if channels == 0 || sample_rate == 0 || bits_per_sample == 0 {
        return Err(MetadataError::corrupt("missing fmt chunk"));
    }

    let bytes_per_sample = (bits_per_sample as u64).div_ceil(8);
    let sample_count = if channels == 0 || bytes_per_sample == 0 {
        0
    } else {
        data_size / (channels as u64 * bytes_per_sample)
    };
    let duration_ms = if sample_rate == 0 { 0 } else { (sample_count * 1000) / sample_rate as u64 };
    let bit_rate = if duration_ms == 0 { 0 } else { ((data_size * 8) / duration_ms.max(1) / 1000) as u32 };

    let stream = StreamDescriptor {
        codec: "WAV".to_string(),
        sample_rate,
        bits_per_sample,
        channels,
        sample_count,
        byte_size: data_size,
        bit_rate,
    };

    Ok(ScanResult { stream, metadata, picture: None })
}

fn parse_info_chunk(body: &[u8], metadata: &mut MetadataDescriptor) {
    let mut offset = 0usize;
    while offset + 8 <= body.len() {
        let id = &body[offset..offset + 4];
        let size = read_u32_le(&body[offset + 4..offset + 8]) as usize;
        let start = offset + 8;
        let end = (start + size).min(body.len());
        let text = String::from_utf8_lossy(&body[start..end])
            .trim_end_matches('\0')
            .to_string();

        match id {
            b"INAM" => metadata.title = text,
            b"IART" => metadata.artist = text,
            b"IPRD" => metadata.album = text,
            b"ICRD" => metadata.date = text,
            b"IGNR" => metadata.genre = text,
            _ => {}
        }

        offset = start + size + (size % 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_wav(path: &Path, sample_rate: u32, bits: u16, channels: u16, frames: u32) {
        let bytes_per_sample = (bits / 8) as u32;
        let data_size = frames * bytes_per_sample * channels as u32;
        let byte_rate = sample_rate * channels as u32 * bytes_per_sample;
        let block_align = channels * bytes_per_sample as u16;

        let mut f = fs::File::create(path).unwrap();
        f.write_all(b"RIFF").unwrap();
        f.write_all(&(36 + data_size).to_le_bytes()).unwrap();
        f.write_all(b"WAVE").unwrap();
        f.write_all(b"fmt ").unwrap();
        f.write_all(&16u32.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&channels.to_le_bytes()).unwrap();
        f.write_all(&sample_rate.to_le_bytes()).unwrap();
        f.write_all(&byte_rate.to_le_bytes()).unwrap();
        f.write_all(&block_align.to_le_bytes()).unwrap();
        f.write_all(&bits.to_le_bytes()).unwrap();
        f.write_all(b"data").unwrap();
        f.write_all(&data_size.to_le_bytes()).unwrap();
        f.write_all(&vec![0u8; data_size as usize]).unwrap();
    }

    #[test]
    fn parses_stream_descriptor_from_minimal_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        write_minimal_wav(&path, 44_100, 16, 2, 44_100);

        let result = parse(&path).unwrap();
        assert_eq!(result.stream.sample_rate, 44_100);
        assert_eq!(result.stream.bits_per_sample, 16);
        assert_eq!(result.stream.channels, 2);
        assert_eq!(result.stream.sample_count, 44_100);
        assert_eq!(result.stream.duration_ms(), 1000);
    }

    #[test]
    fn rejects_non_riff_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        fs::write(&path, b"not a wav file at all").unwrap();
        assert!(parse(&path).is_err());
    }
}
