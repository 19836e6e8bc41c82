//! DSF (DSD Stream File) container parser (little-endian).
//!
//! Chunk layout grounded in `TDSFHeader`/`TDSFFormat`/`TDSFData` in
//! `original_source/src/inc/dsdtypes.h`. DSD's native bit rate (e.g. the
//! 2.8224 MHz "DSD64" clock) is reported here as its DSD-over-PCM carrier
//! rate (`native_rate / 16`), since each DoP frame packs 16 DSD bit-cells
//! into one PCM sample word (§4.5's "Conversion" section); this keeps the
//! reported `sample_rate` inside spec §3's accepted PCM rate set.

use std::fs;
use std::path::Path;

use super::{MetadataDescriptor, MetadataError, ScanResult, StreamDescriptor};

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Parses a DSF file's `fmt `/`data` chunks.
pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let data = fs::read(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    if data.len() < 28 || &data[0..4] != b"DSD " {
        return Err(MetadataError::corrupt("not a DSF file"));
    }

    let mut offset = 28usize;
    let mut channels = 0u32;
    let mut native_rate = 0u32;
    let mut sample_count = 0u64;
    let mut data_size = 0u64;

    while offset + 12 <= data.len() {
        let id = &data[offset..offset + 4];
        let chunk_size = read_u64_le(&data[offset + 4..offset + 12]) as usize;
        let body_start = offset + 12;

        match id {
            b"fmt " => {
                let body_end = (body_start + 40).min(data.len());
                if body_end - body_start < 40 {
                    return Err(MetadataError::corrupt("fmt chunk too small"));
                }
                let body = &data[body_start..body_end];
                channels = read_u32_le(&body[8..12]);
                native_rate = read_u32_le(&body[12..16]);
                sample_count = read_u64_le(&body[20..28]);
            }
            b"data" => {
                data_size = chunk_size.saturating_sub(12) as u64;
            }
            _ => {}
        }

        if chunk_size == 0 {
            break;
        }
        offset = body_start + chunk_size.saturating_sub(12);
    }

    if channels == 0 || native_rate == 0 {
        return Err(MetadataError::corrupt("missing fmt chunk"));
    }

    let sample_rate = native_rate / 16;
    let bit_rate = (native_rate as u64 * channels as u64 / 1000) as u32;

    let stream = StreamDescriptor {
        codec: "DSD".to_string(),
        sample_rate,
        bits_per_sample: 1,
        channels: channels as u16,
        sample_count,
        byte_size: data_size,
        bit_rate,
    };

    Ok(ScanResult {
        stream,
        metadata: MetadataDescriptor::default(),
        picture: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_dsf(path: &Path, native_rate: u32, channels: u32, sample_count: u64) {
        let data_chunk_size: u64 = 12 + 64;
        let mut f = fs::File::create(path).unwrap();
        f.write_all(b"DSD ").unwrap();
        f.write_all(&28u64.to_le_bytes()).unwrap();
        f.write_all(&0u64.to_le_bytes()).unwrap();
        f.write_all(&0u64.to_le_bytes()).unwrap();

        f.write_all(b"fmt ").unwrap();
        f.write_all(&52u64.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap(); // format version
        f.write_all(&0u32.to_le_bytes()).unwrap(); // format id
        f.write_all(&channels.to_le_bytes()).unwrap();
        f.write_all(&native_rate.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap(); // bits per sample
        f.write_all(&sample_count.to_le_bytes()).unwrap();
        f.write_all(&4096u32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();

        f.write_all(b"data").unwrap();
        f.write_all(&data_chunk_size.to_le_bytes()).unwrap();
        f.write_all(&vec![0u8; 64]).unwrap();
    }

    #[test]
    fn reports_dop_carrier_rate_for_dsd64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dsf");
        write_minimal_dsf(&path, 2_822_400, 2, 1000);

        let result = parse(&path).unwrap();
        assert_eq!(result.stream.sample_rate, 176_400);
        assert_eq!(result.stream.bits_per_sample, 1);
        assert_eq!(result.stream.channels, 2);
    }
}
