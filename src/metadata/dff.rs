//! DFF (Philips DSDIFF) container parser (big-endian; 64-bit chunk sizes).
//!
//! Chunk layout grounded in `TDFFFileHeader`/`TDFFFormChunk`/`TDFFSampleRate`/
//! `TDFFChannels`/`TDFFSoundDataChunk` in `original_source/src/inc/dsdtypes.h`.
//! Sample rate is reported as its DSD-over-PCM carrier rate, as in [`super::dsf`].

use std::fs;
use std::path::Path;

use super::{MetadataDescriptor, MetadataError, ScanResult, StreamDescriptor};

fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

struct Probe {
    sample_rate: u32,
    channels: u16,
    data_size: u64,
}

fn walk_chunks(data: &[u8], mut offset: usize, end: usize, probe: &mut Probe) {
    while offset + 12 <= end {
        let id = &data[offset..offset + 4];
        let size = read_u64_be(&data[offset + 4..offset + 12]) as usize;
        let body_start = offset + 12;
        let body_end = (body_start + size).min(end);

        match id {
            b"PROP" if body_end - body_start >= 4 => {
                // PROP carries a 4-byte property type ("SND ") then nested chunks.
                walk_chunks(data, body_start + 4, body_end, probe);
            }
            b"FS  " if body_end - body_start >= 4 => {
                probe.sample_rate = read_u32_be(&data[body_start..body_start + 4]);
            }
            b"CHNL" if body_end - body_start >= 2 => {
                probe.channels = read_u16_be(&data[body_start..body_start + 2]);
            }
            b"DSD " => {
                probe.data_size = (body_end - body_start) as u64;
            }
            _ => {}
        }

        offset = body_start + size + (size % 2);
    }
}

/// Parses a DFF file's `PROP`/`FS  `/`CHNL`/`DSD ` chunks.
pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let data = fs::read(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    if data.len() < 16 || &data[0..4] != b"FRM8" || &data[12..16] != b"DSD " {
        return Err(MetadataError::corrupt("not a FRM8/DSD file"));
    }

    let mut probe = Probe { sample_rate: 0, channels: 0, data_size: 0 };
    walk_chunks(&data, 16, data.len(), &mut probe);

    if probe.sample_rate == 0 || probe.channels == 0 {
        return Err(MetadataError::corrupt("missing PROP/FS /CHNL chunk"));
    }

    let sample_rate = probe.sample_rate / 16;
    let sample_count = (probe.data_size * 8) / probe.channels as u64;
    let bit_rate = (probe.sample_rate as u64 * probe.channels as u64 / 1000) as u32;

    let stream = StreamDescriptor {
        codec: "DSD".to_string(),
        sample_rate,
        bits_per_sample: 1,
        channels: probe.channels,
        sample_count,
        byte_size: probe.data_size,
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

    fn write_minimal_dff(path: &Path, native_rate: u32, channels: u16) {
        let sound_data_size: u64 = 256;
        let chnl_size: u64 = 2 + channels as u64 * 4;
        let fs_size: u64 = 4;
        let prop_inner: u64 = 4 + (12 + fs_size) + (12 + chnl_size);
        let prop_size = prop_inner;
        let dsd_size = sound_data_size;
        let form_size: u64 = 4 + (12 + prop_size) + (12 + dsd_size);

        let mut f = fs::File::create(path).unwrap();
        f.write_all(b"FRM8").unwrap();
        f.write_all(&form_size.to_be_bytes()).unwrap();
        f.write_all(b"DSD ").unwrap();

        f.write_all(b"PROP").unwrap();
        f.write_all(&prop_size.to_be_bytes()).unwrap();
        f.write_all(b"SND ").unwrap();

        f.write_all(b"FS  ").unwrap();
        f.write_all(&fs_size.to_be_bytes()).unwrap();
        f.write_all(&native_rate.to_be_bytes()).unwrap();

        f.write_all(b"CHNL").unwrap();
        f.write_all(&chnl_size.to_be_bytes()).unwrap();
        f.write_all(&channels.to_be_bytes()).unwrap();
        for _ in 0..channels {
            f.write_all(b"SLFT").unwrap();
        }

        f.write_all(b"DSD ").unwrap();
        f.write_all(&dsd_size.to_be_bytes()).unwrap();
        f.write_all(&vec![0u8; sound_data_size as usize]).unwrap();
    }

    #[test]
    fn reports_dop_carrier_rate_for_dsd64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dff");
        write_minimal_dff(&path, 2_822_400, 2);

        let result = parse(&path).unwrap();
        assert_eq!(result.stream.sample_rate, 176_400);
        assert_eq!(result.stream.channels, 2);
        assert_eq!(result.stream.bits_per_sample, 1);
    }
}
