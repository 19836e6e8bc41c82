//! MP4/M4A atom walker for ALAC/AAC containers (spec §4.1).
//!
//! Recursively descends `moov/trak/mdia/minf/stbl/udta/meta/ilst`; leaf atoms
//! under `ilst` map to tag fields via the fixed four-byte atom code table.
//! `mdhd` supplies sample rate and frame count; `stsd` supplies the codec tag.

use std::fs;
use std::path::Path;

use super::{MetadataDescriptor, MetadataError, Picture, ScanResult, StreamDescriptor};

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

struct Atom<'a> {
    fourcc: [u8; 4],
    body: &'a [u8],
}

/// Iterates the sibling atoms in `data[start..end]`.
fn iter_atoms(data: &[u8], start: usize, end: usize) -> Vec<Atom<'_>> {
    let mut atoms = Vec::new();
    let mut offset = start;
    while offset + 8 <= end {
        let mut size = read_u32_be(&data[offset..offset + 4]) as u64;
        let fourcc: [u8; 4] = data[offset + 4..offset + 8].try_into().unwrap();
        let mut header_len = 8usize;

        if size == 1 {
            if offset + 16 > end {
                break;
            }
            size = read_u64_be(&data[offset + 8..offset + 16]);
            header_len = 16;
        } else if size == 0 {
            size = (end - offset) as u64;
        }

        let body_start = offset + header_len;
        let body_end = (offset + size as usize).min(end);
        if body_end < body_start {
            break;
        }
        atoms.push(Atom { fourcc, body: &data[body_start..body_end] });
        offset += size as usize;
        if size == 0 {
            break;
        }
    }
    atoms
}

fn find_atom<'a>(atoms: &'a [Atom<'a>], fourcc: &[u8; 4]) -> Option<&'a Atom<'a>> {
    atoms.iter().find(|a| &a.fourcc == fourcc)
}

#[derive(Default)]
struct Probe {
    sample_rate: u32,
    duration_samples: u64,
    codec: String,
    channels: u16,
    bits_per_sample: u16,
}

fn parse_mdhd(body: &[u8], probe: &mut Probe) {
    if body.len() < 4 {
        return;
    }
    let version = body[0];
    let (timescale, duration) = if version == 1 && body.len() >= 36 {
        let timescale = read_u32_be(&body[20..24]);
        let duration = read_u64_be(&body[24..32]);
        (timescale, duration)
    } else if body.len() >= 24 {
        let timescale = read_u32_be(&body[12..16]);
        let duration = read_u32_be(&body[16..20]) as u64;
        (timescale, duration)
    } else {
        return;
    };
    probe.sample_rate = timescale;
    probe.duration_samples = duration;
}

fn parse_stsd(body: &[u8], probe: &mut Probe) {
    // version/flags(4) + entry_count(4) + first SampleEntry.
    if body.len() < 8 {
        return;
    }
    let entry_start = 8;
    if body.len() < entry_start + 8 {
        return;
    }
    let entry = &body[entry_start..];
    let fourcc = &entry[4..8];
    probe.codec = String::from_utf8_lossy(fourcc).to_string();

    // AudioSampleEntry: size/type already consumed by caller's atom iteration
    // for this nested structure; here `entry` starts at the SampleEntry's
    // own size+type header.
    if entry.len() >= 8 + 6 + 2 + 2 + 2 + 4 + 4 + 2 + 2 + 2 + 2 + 4 {
        let base = 8 + 6 + 2; // skip size(4)+type(4)+reserved(6)+data_reference_index(2)
        if entry.len() >= base + 20 {
            let channels = u16::from_be_bytes([entry[base + 8], entry[base + 9]]);
            let sample_size = u16::from_be_bytes([entry[base + 10], entry[base + 11]]);
            let sample_rate_fixed = read_u32_be(&entry[base + 16..base + 20]);
            probe.channels = channels;
            probe.bits_per_sample = sample_size;
            if probe.sample_rate == 0 {
                probe.sample_rate = sample_rate_fixed >> 16;
            }
        }
    }
}

fn apply_ilst_atom(fourcc: &[u8; 4], body: &[u8], metadata: &mut MetadataDescriptor, picture: &mut Option<Picture>) {
    let data_atoms = iter_atoms(body, 0, body.len());
    let data = match find_atom(&data_atoms, b"data") {
        Some(a) => a.body,
        None => return,
    };
    if data.len() < 8 {
        return;
    }
    let data_type = read_u32_be(&data[0..4]);
    let payload = &data[8..];

    match fourcc {
        b"\xa9nam" => metadata.title = String::from_utf8_lossy(payload).to_string(),
        b"\xa9ART" => metadata.artist = String::from_utf8_lossy(payload).to_string(),
        b"\xa9alb" => metadata.album = String::from_utf8_lossy(payload).to_string(),
        b"aART" => metadata.album_artist = String::from_utf8_lossy(payload).to_string(),
        b"\xa9day" => {
            metadata.date = String::from_utf8_lossy(payload).to_string();
            if let Some(year) = metadata.date.get(0..4).and_then(|s| s.parse().ok()) {
                metadata.year = year;
            }
        }
        b"\xa9gen" => metadata.genre = String::from_utf8_lossy(payload).to_string(),
        b"\xa9wrt" => metadata.composer = String::from_utf8_lossy(payload).to_string(),
        b"trkn" if payload.len() >= 6 => {
            metadata.track_number = u16::from_be_bytes([payload[2], payload[3]]) as u32;
            metadata.track_count = u16::from_be_bytes([payload[4], payload[5]]) as u32;
        }
        b"disk" if payload.len() >= 6 => {
            metadata.disk_number = u16::from_be_bytes([payload[2], payload[3]]) as u32;
            metadata.disk_count = u16::from_be_bytes([payload[4], payload[5]]) as u32;
        }
        b"cpil" if !payload.is_empty() => metadata.compilation = payload[0] != 0,
        b"covr" => {
            let mime = if data_type == 13 { "image/jpeg" } else { "image/png" };
            *picture = Some(Picture { mime_type: mime.to_string(), bytes: payload.to_vec() });
        }
        _ => {}
    }
}

/// Parses an MP4/M4A container for ALAC/AAC metadata and stream parameters.
pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let data = fs::read(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    let top = iter_atoms(&data, 0, data.len());
    let moov = find_atom(&top, b"moov").ok_or_else(|| MetadataError::corrupt("missing moov atom"))?;
    let moov_children = iter_atoms(moov.body, 0, moov.body.len());
    let trak = find_atom(&moov_children, b"trak").ok_or_else(|| MetadataError::corrupt("missing trak atom"))?;
    let trak_children = iter_atoms(trak.body, 0, trak.body.len());
    let mdia = find_atom(&trak_children, b"mdia").ok_or_else(|| MetadataError::corrupt("missing mdia atom"))?;
    let mdia_children = iter_atoms(mdia.body, 0, mdia.body.len());

    let mut probe = Probe::default();
    if let Some(mdhd) = find_atom(&mdia_children, b"mdhd") {
        parse_mdhd(mdhd.body, &mut probe);
    }

    if let Some(minf) = find_atom(&mdia_children, b"minf") {
        let minf_children = iter_atoms(minf.body, 0, minf.body.len());
        if let Some(stbl) = find_atom(&minf_children, b"stbl") {
            let stbl_children = iter_atoms(stbl.body, 0, stbl.body.len());
            if let Some(stsd) = find_atom(&stbl_children, b"stsd") {
                parse_stsd(stsd.body, &mut probe);
            }
        }
    }

    let mut metadata = MetadataDescriptor::default();
    let mut picture = None;
    if let Some(udta) = find_atom(&moov_children, b"udta") {
        let udta_children = iter_atoms(udta.body, 0, udta.body.len());
        if let Some(meta) = find_atom(&udta_children, b"meta") {
            // `meta` is a full box: version(1)+flags(3) precede its children.
            if meta.body.len() > 4 {
                let meta_children = iter_atoms(meta.body, 4, meta.body.len());
                if let Some(ilst) = find_atom(&meta_children, b"ilst") {
                    for atom in iter_atoms(ilst.body, 0, ilst.body.len()) {
                        apply_ilst_atom(&atom.fourcc, atom.body, &mut metadata, &mut picture);
                    }
                }
            }
        }
    }

    if probe.sample_rate == 0 || probe.channels == 0 {
        return Err(MetadataError::corrupt("missing sample rate/channel info"));
    }
    if probe.bits_per_sample == 0 {
        probe.bits_per_sample = 16;
    }

    let codec = if probe.codec.eq_ignore_ascii_case("alac") { "ALAC" } else { "AAC" };
    let bytes_per_sample = (probe.bits_per_sample as u64).div_ceil(8);
    let byte_size = probe.duration_samples * probe.channels as u64 * bytes_per_sample;
    let duration_ms = if probe.sample_rate == 0 { 0 } else { (probe.duration_samples * 1000) / probe.sample_rate as u64 };
    let bit_rate = if duration_ms == 0 { 0 } else { ((byte_size * 8) / duration_ms / 1000) as u32 };

    let stream = StreamDescriptor {
        codec: codec.to_string(),
        sample_rate: probe.sample_rate,
        bits_per_sample: probe.bits_per_sample,
        channels: probe.channels,
        sample_count: probe.duration_samples,
        byte_size,
        bit_rate,
    };

    Ok(ScanResult { stream, metadata, picture })
}
