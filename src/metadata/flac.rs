//! FLAC metadata parsing via `symphonia`'s native FLAC reader, per
//! SPEC_FULL.md §G (the only format the teacher's own decoding stack already
//! covers end to end).

use std::fs::File;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Value};
use symphonia::core::probe::Hint;

use super::{MetadataDescriptor, MetadataError, Picture, ScanResult, StreamDescriptor};

pub fn parse(path: &Path) -> Result<ScanResult, MetadataError> {
    let file = File::open(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("flac");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MetadataError::corrupt(format!("flac probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| MetadataError::corrupt("flac stream has no default track"))?;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate.ok_or_else(|| MetadataError::corrupt("missing sample rate"))?;
    let bits_per_sample = params.bits_per_sample.unwrap_or(16) as u16;
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
    let sample_count = params.n_frames.unwrap_or(0);

    let bytes_per_sample = (bits_per_sample as u64).div_ceil(8);
    let byte_size = sample_count * channels as u64 * bytes_per_sample;
    let duration_ms = if sample_rate == 0 { 0 } else { (sample_count * 1000) / sample_rate as u64 };
    let bit_rate = if duration_ms == 0 { 0 } else { ((byte_size * 8) / duration_ms.max(1) / 1000) as u32 };

    let stream = StreamDescriptor {
        codec: "FLAC".to_string(),
        sample_rate,
        bits_per_sample,
        channels,
        sample_count,
        byte_size,
        bit_rate,
    };

    let mut metadata = MetadataDescriptor::default();
    let mut picture = None;

    if let Some(rev) = format.metadata().current() {
        apply_tags(rev, &mut metadata, &mut picture);
    }

    Ok(ScanResult { stream, metadata, picture })
}

fn apply_tags(rev: &symphonia::core::meta::MetadataRevision, metadata: &mut MetadataDescriptor, picture: &mut Option<Picture>) {
    for tag in rev.tags() {
        let text = match &tag.value {
            Value::String(s) => s.clone(),
            Value::UnsignedInt(n) => n.to_string(),
            Value::SignedInt(n) => n.to_string(),
            _ => continue,
        };
        match tag.std_key {
            Some(StandardTagKey::Artist) => metadata.artist = text,
            Some(StandardTagKey::AlbumArtist) => metadata.album_artist = text,
            Some(StandardTagKey::Album) => metadata.album = text,
            Some(StandardTagKey::TrackTitle) => metadata.title = text,
            Some(StandardTagKey::Genre) => metadata.genre = text,
            Some(StandardTagKey::Composer) => metadata.composer = text,
            Some(StandardTagKey::Conductor) => metadata.conductor = text,
            Some(StandardTagKey::Date) => metadata.date = text,
            Some(StandardTagKey::TrackNumber) => {
                metadata.track_number = parse_maybe_fraction(&text).0;
                if metadata.track_count == 0 {
                    metadata.track_count = parse_maybe_fraction(&text).1;
                }
            }
            Some(StandardTagKey::TrackTotal) => metadata.track_count = text.parse().unwrap_or(0),
            Some(StandardTagKey::DiscNumber) => metadata.disk_number = parse_maybe_fraction(&text).0,
            Some(StandardTagKey::DiscTotal) => metadata.disk_count = text.parse().unwrap_or(0),
            Some(StandardTagKey::Compilation) => metadata.compilation = text == "1",
            _ => {}
        }
    }
    for visual in rev.visuals() {
        if picture.is_none() && !visual.data.is_empty() {
            *picture = Some(Picture {
                mime_type: visual.media_type.clone(),
                bytes: visual.data.to_vec(),
            });
        }
    }
    if metadata.year == 0 {
        if let Ok(y) = metadata.date.chars().take(4).collect::<String>().parse::<u32>() {
            metadata.year = y;
        }
    }
}

fn parse_maybe_fraction(text: &str) -> (u32, u32) {
    let mut parts = text.split('/');
    let value = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let count = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    (value, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_maybe_fraction_splits_on_slash() {
        assert_eq!(parse_maybe_fraction("3/12"), (3, 12));
        assert_eq!(parse_maybe_fraction("5"), (5, 0));
    }
}
