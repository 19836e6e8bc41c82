//! Metadata Scanner (spec §4.1): dispatches by file extension to a
//! format-specific parser and normalizes the resulting tag set.

mod aiff;
mod dff;
mod dsf;
mod flac;
mod id3;
mod ieee754;
mod mp3;
mod mp4;
mod normalize;
mod wav;

pub use normalize::normalize;

use std::path::Path;

use thiserror::Error;

use crate::error::ScanErrorCode;

/// The set of sample rates accepted by the library, per spec §3.
pub const VALID_SAMPLE_RATES: [u32; 8] = [
    44_100, 48_000, 88_200, 96_000, 176_400, 192_000, 352_800, 384_000,
];

/// The set of bit depths accepted by the library, per spec §3.
pub const VALID_BIT_DEPTHS: [u16; 4] = [1, 2, 16, 24];

/// Errors raised by the per-format parsers, carrying the §4.1 error code.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{0}")]
    Parse(ScanErrorCode, String),
}

impl MetadataError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        MetadataError::Parse(ScanErrorCode::CorruptMetadata, msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        MetadataError::Parse(ScanErrorCode::Unsupported, msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        MetadataError::Parse(ScanErrorCode::FatalParser, msg.into())
    }

    pub fn unknown_type(msg: impl Into<String>) -> Self {
        MetadataError::Parse(ScanErrorCode::UnknownType, msg.into())
    }

    /// The §4.1 numeric error code for this failure.
    pub fn code(&self) -> ScanErrorCode {
        match self {
            MetadataError::Parse(code, _) => *code,
        }
    }
}

/// Stream-facet descriptor produced by every parser (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Short codec tag, e.g. `"FLAC"`, `"MP3"`, `"ALAC"`.
    pub codec: String,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub sample_count: u64,
    pub byte_size: u64,
    pub bit_rate: u32,
}

impl StreamDescriptor {
    /// Bytes per sample frame (one sample per channel).
    pub fn bytes_per_sample(&self) -> u32 {
        (self.bits_per_sample as u32).div_ceil(8)
    }

    /// Expected decode chunk size in bytes for one frame across all channels.
    pub fn chunk_size(&self) -> u32 {
        self.bytes_per_sample() * self.channels as u32
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count * 1000) / self.sample_rate as u64
    }

    /// Duration in whole seconds.
    pub fn duration_s(&self) -> u64 {
        self.duration_ms() / 1000
    }

    /// Validates the stream against spec §3's accepted rate/width/channel sets.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.channels != 2 {
            return Err(MetadataError::unsupported(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        if !VALID_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(MetadataError::unsupported(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        if !VALID_BIT_DEPTHS.contains(&self.bits_per_sample) {
            return Err(MetadataError::unsupported(format!(
                "unsupported bit depth {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Metadata-facet descriptor produced by every parser (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDescriptor {
    pub artist: String,
    pub album_artist: String,
    pub original_artist: String,
    pub original_album_artist: String,
    pub album: String,
    pub title: String,
    pub genre: String,
    pub composer: String,
    pub conductor: String,
    pub year: u32,
    pub date: String,
    pub track_number: u32,
    pub track_count: u32,
    pub disk_number: u32,
    pub disk_count: u32,
    pub compilation: bool,
}

/// An optional attached picture (cover art), carried as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Full result of parsing one file, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub stream: StreamDescriptor,
    pub metadata: MetadataDescriptor,
    pub picture: Option<Picture>,
}

/// {CD, HDCD, DSD, DVD, BD, HR}, derived from (sample rate, bits), per spec §3/§4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Cd,
    Hdcd,
    Dsd,
    Dvd,
    Bd,
    Hr,
}

impl MediaClass {
    /// All classes, in the fixed order used for the library's seven parallel
    /// artist maps (one per class, plus "all").
    pub const ALL: [MediaClass; 6] = [
        MediaClass::Cd,
        MediaClass::Hdcd,
        MediaClass::Dsd,
        MediaClass::Dvd,
        MediaClass::Bd,
        MediaClass::Hr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MediaClass::Cd => "CD",
            MediaClass::Hdcd => "HDCD",
            MediaClass::Dsd => "DSD",
            MediaClass::Dvd => "DVD",
            MediaClass::Bd => "BD",
            MediaClass::Hr => "HR",
        }
    }

    /// Derives the media class from (sample rate, bit depth), following the
    /// cascade in `TSong::updateProperties()`: DSD first (1-bit sources),
    /// then plain 16-bit/44.1kHz as CD, then wider-than-16-bit 44.1kHz as
    /// HDCD, then the higher disc-resolution rates as DVD/BD, with anything
    /// left over (higher sample rates at full PCM width) as generic
    /// high-resolution (HR).
    pub fn derive(sample_rate: u32, bits_per_sample: u16) -> MediaClass {
        if bits_per_sample == 1 {
            return MediaClass::Dsd;
        }
        if sample_rate == 44_100 && bits_per_sample == 16 {
            return MediaClass::Cd;
        }
        if sample_rate == 44_100 && bits_per_sample > 16 {
            return MediaClass::Hdcd;
        }
        if sample_rate == 48_000 {
            return MediaClass::Dvd;
        }
        if sample_rate == 96_000 || sample_rate == 192_000 {
            return MediaClass::Bd;
        }
        MediaClass::Hr
    }
}

/// Dispatches by extension and parses `path`, returning the raw (not yet
/// normalized) scan result.
pub fn scan_file(path: &Path) -> Result<ScanResult, MetadataError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| MetadataError::unknown_type("missing file extension"))?;

    let result = match ext.as_str() {
        "flac" => flac::parse(path)?,
        "wav" => wav::parse(path)?,
        "aiff" | "aif" => aiff::parse(path)?,
        "dsf" => dsf::parse(path)?,
        "dff" => dff::parse(path)?,
        "mp3" => mp3::parse(path)?,
        "m4a" | "mp4" | "alac" | "aac" => mp4::parse(path)?,
        other => return Err(MetadataError::unknown_type(format!("unknown extension {other}"))),
    };

    result.stream.validate()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_class_derivation_matches_cascade() {
        assert_eq!(MediaClass::derive(44_100, 1), MediaClass::Dsd);
        assert_eq!(MediaClass::derive(44_100, 16), MediaClass::Cd);
        assert_eq!(MediaClass::derive(44_100, 24), MediaClass::Hdcd);
        assert_eq!(MediaClass::derive(48_000, 24), MediaClass::Dvd);
        assert_eq!(MediaClass::derive(96_000, 24), MediaClass::Bd);
        assert_eq!(MediaClass::derive(176_400, 24), MediaClass::Hr);
    }

    #[test]
    fn stream_descriptor_rejects_unsupported_channel_count() {
        let stream = StreamDescriptor {
            codec: "WAV".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 1,
            sample_count: 1000,
            byte_size: 2000,
            bit_rate: 1411,
        };
        assert!(stream.validate().is_err());
    }

    #[test]
    fn duration_is_derived_from_sample_count_and_rate() {
        let stream = StreamDescriptor {
            codec: "WAV".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 2,
            sample_count: 44_100,
            byte_size: 44_100 * 4,
            bit_rate: 1411,
        };
        assert_eq!(stream.duration_ms(), 1000);
        assert_eq!(stream.duration_s(), 1);
    }
}
