//! Crate-wide error taxonomy, per spec §7.
//!
//! Each subsystem defines its own error enum at its module seam; this module
//! unifies them with `#[from]` so callers crossing subsystem boundaries
//! (`main.rs`, the playback engine driving the decoder and library) can use
//! `?` without manual conversion, matching the teacher's layering in
//! `db_manager.rs` and `audio_decoder.rs`.

use thiserror::Error;

use crate::library::LibraryError;
use crate::metadata::MetadataError;
use crate::playback::PlaybackError;
use crate::playlist::PlaylistError;

/// Error code returned to scanner callers, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorCode {
    /// `-1`: corrupt/invalid metadata or stream.
    CorruptMetadata,
    /// `-2`: unsupported rate/width/channel count.
    Unsupported,
    /// `-10`: fatal parser exception.
    FatalParser,
    /// `-999`: unknown file extension/type.
    UnknownType,
}

impl ScanErrorCode {
    /// The numeric code used in the errors file (spec §6).
    pub fn code(self) -> i32 {
        match self {
            ScanErrorCode::CorruptMetadata => -1,
            ScanErrorCode::Unsupported => -2,
            ScanErrorCode::FatalParser => -10,
            ScanErrorCode::UnknownType => -999,
        }
    }
}

/// Top-level error type produced at subsystem boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("resource error: {0}")]
    Resource(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
