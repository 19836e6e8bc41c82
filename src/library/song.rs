//! `Song` record and its stable identity, per spec §3.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::hash::{album_sort_key as compute_album_sort_key, file_hash, rolling_hash, title_hash};
use crate::metadata::{MediaClass, MetadataDescriptor, StreamDescriptor};

/// Stable arena index for a `Song`, replacing the source's shared pointers
/// (spec §9, "Pointer graphs -> arena + indices").
pub type SongId = u32;

/// A logical audio track owned by the Library.
#[derive(Debug, Clone)]
pub struct Song {
    pub id: SongId,

    // File facet
    pub path: PathBuf,
    pub folder: String,
    pub basename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified_unix: u64,
    pub inserted_unix: u64,
    pub file_hash: String,

    // Stream facet
    pub codec: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub bytes_per_sample: u32,
    pub sample_count: u64,
    pub byte_size: u64,
    pub bit_rate: u32,
    pub chunk_size: u32,
    pub duration_ms: u64,
    pub duration_s: u64,

    // Metadata facet
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

    // Sort facet
    pub artist_sort: String,
    pub album_artist_sort: String,
    pub album_sort_key: String,
    pub artist_sort_hash: u64,
    pub album_artist_sort_hash: u64,
    pub album_sort_key_hash: u64,
    pub year_sort: u32,

    // Icon & media class
    pub media_class: MediaClass,

    // Identity
    pub title_hash: String,
    pub album_hash: String,

    // Lifecycle
    pub deleted: bool,
    pub loaded: bool,

    // Statistics
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub percent_played: f32,
    pub played_seconds: u64,
}

/// Splits `path` into its folder, file-stem, and lowercased extension
/// facets, shared by `Song::new` and `Library::load_from_file` (which
/// recovers them from the already-available `record.path` rather than
/// storing them on disk).
pub fn path_facets(path: &Path) -> (String, String, String) {
    let folder = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let basename = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    (folder, basename, extension)
}

impl Song {
    /// Builds a `Song` from a scanned path, a normalized metadata
    /// descriptor, and the file's on-disk facts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SongId,
        path: &Path,
        stream: StreamDescriptor,
        metadata: MetadataDescriptor,
        size_bytes: u64,
        modified_unix: u64,
        inserted_unix: u64,
    ) -> Self {
        let (folder, basename, extension) = path_facets(path);

        let album_sort_key = compute_album_sort_key(&metadata.album, &metadata.album_artist);
        let title = if metadata.title.is_empty() { basename.clone() } else { metadata.title.clone() };
        let title_hash_value = title_hash(&folder, &album_sort_key, &title);
        let album_hash_value = crate::hash::album_hash(&metadata.album, &metadata.album_artist);

        let media_class = MediaClass::derive(stream.sample_rate, stream.bits_per_sample);

        Song {
            id,
            path: path.to_path_buf(),
            folder,
            basename,
            extension,
            size_bytes,
            modified_unix,
            inserted_unix,
            file_hash: file_hash(path),

            bytes_per_sample: stream.bytes_per_sample(),
            chunk_size: stream.chunk_size(),
            duration_ms: stream.duration_ms(),
            duration_s: stream.duration_s(),
            codec: stream.codec.clone(),
            channels: stream.channels,
            sample_rate: stream.sample_rate,
            bits_per_sample: stream.bits_per_sample,
            sample_count: stream.sample_count,
            byte_size: stream.byte_size,
            bit_rate: stream.bit_rate,

            artist_sort: metadata.artist.to_lowercase(),
            album_artist_sort: metadata.album_artist.to_lowercase(),
            artist_sort_hash: rolling_hash(&metadata.artist),
            album_artist_sort_hash: rolling_hash(&metadata.album_artist),
            album_sort_key_hash: rolling_hash(&album_sort_key),
            year_sort: metadata.year,

            artist: metadata.artist,
            album_artist: metadata.album_artist,
            original_artist: metadata.original_artist,
            original_album_artist: metadata.original_album_artist,
            album: metadata.album,
            title,
            genre: metadata.genre,
            composer: metadata.composer,
            conductor: metadata.conductor,
            year: metadata.year,
            date: metadata.date,
            track_number: metadata.track_number,
            track_count: metadata.track_count,
            disk_number: metadata.disk_number,
            disk_count: metadata.disk_count,
            compilation: metadata.compilation,

            album_sort_key,
            media_class,

            title_hash: title_hash_value,
            album_hash: album_hash_value,

            deleted: false,
            loaded: true,

            bytes_read: 0,
            bytes_written: 0,
            percent_played: 0.0,
            played_seconds: 0,
        }
    }

    /// Whether `(size_bytes, modified_unix)` still matches this song's
    /// recorded values, used by `rescan` to decide re-parse vs. keep.
    pub fn matches_file_facts(&self, size_bytes: u64, modified_unix: u64) -> bool {
        self.size_bytes == size_bytes && self.modified_unix == modified_unix
    }

    /// Reconstructs this song's stream descriptor, for handing to the
    /// decoder adapter when opening it for playback.
    pub fn stream_descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            codec: self.codec.clone(),
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            channels: self.channels,
            sample_count: self.sample_count,
            byte_size: self.byte_size,
            bit_rate: self.bit_rate,
        }
    }
}

/// Returns the current Unix timestamp, used when a caller needs `now()`
/// outside of a `Context` (e.g. CSV import helpers operating on raw bytes).
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataDescriptor;

    #[test]
    fn song_identity_is_stable_for_same_inputs() {
        let stream = StreamDescriptor {
            codec: "FLAC".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 2,
            sample_count: 44_100,
            byte_size: 176_400,
            bit_rate: 1411,
        };
        let meta = MetadataDescriptor {
            title: "Song".into(),
            album: "Album".into(),
            album_artist: "Artist".into(),
            ..Default::default()
        };
        let a = Song::new(0, Path::new("/music/a.flac"), stream.clone(), meta.clone(), 100, 200, 300);
        let b = Song::new(1, Path::new("/music/a.flac"), stream, meta, 100, 200, 300);
        assert_eq!(a.file_hash, b.file_hash);
        assert_eq!(a.title_hash, b.title_hash);
        assert_eq!(a.media_class, MediaClass::Cd);
    }
}
