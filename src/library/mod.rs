//! The Library (spec §3, §4.2): owns the `Song` arena and all derived
//! artist/album/letter indices, and persists itself as delimited text.

pub mod album;
pub mod csv_store;
pub mod scanner;
pub mod song;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::Context;
use crate::metadata::{self, MediaClass, MetadataError};

use album::Album;
use song::{unix_now, Song, SongId};

/// Compilations are indexed under `'2'`; non-alphanumeric initials under `'1'`.
const COMPILATION_LETTER: char = '2';
const NON_ALNUM_LETTER: char = '1';
const MIN_DEEP_WORD_LEN: usize = 3;
const DEEP_STOPWORDS: [&str; 3] = ["the", "a", "an"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv_store::CsvError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One of the seven parallel artist maps: six media classes plus "all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtistClass {
    Media(MediaClass),
    All,
}

impl ArtistClass {
    fn all_variants() -> [ArtistClass; 7] {
        [
            ArtistClass::Media(MediaClass::Cd),
            ArtistClass::Media(MediaClass::Hdcd),
            ArtistClass::Media(MediaClass::Dsd),
            ArtistClass::Media(MediaClass::Dvd),
            ArtistClass::Media(MediaClass::Bd),
            ArtistClass::Media(MediaClass::Hr),
            ArtistClass::All,
        ]
    }
}

/// Sort keys accepted by [`Library::sort_songs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Time,
    Album,
    Artist,
    AlbumArtist,
}

/// Owns all songs plus derived indices (spec §3).
pub struct Library {
    songs: Vec<Song>,
    by_file_hash: HashMap<String, SongId>,
    albums: HashMap<String, Album>,
    albums_by_sort_key: BTreeMap<String, String>,
    /// artist name -> set of album hashes, one map per [`ArtistClass`].
    artists: HashMap<ArtistClass, BTreeMap<String, Vec<String>>>,
    /// first-letter navigation counts, one map per [`ArtistClass`].
    letters: HashMap<ArtistClass, BTreeMap<char, u32>>,
    recent_album_hashes: Vec<String>,
}

impl Library {
    pub fn new() -> Self {
        let mut artists = HashMap::new();
        let mut letters = HashMap::new();
        for class in ArtistClass::all_variants() {
            artists.insert(class, BTreeMap::new());
            letters.insert(class, BTreeMap::new());
        }
        Library {
            songs: Vec::new(),
            by_file_hash: HashMap::new(),
            albums: HashMap::new(),
            albums_by_sort_key: BTreeMap::new(),
            artists,
            letters,
            recent_album_hashes: Vec::new(),
        }
    }

    pub fn song_count(&self) -> usize {
        self.songs.iter().filter(|s| !s.deleted).count()
    }

    pub fn find_by_file_hash(&self, hash: &str) -> Option<&Song> {
        self.by_file_hash.get(hash).map(|&id| &self.songs[id as usize])
    }

    pub fn find_by_album_hash(&self, hash: &str) -> Option<&Album> {
        self.albums.get(hash)
    }

    pub fn find_by_filename_prefix(&self, prefix: &str) -> Vec<&Song> {
        let prefix_lower = prefix.to_lowercase();
        self.songs
            .iter()
            .filter(|s| !s.deleted && s.basename.to_lowercase().starts_with(&prefix_lower))
            .collect()
    }

    pub fn song_at(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn song_by_id(&self, id: SongId) -> Option<&Song> {
        self.songs.get(id as usize)
    }

    pub fn artist_count(&self, class: ArtistClass) -> usize {
        self.artists.get(&class).map(|m| m.len()).unwrap_or(0)
    }

    pub fn album_count(&self) -> usize {
        self.albums.len()
    }

    pub fn letter_counts(&self, class: ArtistClass) -> &BTreeMap<char, u32> {
        self.letters.get(&class).expect("all classes registered at construction")
    }

    pub fn recent_albums(&self) -> &[String] {
        &self.recent_album_hashes
    }

    /// Imports every file under `paths` matching `patterns`, then rebuilds
    /// all indices. Returns the count of newly-added songs and the list of
    /// `(path, error)` failures, per spec §4.2.
    pub fn import(
        &mut self,
        ctx: &Context,
        paths: &[PathBuf],
        recursive: bool,
    ) -> Result<(usize, Vec<(PathBuf, MetadataError)>), LibraryError> {
        let config = ctx.config_snapshot().library;
        let mut added = 0usize;
        let mut failures = Vec::new();

        for root in paths {
            let files = scanner::walk(root, &config.file_patterns, recursive)?;
            for path in files {
                match self.scan_and_insert(&path, &config) {
                    Ok(true) => added += 1,
                    Ok(false) => {}
                    Err(e) => failures.push((path, e)),
                }
            }
        }

        self.rebuild_indices(&config);
        Ok((added, failures))
    }

    /// Re-walks `paths`: existing songs whose `(size, mtime)` are unchanged
    /// are kept; changed files are re-parsed in place so playlist references
    /// survive; songs not found during the walk are removed on commit.
    pub fn rescan(
        &mut self,
        ctx: &Context,
        paths: &[PathBuf],
        recursive: bool,
    ) -> Result<(usize, Vec<(PathBuf, MetadataError)>), LibraryError> {
        let config = ctx.config_snapshot().library;
        for song in &mut self.songs {
            song.loaded = false;
        }

        let mut reparsed = 0usize;
        let mut failures = Vec::new();

        for root in paths {
            let files = scanner::walk(root, &config.file_patterns, recursive)?;
            for path in files {
                let meta = match std::fs::metadata(&path) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let size = meta.len();
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);

                let existing_hash = crate::hash::file_hash(&path);
                if let Some(&id) = self.by_file_hash.get(&existing_hash) {
                    let song = &mut self.songs[id as usize];
                    if song.matches_file_facts(size, mtime) {
                        song.loaded = true;
                        continue;
                    }
                    match metadata::scan_file(&path) {
                        Ok(scan) => {
                            let normalized = metadata::normalize(scan.metadata, &song.folder, &config);
                            let replacement = Song::new(id, &path, scan.stream, normalized, size, mtime, song.inserted_unix);
                            self.songs[id as usize] = replacement;
                            self.songs[id as usize].loaded = true;
                            reparsed += 1;
                        }
                        Err(e) => failures.push((path, e)),
                    }
                } else {
                    match self.scan_and_insert(&path, &config) {
                        Ok(_) => reparsed += 1,
                        Err(e) => failures.push((path, e)),
                    }
                }
            }
        }

        self.commit();
        self.rebuild_indices(&config);
        Ok((reparsed, failures))
    }

    /// Physically erases songs still marked `not-loaded` after a rescan walk,
    /// and songs tombstoned by `remove`.
    pub fn commit(&mut self) {
        let keep_ids: Vec<SongId> = self
            .songs
            .iter()
            .filter(|s| !s.deleted && s.loaded)
            .map(|s| s.id)
            .collect();
        let keep: std::collections::HashSet<SongId> = keep_ids.into_iter().collect();

        self.songs.retain(|s| keep.contains(&s.id));
        self.by_file_hash = self
            .songs
            .iter()
            .map(|s| (s.file_hash.clone(), s.id))
            .collect();
    }

    fn scan_and_insert(&mut self, path: &Path, config: &crate::config::LibraryConfig) -> Result<bool, MetadataError> {
        let meta = std::fs::metadata(path).map_err(|e| MetadataError::fatal(e.to_string()))?;
        let size = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let hash = crate::hash::file_hash(path);
        if self.by_file_hash.contains_key(&hash) {
            return Ok(false);
        }

        let scan = metadata::scan_file(path)?;
        let folder = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
        let normalized = metadata::normalize(scan.metadata, &folder, config);

        let id = self.songs.len() as SongId;
        let inserted = unix_now();
        let song = Song::new(id, path, scan.stream, normalized, size, mtime, inserted);
        self.by_file_hash.insert(song.file_hash.clone(), id);
        self.songs.push(song);
        Ok(true)
    }

    /// Marks a song deleted; it is physically erased only on [`Self::commit`].
    pub fn remove_by_file_hash(&mut self, hash: &str) {
        if let Some(&id) = self.by_file_hash.get(hash) {
            self.songs[id as usize].deleted = true;
        }
    }

    /// Rebuilds every derived index from the current song set, per spec §4.2.
    pub fn rebuild_indices(&mut self, config: &crate::config::LibraryConfig) {
        self.sort_songs(SortKey::AlbumArtist, config.sort_case_sensitive);
        self.detect_compilations();

        self.albums.clear();
        self.albums_by_sort_key.clear();
        for class in ArtistClass::all_variants() {
            self.artists.get_mut(&class).unwrap().clear();
            self.letters.get_mut(&class).unwrap().clear();
        }

        let mut seen_artists: std::collections::HashSet<(ArtistClass, String)> = std::collections::HashSet::new();

        for song in self.songs.iter().filter(|s| !s.deleted) {
            let album = self
                .albums
                .entry(song.album_hash.clone())
                .or_insert_with(|| Album::new(song.album_hash.clone(), song.album_sort_key.clone(), song.album.clone()));
            if album.songs.is_empty() {
                album.artist = song.artist.clone();
                album.original_artist = song.original_artist.clone();
                album.genre = song.genre.clone();
                album.compilation = song.compilation;
                album.inserted_unix = song.inserted_unix;
                album.date = song.date.clone();
            }
            album.push_song(song.id);
            self.albums_by_sort_key.insert(song.album_sort_key.clone(), song.album_hash.clone());

            let class = ArtistClass::Media(song.media_class);
            for target in [class, ArtistClass::All] {
                let key = (target, song.artist.clone());
                if seen_artists.insert(key) {
                    self.artists
                        .get_mut(&target)
                        .unwrap()
                        .entry(song.artist.clone())
                        .or_default()
                        .push(song.album_hash.clone());

                    let letter = if song.compilation {
                        COMPILATION_LETTER
                    } else if config.allow_deep_name_inspection {
                        deep_inspect_letter(&song.artist)
                    } else {
                        shallow_letter(&song.artist)
                    };
                    *self.letters.get_mut(&target).unwrap().entry(letter).or_insert(0) += 1;
                }
            }
        }

        self.recent_album_hashes = self
            .albums
            .values()
            .filter(|a| a.inserted_unix > 0)
            .map(|a| a.album_hash.clone())
            .collect();
        let albums = &self.albums;
        self.recent_album_hashes.sort_by(|a, b| {
            let aa = &albums[a];
            let bb = &albums[b];
            bb.inserted_unix
                .cmp(&aa.inserted_unix)
                .then_with(|| bb.date.cmp(&aa.date))
        });
    }

    /// Per spec §4.2: walk songs sorted by album; within an album, if the
    /// original artist changes across tracks, mark the album a compilation
    /// and rewrite the displayed artist to the Various-Artists literal,
    /// preserving `original_artist`. Grounded in
    /// `TLibrary::updateVariousArtists()` in `original_source/src/app/library.cpp`.
    fn detect_compilations(&mut self) {
        const VARIOUS_ARTISTS_LITERAL: &str = "Various Artists";
        let mut by_album: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, song) in self.songs.iter().enumerate() {
            if song.deleted {
                continue;
            }
            by_album.entry(song.album_hash.clone()).or_default().push(idx);
        }

        for indices in by_album.values() {
            if indices.len() < 2 {
                continue;
            }
            let first_artist = self.songs[indices[0]].original_artist.clone();
            let differs = indices
                .iter()
                .any(|&i| self.songs[i].original_artist != first_artist);
            if !differs {
                continue;
            }
            for &i in indices {
                let song = &mut self.songs[i];
                if song.original_artist.is_empty() {
                    song.original_artist = song.artist.clone();
                }
                if song.original_album_artist.is_empty() {
                    song.original_album_artist = song.album_artist.clone();
                }
                song.artist = VARIOUS_ARTISTS_LITERAL.to_string();
                song.album_artist = VARIOUS_ARTISTS_LITERAL.to_string();
                song.compilation = true;
            }
        }
    }

    /// Sorts the song arena by the requested key; ties always break by
    /// `(disk, track, insertion index)`, per spec §4.2.
    pub fn sort_songs(&mut self, key: SortKey, case_sensitive: bool) {
        let fold = |s: &str| -> String {
            if case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        self.songs.sort_by(|a, b| {
            let primary = match key {
                SortKey::Time => a.modified_unix.cmp(&b.modified_unix),
                SortKey::Album => natural_order_cmp(&fold(&a.album), &fold(&b.album)),
                SortKey::Artist => natural_order_cmp(&fold(&a.artist), &fold(&b.artist)),
                SortKey::AlbumArtist => natural_order_cmp(&fold(&a.album_artist), &fold(&b.album_artist)),
            };
            primary
                .then_with(|| a.disk_number.cmp(&b.disk_number))
                .then_with(|| a.track_number.cmp(&b.track_number))
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    pub fn save_to_file(&self, path: &Path, config: &crate::config::LibraryConfig, now_unix: u64) -> Result<(), LibraryError> {
        let songs: Vec<&Song> = self.songs.iter().filter(|s| !s.deleted).collect();
        csv_store::save_to_file(path, &songs, config, now_unix)?;
        Ok(())
    }

    pub fn load_from_file(&mut self, path: &Path, config: &crate::config::LibraryConfig) -> Result<usize, LibraryError> {
        let records = csv_store::load_from_file(path, config)?;
        let mut count = 0;
        for record in records {
            if self.by_file_hash.contains_key(&record.file_hash) {
                continue;
            }
            let id = self.songs.len() as SongId;
            let (folder, basename, extension) = song::path_facets(&record.path);
            let song = Song {
                id,
                path: record.path,
                folder,
                basename,
                extension,
                size_bytes: record.size_bytes,
                modified_unix: record.modified_unix,
                inserted_unix: record.inserted_unix,
                file_hash: record.file_hash,
                codec: record.codec,
                channels: record.channels,
                sample_rate: record.sample_rate,
                bits_per_sample: record.bits_per_sample,
                bytes_per_sample: record.bytes_per_sample,
                sample_count: record.sample_count,
                byte_size: 0,
                bit_rate: record.bit_rate,
                chunk_size: record.chunk_size,
                duration_ms: record.duration_ms,
                duration_s: record.duration_ms / 1000,
                artist: record.artist,
                album_artist: record.album_artist,
                original_artist: record.original_artist,
                original_album_artist: record.original_album_artist,
                album: record.album,
                title: record.title,
                genre: record.genre,
                composer: record.composer,
                conductor: record.conductor,
                year: record.year,
                date: record.date,
                track_number: record.track_number,
                track_count: record.track_count,
                disk_number: record.disk_number,
                disk_count: record.disk_count,
                compilation: false,
                artist_sort: String::new(),
                album_artist_sort: String::new(),
                album_sort_key: crate::hash::album_sort_key(&record.album, &record.album_artist),
                artist_sort_hash: 0,
                album_artist_sort_hash: 0,
                album_sort_key_hash: 0,
                year_sort: record.year,
                media_class: MediaClass::derive(record.sample_rate, record.bits_per_sample),
                title_hash: record.title_hash,
                album_hash: record.album_hash,
                deleted: false,
                loaded: true,
                bytes_read: 0,
                bytes_written: 0,
                percent_played: 0.0,
                played_seconds: 0,
            };
            self.by_file_hash.insert(song.file_hash.clone(), id);
            self.songs.push(song);
            count += 1;
        }
        self.rebuild_indices(config);
        Ok(count)
    }

    /// Optional debug dump of the rebuilt artist/album indices, gated behind
    /// the `debug` config flag (see SPEC_FULL.md §E).
    pub fn dump_debug_maps(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut artist_dump = String::new();
        for (class, map) in &self.artists {
            for (artist, albums) in map {
                artist_dump.push_str(&format!("{class:?};{artist};{}\n", albums.len()));
            }
        }
        std::fs::write(dir.join("artist_map.debug.txt"), artist_dump)?;

        let mut album_dump = String::new();
        for album in self.albums.values() {
            album_dump.push_str(&format!("{};{};{}\n", album.album_hash, album.display_title, album.track_count));
        }
        std::fs::write(dir.join("album_map.debug.txt"), album_dump)?;
        Ok(())
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

fn shallow_letter(name: &str) -> char {
    let trimmed = name.trim();
    let rest = if trimmed.len() > 4 && trimmed[..4].eq_ignore_ascii_case("the ") {
        &trimmed[4..]
    } else {
        trimmed
    };
    first_letter_class(rest)
}

fn first_letter_class(s: &str) -> char {
    match s.trim().chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
        Some(_) => NON_ALNUM_LETTER,
        None => NON_ALNUM_LETTER,
    }
}

/// Deep name inspection (spec §3 GLOSSARY "Letter map"; §9 Open Question):
/// walks word boundaries looking for the first word at least
/// [`MIN_DEEP_WORD_LEN`] characters long, skipping a leading stopword. ASCII
/// fast path only: a word containing a byte > 0x7F is skipped entirely, per
/// the resolution recorded in SPEC_FULL.md §F.1.
fn deep_inspect_letter(name: &str) -> char {
    let words: Vec<&str> = name.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        if word.bytes().any(|b| b > 0x7F) {
            continue;
        }
        let is_stopword = i == 0 && DEEP_STOPWORDS.contains(&word.to_lowercase().as_str());
        if is_stopword {
            continue;
        }
        if word.len() >= MIN_DEEP_WORD_LEN || i == 0 {
            return first_letter_class(word);
        }
    }
    first_letter_class(name)
}

/// Compares two strings treating embedded digit runs as numbers, so
/// `"Track 9"` sorts before `"Track 10"`.
pub fn natural_order_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(ac), Some(bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let mut an = String::new();
                    let mut bn = String::new();
                    while let Some(c) = ai.peek() {
                        if c.is_ascii_digit() {
                            an.push(*c);
                            ai.next();
                        } else {
                            break;
                        }
                    }
                    while let Some(c) = bi.peek() {
                        if c.is_ascii_digit() {
                            bn.push(*c);
                            bi.next();
                        } else {
                            break;
                        }
                    }
                    let an_val: u64 = an.parse().unwrap_or(0);
                    let bn_val: u64 = bn.parse().unwrap_or(0);
                    match an_val.cmp(&bn_val) {
                        std::cmp::Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    match ac.cmp(bc) {
                        std::cmp::Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_orders_numeric_runs_numerically() {
        assert_eq!(natural_order_cmp("Track 9", "Track 10"), std::cmp::Ordering::Less);
        assert_eq!(natural_order_cmp("Track 10", "Track 9"), std::cmp::Ordering::Greater);
        assert_eq!(natural_order_cmp("abc", "abc"), std::cmp::Ordering::Equal);
    }

    #[test]
    fn shallow_letter_strips_leading_the() {
        assert_eq!(shallow_letter("The Motors"), 'M');
        assert_eq!(shallow_letter("ABBA"), 'A');
        assert_eq!(shallow_letter("123 Band"), NON_ALNUM_LETTER);
    }

    #[test]
    fn deep_inspect_skips_short_leading_stopword() {
        assert_eq!(deep_inspect_letter("The Motors"), 'M');
        assert_eq!(deep_inspect_letter("El Train"), 'T');
    }

    #[test]
    fn empty_library_has_zero_counts() {
        let lib = Library::new();
        assert_eq!(lib.song_count(), 0);
        assert_eq!(lib.album_count(), 0);
        assert_eq!(lib.artist_count(ArtistClass::All), 0);
    }
}
