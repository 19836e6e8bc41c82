//! `Track` and `Playlist`: an ordered, shuffleable track list bound to
//! library songs by `file_hash` (spec §3, §4.3).
//!
//! Shuffle/random ordering is grounded in `Playlist::generate_shuffle_order`
//! and `get_next_track_index`/`get_previous_track_index` in the teacher's
//! `playlist.rs`, generalized from a UI-facing single playlist to the
//! library-backed, multi-playlist model spec §4.3 describes.

use std::path::PathBuf;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::library::Library;

/// One entry in a playlist: a reference to a library song plus the facts
/// needed to resolve it even if the library hasn't loaded yet.
///
/// `deleted`/`removed`/`deferred` implement the tombstone model spec §4.3
/// and §9 require: a track currently referenced by a live playback engine
/// is never erased outright, only marked. `randomized` tracks whether this
/// entry has been consumed by the current shuffle pass (spec §4.3
/// `songs_to_shuffle_left`). `index` mirrors this track's position in its
/// owning playlist, kept current by `Playlist::reindex`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub file_hash: String,
    pub path: PathBuf,
    pub album_hash: String,
    pub modified_unix: u64,
    pub deleted: bool,
    pub removed: bool,
    pub deferred: bool,
    pub randomized: bool,
    pub index: usize,
}

impl Track {
    pub fn new(file_hash: String, path: PathBuf, album_hash: String, modified_unix: u64) -> Self {
        Track {
            file_hash,
            path,
            album_hash,
            modified_unix,
            deleted: false,
            removed: false,
            deferred: false,
            randomized: false,
            index: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOrder {
    Default,
    Shuffle,
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    Off,
    On,
}

/// An ordered, named collection of [`Track`]s.
pub struct Playlist {
    pub name: String,
    tracks: Vec<Track>,
    /// Tombstoned entries awaiting collection once no longer referenced by
    /// a live playback engine (spec §4.3, §5).
    garbage: Vec<Track>,
    playing_index: Option<usize>,
    playback_order: PlaybackOrder,
    repeat_mode: RepeatMode,
    shuffled_indices: Vec<usize>,
    rng_seed: [u8; 32],
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("failed to generate random seed");
        Playlist {
            name: name.into(),
            tracks: Vec::new(),
            garbage: Vec::new(),
            playing_index: None,
            playback_order: PlaybackOrder::Default,
            repeat_mode: RepeatMode::Off,
            shuffled_indices: Vec::new(),
            rng_seed: seed,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn playing_index(&self) -> Option<usize> {
        self.playing_index
    }

    pub fn set_playing_index(&mut self, index: Option<usize>) {
        self.playing_index = index;
    }

    /// Clears every track and pending garbage entry, leaving the playlist
    /// name and settings intact. Used by `Playlists::delete` to empty the
    /// reserved recent playlist instead of removing it (spec §3).
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.garbage.clear();
        self.playing_index = None;
        self.shuffled_indices.clear();
    }

    /// Entries tombstoned by a removal but not yet collected because they
    /// may still be referenced by a live playback engine.
    pub fn garbage(&self) -> &[Track] {
        &self.garbage
    }

    pub fn garbage_len(&self) -> usize {
        self.garbage.len()
    }

    /// Drops garbage entries for which `is_referenced` returns `false`,
    /// i.e. the engine is no longer playing them (spec §4.3, §5).
    pub fn collect_garbage(&mut self, is_referenced: impl Fn(&Track) -> bool) {
        self.garbage.retain(is_referenced);
    }

    /// Overrides the `index` field of the track at `position`, used when
    /// restoring a playlist from disk where the stored index may not match
    /// line order (spec §4.3, §6).
    pub fn set_track_index(&mut self, position: usize, index: usize) {
        if let Some(track) = self.tracks.get_mut(position) {
            track.index = index;
        }
    }

    /// Refreshes `index` on every track to match its current position.
    fn reindex(&mut self) {
        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.index = i;
        }
    }

    /// Adds a track directly, capped by `max_size` (spec §4.3 /
    /// `PlaylistConfig::max_playlist_size`); returns whether it was added.
    pub fn add_track(&mut self, mut track: Track, max_size: usize) -> bool {
        if self.tracks.len() >= max_size {
            return false;
        }
        track.index = self.tracks.len();
        self.tracks.push(track);
        if self.playback_order == PlaybackOrder::Shuffle {
            self.generate_shuffle_order(self.playing_index);
        }
        true
    }

    /// Resolves `file_path` against the library and appends it as a track.
    pub fn add_file(&mut self, library: &Library, file_path: &PathBuf, max_size: usize) -> bool {
        let hash = crate::hash::file_hash(file_path);
        match library.find_by_file_hash(&hash) {
            Some(song) => self.add_track(
                Track::new(song.file_hash.clone(), song.path.clone(), song.album_hash.clone(), song.modified_unix),
                max_size,
            ),
            None => false,
        }
    }

    /// Appends a track already known by `file_hash` without a library lookup.
    pub fn add_by_hash(&mut self, library: &Library, file_hash: &str, max_size: usize) -> bool {
        match library.find_by_file_hash(file_hash) {
            Some(song) => self.add_track(
                Track::new(song.file_hash.clone(), song.path.clone(), song.album_hash.clone(), song.modified_unix),
                max_size,
            ),
            None => false,
        }
    }

    /// Appends every song sharing `album_hash`, in the library's current order.
    pub fn add_album(&mut self, library: &Library, album_hash: &str, max_size: usize) -> usize {
        let mut added = 0;
        if let Some(album) = library.find_by_album_hash(album_hash) {
            for &song_id in &album.songs.clone() {
                if let Some(song) = library.song_by_id(song_id) {
                    let added_now = self.add_track(
                        Track::new(song.file_hash.clone(), song.path.clone(), song.album_hash.clone(), song.modified_unix),
                        max_size,
                    );
                    if added_now {
                        added += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        added
    }

    /// Tombstones the track at `index`: it is removed from the active list
    /// but kept in `garbage` (marked `deleted`/`removed`, and `deferred` if
    /// it was the track currently playing) until the engine confirms it is
    /// no longer referenced (spec §4.3, §9 "Reference counting on shared
    /// buffers").
    pub fn remove_track(&mut self, index: usize) {
        if index >= self.tracks.len() {
            return;
        }
        let mut removed = self.tracks.remove(index);
        removed.deleted = true;
        removed.removed = true;
        if self.playing_index == Some(index) {
            removed.deferred = true;
        }
        self.garbage.push(removed);

        if let Some(playing) = self.playing_index {
            if playing == index {
                self.playing_index = None;
            } else if playing > index {
                self.playing_index = Some(playing - 1);
            }
        }
        self.shuffled_indices.retain(|&i| i != index);
        for i in self.shuffled_indices.iter_mut() {
            if *i > index {
                *i -= 1;
            }
        }
        self.reindex();
    }

    pub fn remove_file(&mut self, file_hash: &str) {
        if let Some(index) = self.tracks.iter().position(|t| t.file_hash == file_hash) {
            self.remove_track(index);
        }
    }

    pub fn remove_album(&mut self, album_hash: &str) {
        loop {
            let Some(index) = self.tracks.iter().position(|t| t.album_hash == album_hash) else {
                break;
            };
            self.remove_track(index);
        }
    }

    /// Trims the playlist to `max_size` by repeatedly finding the track
    /// with the oldest `modified_unix` and removing its whole album, per
    /// spec §4.3 (not a front-trim: albums are removed as a unit, ordered
    /// by the age of their oldest member).
    pub fn delete_oldest(&mut self, max_size: usize) {
        while self.tracks.len() > max_size {
            let Some(oldest) = self.tracks.iter().min_by_key(|t| t.modified_unix) else {
                break;
            };
            let album_hash = oldest.album_hash.clone();
            self.remove_album(&album_hash);
        }
    }

    /// Reorders tracks according to `table`, where `table[new_index]` is the
    /// old index that should occupy `new_index`. `table` must be a
    /// permutation of `0..len()`.
    pub fn reorder(&mut self, table: &[usize]) {
        if table.len() != self.tracks.len() {
            return;
        }
        let reordered: Vec<Track> = table.iter().map(|&old| self.tracks[old].clone()).collect();
        let mut old_to_new = vec![0usize; table.len()];
        for (new_pos, &old_pos) in table.iter().enumerate() {
            old_to_new[old_pos] = new_pos;
        }
        self.tracks = reordered;
        if let Some(playing) = self.playing_index {
            self.playing_index = old_to_new.get(playing).copied();
        }
        for i in self.shuffled_indices.iter_mut() {
            if let Some(&mapped) = old_to_new.get(*i) {
                *i = mapped;
            }
        }
        self.reindex();
    }

    /// Moves every track whose album matches `album_hash` to just after the
    /// currently playing track, preserving their relative order.
    pub fn touch_album(&mut self, album_hash: &str) {
        let current = self.playing_index.unwrap_or(0);
        let (matching, rest): (Vec<Track>, Vec<Track>) =
            self.tracks.drain(..).partition(|t| t.album_hash == album_hash);
        let insert_at = current.min(rest.len());
        let mut result = rest;
        for (i, track) in matching.into_iter().enumerate() {
            result.insert((insert_at + i).min(result.len()), track);
        }
        self.tracks = result;
        self.shuffled_indices.clear();
        self.reindex();
    }

    /// Reattaches each track's mutable facts (`path`, `album_hash`,
    /// `modified_unix`) from the current library state, marking any track
    /// whose song has disappeared from the library as `deleted` rather than
    /// dropping it outright (spec §4.3).
    pub fn rebuild(&mut self, library: &Library) {
        for track in self.tracks.iter_mut() {
            match library.find_by_file_hash(&track.file_hash) {
                Some(song) => {
                    track.path = song.path.clone();
                    track.album_hash = song.album_hash.clone();
                    track.modified_unix = song.modified_unix;
                }
                None => {
                    track.deleted = true;
                }
            }
        }
        self.shuffled_indices.clear();
    }

    pub fn set_playback_order(&mut self, order: PlaybackOrder) {
        if self.playback_order != order {
            self.playback_order = order;
            if order == PlaybackOrder::Shuffle {
                self.generate_shuffle_order(self.playing_index);
            }
        }
    }

    pub fn playback_order(&self) -> PlaybackOrder {
        self.playback_order
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Returns the next track index per the active [`PlaybackOrder`], per
    /// spec §4.5's "Next" control command.
    pub fn next_song(&mut self, current_index: usize) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        match self.playback_order {
            PlaybackOrder::Default => {
                let next = current_index + 1;
                if next < self.tracks.len() {
                    Some(next)
                } else if self.repeat_mode == RepeatMode::On {
                    Some(0)
                } else {
                    None
                }
            }
            PlaybackOrder::Shuffle => {
                if self.shuffled_indices.is_empty() {
                    self.generate_shuffle_order(Some(current_index));
                }
                let next = match self.shuffled_indices.iter().position(|&i| i == current_index) {
                    Some(pos) if pos + 1 < self.shuffled_indices.len() => Some(self.shuffled_indices[pos + 1]),
                    Some(_) if self.repeat_mode == RepeatMode::On => self.shuffled_indices.first().copied(),
                    Some(_) => None,
                    None => {
                        self.generate_shuffle_order(Some(current_index));
                        return self.next_song(current_index);
                    }
                };
                self.mark_shuffled(next);
                next
            }
            PlaybackOrder::Random => self.random_index_excluding(current_index),
        }
    }

    pub fn previous_song(&mut self, current_index: usize) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        match self.playback_order {
            PlaybackOrder::Default => {
                if current_index > 0 {
                    Some(current_index - 1)
                } else if self.repeat_mode == RepeatMode::On {
                    Some(self.tracks.len() - 1)
                } else {
                    None
                }
            }
            PlaybackOrder::Shuffle => {
                if self.shuffled_indices.is_empty() {
                    self.generate_shuffle_order(Some(current_index));
                }
                let prev = match self.shuffled_indices.iter().position(|&i| i == current_index) {
                    Some(pos) if pos > 0 => Some(self.shuffled_indices[pos - 1]),
                    Some(_) if self.repeat_mode == RepeatMode::On => self.shuffled_indices.last().copied(),
                    Some(_) => None,
                    None => {
                        self.generate_shuffle_order(Some(current_index));
                        return self.previous_song(current_index);
                    }
                };
                self.mark_shuffled(prev);
                prev
            }
            PlaybackOrder::Random => self.random_index_excluding(current_index),
        }
    }

    /// Marks `index` as consumed by the current shuffle pass; once every
    /// track has been consumed, resets the flags and draws a fresh order
    /// (spec §4.3 `songs_to_shuffle_left`).
    fn mark_shuffled(&mut self, index: Option<usize>) {
        let Some(index) = index else { return };
        if let Some(track) = self.tracks.get_mut(index) {
            track.randomized = true;
        }
        if self.songs_to_shuffle_left() == 0 {
            for track in self.tracks.iter_mut() {
                track.randomized = false;
            }
            self.generate_shuffle_order(Some(index));
        }
    }

    fn random_index_excluding(&mut self, current_index: usize) -> Option<usize> {
        match self.tracks.len() {
            0 => None,
            1 => {
                if self.repeat_mode == RepeatMode::On {
                    Some(0)
                } else {
                    None
                }
            }
            n => {
                let mut rng = StdRng::from_seed(self.rng_seed);
                let mut next_index = rng.random_range(0..n);
                while next_index == current_index {
                    next_index = rng.random_range(0..n);
                }
                for byte in self.rng_seed.iter_mut() {
                    *byte = byte.wrapping_add(1);
                }
                Some(next_index)
            }
        }
    }

    /// Counts tracks not yet consumed by the current shuffle pass (spec
    /// §4.3): when this reaches zero, the shuffle policy resets every
    /// track's `randomized` flag and draws a new order for the set.
    pub fn songs_to_shuffle_left(&self) -> usize {
        self.tracks.iter().filter(|t| !t.randomized).count()
    }

    fn generate_shuffle_order(&mut self, keep_first: Option<usize>) {
        let count = self.tracks.len();
        if count == 0 {
            self.shuffled_indices.clear();
            return;
        }
        let mut indices: Vec<usize> = (0..count).collect();
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("failed to generate random seed");
        self.rng_seed = seed;
        let mut rng = StdRng::from_seed(self.rng_seed);
        for i in (1..count).rev() {
            let j = rng.random_range(0..=i);
            indices.swap(i, j);
        }
        if let Some(first) = keep_first {
            if let Some(pos) = indices.iter().position(|&i| i == first) {
                indices.remove(pos);
                indices.insert(0, first);
            }
        }
        debug!("Playlist '{}': new shuffle order: {:?}", self.name, indices);
        self.shuffled_indices = indices;
    }

    /// Serializes the playlist as a JSON array of `{index,file_hash,path}`
    /// objects, honoring `offset`/`limit` for paged UI requests.
    pub fn as_json(&self, offset: usize, limit: usize) -> String {
        let entries: Vec<serde_json::Value> = self
            .tracks
            .iter()
            .skip(offset)
            .take(limit)
            .map(|track| {
                serde_json::json!({
                    "index": track.index,
                    "file_hash": track.file_hash,
                    "path": track.path.to_string_lossy(),
                })
            })
            .collect();
        serde_json::Value::Array(entries).to_string()
    }

    /// Serializes the playlist as an extended M3U file.
    pub fn as_m3u(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        for track in &self.tracks {
            out.push_str(&track.path.to_string_lossy());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(hash: &str, album: &str) -> Track {
        Track::new(hash.to_string(), PathBuf::from(format!("/music/{hash}.flac")), album.to_string(), 0)
    }

    fn track_with_mtime(hash: &str, album: &str, modified_unix: u64) -> Track {
        Track::new(hash.to_string(), PathBuf::from(format!("/music/{hash}.flac")), album.to_string(), modified_unix)
    }

    #[test]
    fn reorder_maps_playing_index_through_permutation() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb1"), 10);
        pl.add_track(track("c", "alb2"), 10);
        pl.set_playing_index(Some(1));

        pl.reorder(&[2, 0, 1]);
        assert_eq!(pl.tracks()[0].file_hash, "c");
        assert_eq!(pl.tracks()[1].file_hash, "a");
        assert_eq!(pl.tracks()[2].file_hash, "b");
        assert_eq!(pl.playing_index(), Some(2));
        assert_eq!(pl.tracks()[0].index, 0);
        assert_eq!(pl.tracks()[2].index, 2);
    }

    #[test]
    fn default_order_next_song_wraps_only_with_repeat_on() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb1"), 10);

        assert_eq!(pl.next_song(0), Some(1));
        assert_eq!(pl.next_song(1), None);

        pl.set_repeat_mode(RepeatMode::On);
        assert_eq!(pl.next_song(1), Some(0));
    }

    #[test]
    fn delete_oldest_removes_whole_album_by_mod_time() {
        let mut pl = Playlist::new("test");
        pl.add_track(track_with_mtime("a", "alb-old", 100), 10);
        pl.add_track(track_with_mtime("b", "alb-old", 200), 10);
        pl.add_track(track_with_mtime("c", "alb-new", 300), 10);

        pl.delete_oldest(1);
        assert_eq!(pl.len(), 1);
        assert_eq!(pl.tracks()[0].file_hash, "c");
        assert_eq!(pl.garbage_len(), 2);
    }

    #[test]
    fn remove_track_tombstones_into_garbage() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb1"), 10);
        pl.set_playing_index(Some(0));

        pl.remove_track(0);
        assert_eq!(pl.len(), 1);
        assert_eq!(pl.garbage_len(), 1);
        let garbage = &pl.garbage()[0];
        assert!(garbage.deleted);
        assert!(garbage.removed);
        assert!(garbage.deferred);
        assert_eq!(pl.playing_index(), None);
    }

    #[test]
    fn collect_garbage_drops_unreferenced_entries() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.remove_track(0);
        assert_eq!(pl.garbage_len(), 1);
        pl.collect_garbage(|t| t.file_hash == "not-a");
        assert_eq!(pl.garbage_len(), 0);
    }

    #[test]
    fn remove_album_drops_every_matching_track() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb2"), 10);
        pl.add_track(track("c", "alb1"), 10);
        pl.remove_album("alb1");
        assert_eq!(pl.len(), 1);
        assert_eq!(pl.tracks()[0].file_hash, "b");
    }

    #[test]
    fn songs_to_shuffle_left_counts_unconsumed_tracks() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb1"), 10);
        pl.set_playback_order(PlaybackOrder::Shuffle);
        assert_eq!(pl.songs_to_shuffle_left(), 2);
    }

    #[test]
    fn clear_empties_tracks_and_garbage() {
        let mut pl = Playlist::new("recent");
        pl.add_track(track("a", "alb1"), 10);
        pl.remove_track(0);
        pl.add_track(track("b", "alb1"), 10);
        pl.clear();
        assert!(pl.is_empty());
        assert_eq!(pl.garbage_len(), 0);
        assert_eq!(pl.playing_index(), None);
    }

    #[test]
    fn as_json_respects_limit_and_offset() {
        let mut pl = Playlist::new("test");
        for i in 0..5 {
            pl.add_track(track(&i.to_string(), "alb"), 10);
        }
        let parsed: serde_json::Value = serde_json::from_str(&pl.as_json(1, 2)).unwrap();
        let entries = parsed.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["file_hash"], "1");
        assert_eq!(entries[1]["file_hash"], "2");
    }

    #[test]
    fn as_json_limit_larger_than_remaining_returns_remainder() {
        let mut pl = Playlist::new("test");
        for i in 0..3 {
            pl.add_track(track(&i.to_string(), "alb"), 10);
        }
        let parsed: serde_json::Value = serde_json::from_str(&pl.as_json(0, 100)).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[test]
    fn as_m3u_lists_every_track_path() {
        let mut pl = Playlist::new("test");
        pl.add_track(track("a", "alb1"), 10);
        pl.add_track(track("b", "alb1"), 10);
        let m3u = pl.as_m3u();
        assert!(m3u.starts_with("#EXTM3U"));
        assert!(m3u.contains("/music/a.flac"));
        assert!(m3u.contains("/music/b.flac"));
    }
}
