//! `Album` aggregate, grouping songs by `album_hash` (spec §3).

use super::song::SongId;

/// Aggregates songs sharing `album_hash`.
#[derive(Debug, Clone)]
pub struct Album {
    pub album_hash: String,
    pub album_sort_key: String,
    pub artist: String,
    pub original_artist: String,
    pub genre: String,
    pub compilation: bool,
    pub inserted_unix: u64,
    pub date: String,
    pub display_title: String,
    pub track_count: usize,
    /// Member songs, in insertion order.
    pub songs: Vec<SongId>,
}

impl Album {
    pub fn new(album_hash: String, album_sort_key: String, display_title: String) -> Self {
        Album {
            album_hash,
            album_sort_key,
            artist: String::new(),
            original_artist: String::new(),
            genre: String::new(),
            compilation: false,
            inserted_unix: 0,
            date: String::new(),
            display_title,
            track_count: 0,
            songs: Vec::new(),
        }
    }

    pub fn push_song(&mut self, id: SongId) {
        self.songs.push(id);
        self.track_count = self.songs.len();
    }
}
