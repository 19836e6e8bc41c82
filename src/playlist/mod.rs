//! Playlist Set (spec §4.3): a collection of uniquely-named playlists, with
//! at most one selected for editing and at most one playing at a time.

pub mod persistence;
pub mod track;

use std::collections::HashMap;
use std::path::Path;

pub use persistence::PlaylistError;
pub use track::{PlaybackOrder, Playlist, RepeatMode, Track};

use crate::config::PlaylistConfig;

/// Owns every playlist, keyed by name.
pub struct Playlists {
    playlists: HashMap<String, Playlist>,
    order: Vec<String>,
    selected: Option<String>,
    playing: Option<String>,
    recent_name: String,
}

impl Playlists {
    pub fn new(config: &PlaylistConfig) -> Self {
        let mut playlists = Playlists {
            playlists: HashMap::new(),
            order: Vec::new(),
            selected: None,
            playing: None,
            recent_name: config.recent_playlist_name.clone(),
        };
        playlists.create(&config.recent_playlist_name);
        playlists.selected = Some(config.recent_playlist_name.clone());
        playlists
    }

    /// Creates a new, empty playlist. Returns `false` if `name` is already
    /// taken (names are unique, spec §4.3).
    pub fn create(&mut self, name: &str) -> bool {
        if self.playlists.contains_key(name) {
            return false;
        }
        self.playlists.insert(name.to_string(), Playlist::new(name));
        self.order.push(name.to_string());
        true
    }

    /// Deletes a playlist. The reserved recent-playlist name cannot be
    /// removed outright; deleting it only clears its items (spec §3).
    pub fn delete(&mut self, name: &str) -> bool {
        if name == self.recent_name {
            self.recent_mut().clear();
            return true;
        }
        if self.playlists.remove(name).is_none() {
            return false;
        }
        self.order.retain(|n| n != name);
        if self.selected.as_deref() == Some(name) {
            self.selected = self.order.first().cloned();
        }
        if self.playing.as_deref() == Some(name) {
            self.playing = None;
        }
        true
    }

    /// Renames a playlist, writing the new file to `dir` and deleting the
    /// old one only after the new file exists on disk (spec §4.3).
    pub fn rename(&mut self, old_name: &str, new_name: &str, dir: &Path) -> Result<bool, PlaylistError> {
        if old_name == self.recent_name || self.playlists.contains_key(new_name) {
            return Ok(false);
        }
        let Some(mut playlist) = self.playlists.remove(old_name) else {
            return Ok(false);
        };
        playlist.name = new_name.to_string();

        let old_path = dir.join(format!("{}.txt", sanitize_filename(old_name)));
        let new_path = dir.join(format!("{}.txt", sanitize_filename(new_name)));
        std::fs::create_dir_all(dir)?;
        persistence::save_to_file(&new_path, &playlist)?;
        if old_path != new_path && old_path.exists() {
            std::fs::remove_file(&old_path)?;
        }

        self.playlists.insert(new_name.to_string(), playlist);
        for entry in self.order.iter_mut() {
            if entry == old_name {
                *entry = new_name.to_string();
            }
        }
        if self.selected.as_deref() == Some(old_name) {
            self.selected = Some(new_name.to_string());
        }
        if self.playing.as_deref() == Some(old_name) {
            self.playing = Some(new_name.to_string());
        }
        Ok(true)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Playlist> {
        self.playlists.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Playlist> {
        self.playlists.get_mut(name)
    }

    pub fn recent(&self) -> &Playlist {
        self.playlists.get(&self.recent_name).expect("recent playlist always exists")
    }

    pub fn recent_mut(&mut self) -> &mut Playlist {
        self.playlists.get_mut(&self.recent_name).expect("recent playlist always exists")
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Marks `name` as selected for editing; has no effect if `name` doesn't exist.
    pub fn select(&mut self, name: &str) -> bool {
        if !self.playlists.contains_key(name) {
            return false;
        }
        self.selected = Some(name.to_string());
        true
    }

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    /// Marks `name` as the sole playing playlist, clearing any previous one
    /// (spec §4.3 invariant: at most one playlist is playing at a time).
    pub fn set_playing(&mut self, name: Option<&str>) -> bool {
        match name {
            Some(n) if !self.playlists.contains_key(n) => false,
            other => {
                self.playing = other.map(str::to_string);
                true
            }
        }
    }

    pub fn save_to_dir(&self, dir: &Path) -> Result<(), PlaylistError> {
        std::fs::create_dir_all(dir)?;
        for name in &self.order {
            let playlist = &self.playlists[name];
            let path = dir.join(format!("{}.txt", sanitize_filename(name)));
            persistence::save_to_file(&path, playlist)?;
        }
        Ok(())
    }

    pub fn load_from_dir(&mut self, dir: &Path) -> Result<usize, PlaylistError> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let playlist = persistence::load_from_file(&path)?;
            let name = playlist.name.clone();
            if !self.playlists.contains_key(&name) {
                self.order.push(name.clone());
            }
            self.playlists.insert(name, playlist);
            loaded += 1;
        }
        Ok(loaded)
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PlaylistConfig {
        PlaylistConfig {
            recent_playlist_name: "state".to_string(),
            max_playlist_size: 50_000,
        }
    }

    #[test]
    fn deleting_recent_playlist_clears_items_instead_of_removing_it() {
        let mut playlists = Playlists::new(&config());
        playlists.recent_mut().add_track(
            track::Track::new("a".to_string(), std::path::PathBuf::from("/music/a.flac"), "alb".to_string(), 0),
            10,
        );
        assert!(playlists.delete("state"));
        assert!(playlists.get("state").is_some());
        assert!(playlists.recent().is_empty());
    }

    #[test]
    fn rename_writes_new_file_and_removes_old() {
        let dir = tempfile::tempdir().unwrap();
        let mut playlists = Playlists::new(&config());
        playlists.create("Favorites");
        playlists.save_to_dir(dir.path()).unwrap();
        assert!(dir.path().join("Favorites.txt").exists());

        assert!(playlists.rename("Favorites", "Loved", dir.path()).unwrap());
        assert!(dir.path().join("Loved.txt").exists());
        assert!(!dir.path().join("Favorites.txt").exists());
        assert!(playlists.get("Loved").is_some());
        assert!(playlists.get("Favorites").is_none());
    }

    #[test]
    fn create_rejects_duplicate_names() {
        let mut playlists = Playlists::new(&config());
        assert!(playlists.create("Favorites"));
        assert!(!playlists.create("Favorites"));
    }

    #[test]
    fn only_one_playlist_can_be_playing() {
        let mut playlists = Playlists::new(&config());
        playlists.create("A");
        playlists.create("B");
        playlists.set_playing(Some("A"));
        assert_eq!(playlists.playing(), Some("A"));
        playlists.set_playing(Some("B"));
        assert_eq!(playlists.playing(), Some("B"));
    }

    #[test]
    fn deleting_selected_playlist_falls_back_to_first_remaining() {
        let mut playlists = Playlists::new(&config());
        playlists.create("A");
        playlists.select("A");
        playlists.delete("A");
        assert_eq!(playlists.selected(), Some("state"));
    }
}
