//! Playlist text-file persistence: one track per line as
//! `index:file_hash:path:mtime`, with an optional leading `Name:<display
//! name>` header line (spec §4.3, §6).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::track::{Playlist, Track};

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed playlist line: {0}")]
    Malformed(String),
}

/// Writes `playlist` to `path` as delimited text, one track per line.
pub fn save_to_file(path: &Path, playlist: &Playlist) -> Result<(), PlaylistError> {
    let mut body = format!("Name:{}\n", playlist.name);
    for track in playlist.tracks() {
        body.push_str(&format!(
            "{}:{}:{}:{}\n",
            track.index,
            track.file_hash,
            track.path.to_string_lossy(),
            track.modified_unix
        ));
    }
    fs::write(path, body)?;
    Ok(())
}

/// Parses a previously-saved playlist file, resolving tracks by
/// `file_hash`/`path`/`mtime` without a library lookup (the library fills in
/// `album_hash` lazily the next time the track is actually played).
pub fn load_from_file(path: &Path) -> Result<Playlist, PlaylistError> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines();

    let name = match lines.clone().next() {
        Some(first) if first.starts_with("Name:") => {
            lines.next();
            first.trim_start_matches("Name:").to_string()
        }
        _ => path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "playlist".to_string()),
    };

    let mut playlist = Playlist::new(name);
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(PlaylistError::Malformed(line.to_string()));
        }
        let stored_index: usize = parts[0].parse().unwrap_or(0);
        let file_hash = parts[1].to_string();
        let path = PathBuf::from(parts[2]);
        let modified_unix: u64 = parts[3].parse().unwrap_or(0);
        playlist.add_track(Track::new(file_hash, path, String::new(), modified_unix), usize::MAX);
        let last_pos = playlist.len() - 1;
        playlist.set_track_index(last_pos, stored_index);
    }
    Ok(playlist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.txt");

        let mut playlist = Playlist::new("Favorites");
        playlist.add_track(
            Track::new("abc123".to_string(), PathBuf::from("/music/song.flac"), "deadbeef".to_string(), 1_700_000_000),
            10,
        );

        save_to_file(&path, &playlist).unwrap();
        let loaded = load_from_file(&path).unwrap();

        assert_eq!(loaded.name, "Favorites");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.tracks()[0].file_hash, "abc123");
        assert_eq!(loaded.tracks()[0].modified_unix, 1_700_000_000);
    }

    #[test]
    fn load_rejects_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "Name:Bad\nnot-enough-fields\n").unwrap();
        assert!(load_from_file(&path).is_err());
    }
}
