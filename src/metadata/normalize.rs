//! Tag normalization pipeline applied by the scanner after a raw parse,
//! per spec §4.1 items 1-8.

use crate::config::LibraryConfig;
use crate::hash::{album_sort_key, html_escape};

use super::MetadataDescriptor;

const VARIOUS_ARTISTS_LITERAL: &str = "Various Artists";
const VARIOUS_PATH_MARKERS: [&str; 5] = ["sampler", "various", "soundtrack", "compilation", "divers"];

/// Applies the §4.1 normalization rules to a freshly parsed metadata
/// descriptor. Idempotent: calling this twice on an already-normalized
/// descriptor with the same config produces the same result.
pub fn normalize(mut metadata: MetadataDescriptor, folder_path: &str, config: &LibraryConfig) -> MetadataDescriptor {
    // 1. artist falls back to album-artist.
    if metadata.artist.is_empty() && !metadata.album_artist.is_empty() {
        metadata.artist = metadata.album_artist.clone();
    }

    // 2. full-name swap: "First Last" <-> "Last, First".
    if config.allow_full_name_swap {
        metadata.artist = swap_full_name(&metadata.artist);
        metadata.album_artist = swap_full_name(&metadata.album_artist);
    }

    // 3. "The Band" prefix swap: "The Motors" -> "Motors, The".
    if config.allow_the_band_prefix_swap {
        metadata.artist = swap_the_prefix(&metadata.artist);
        metadata.album_artist = swap_the_prefix(&metadata.album_artist);
    }

    // 4. move-preamble: "[Live] Wish You Were Here" -> "Wish You Were Here [Live]".
    if config.allow_move_preamble {
        metadata.album = move_preamble(&metadata.album);
    }

    // 5. various-artists rename.
    if config.allow_various_artists_rename
        && (metadata.compilation || path_suggests_various(folder_path))
    {
        metadata.original_artist = metadata.artist.clone();
        metadata.original_album_artist = metadata.album_artist.clone();
        metadata.artist = VARIOUS_ARTISTS_LITERAL.to_string();
        metadata.album_artist = VARIOUS_ARTISTS_LITERAL.to_string();
        metadata.compilation = true;
    } else if metadata.original_artist.is_empty() {
        metadata.original_artist = metadata.artist.clone();
        metadata.original_album_artist = metadata.album_artist.clone();
    }

    // 6. album-sort key is derived on demand via `hash::album_sort_key`, not
    // stored on the descriptor itself (see `library::song::Song`).
    let _ = album_sort_key(&metadata.album, &metadata.album_artist);

    // 7. HTML-escape display fields.
    metadata.artist = html_escape(&metadata.artist);
    metadata.album_artist = html_escape(&metadata.album_artist);
    metadata.album = html_escape(&metadata.album);
    metadata.title = html_escape(&metadata.title);
    metadata.genre = html_escape(&metadata.genre);

    // 8. clamp unreasonable years.
    if metadata.year != 0 && metadata.year < 1900 {
        metadata.year = 1900;
    }

    metadata
}

/// `"Last, First"` <-> `"First Last"` swap for a two-token display name.
/// Names without a clear "First Last" shape (more than two tokens, or a
/// name already containing a comma) are left unchanged.
fn swap_full_name(name: &str) -> String {
    if name.is_empty() || name.contains(',') {
        return name.to_string();
    }
    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.len() < 2 {
        return name.to_string();
    }
    let last = parts[parts.len() - 1];
    let first = parts[..parts.len() - 1].join(" ");
    format!("{last}, {first}")
}

/// `"The Motors"` -> `"Motors, The"`.
fn swap_the_prefix(name: &str) -> String {
    let trimmed = name.trim_start();
    if let Some(rest) = trimmed.strip_prefix("The ") {
        format!("{rest}, The")
    } else {
        name.to_string()
    }
}

/// Rotates a non-alphanumeric bracketed preamble to the end of the string:
/// `"[Live] Wish You Were Here"` -> `"Wish You Were Here [Live]"`.
fn move_preamble(album: &str) -> String {
    let trimmed = album.trim_start();
    let Some(first_char) = trimmed.chars().next() else {
        return album.to_string();
    };
    if first_char.is_alphanumeric() {
        return album.to_string();
    }
    let close = match first_char {
        '[' => ']',
        '(' => ')',
        _ => ' ',
    };
    if let Some(end) = trimmed.find(close) {
        let preamble = &trimmed[..=end];
        let rest = trimmed[end + 1..].trim_start();
        if rest.is_empty() {
            return album.to_string();
        }
        return format!("{rest} {preamble}");
    }
    album.to_string()
}

fn path_suggests_various(folder_path: &str) -> bool {
    let lower = folder_path.to_lowercase();
    VARIOUS_PATH_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(mut configure: impl FnMut(&mut LibraryConfig)) -> LibraryConfig {
        let mut cfg = LibraryConfig::default();
        configure(&mut cfg);
        cfg
    }

    #[test]
    fn full_name_swap_reorders_first_last() {
        assert_eq!(swap_full_name("Ludwig van Beethoven"), "Beethoven, Ludwig van");
        assert_eq!(swap_full_name("Cher"), "Cher");
    }

    #[test]
    fn the_band_prefix_swap_moves_article_to_end() {
        assert_eq!(swap_the_prefix("The Motors"), "Motors, The");
        assert_eq!(swap_the_prefix("Motors"), "Motors");
    }

    #[test]
    fn move_preamble_rotates_bracketed_prefix() {
        assert_eq!(
            move_preamble("[Live] Wish You Were Here"),
            "Wish You Were Here [Live]"
        );
    }

    #[test]
    fn various_artists_rename_triggers_on_path_marker() {
        let cfg = config_with(|_| {});
        let meta = MetadataDescriptor {
            artist: "Band A".to_string(),
            album_artist: "Band A".to_string(),
            ..Default::default()
        };
        let normalized = normalize(meta, "/music/Various Artists/Now 1", &cfg);
        assert_eq!(normalized.artist, "Various Artists");
        assert_eq!(normalized.original_artist, "Band A");
    }

    #[test]
    fn normalization_is_idempotent() {
        let cfg = config_with(|c| {
            c.allow_full_name_swap = true;
            c.allow_the_band_prefix_swap = true;
        });
        let meta = MetadataDescriptor {
            artist: "The Motors".to_string(),
            title: "Airport & Away".to_string(),
            year: 1850,
            ..Default::default()
        };
        let once = normalize(meta.clone(), "/music/motors", &cfg);
        let twice = normalize(once.clone(), "/music/motors", &cfg);
        assert_eq!(once, twice);
        assert_eq!(once.year, 1900);
    }
}
