//! Directory walking for `Library::import`/`rescan` (spec §4.2).
//!
//! Sub-directory scan order is ascending by path; a directory containing a
//! `noscan` sentinel file is skipped entirely.

use std::path::{Path, PathBuf};

const NOSCAN_SENTINEL: &str = "noscan";

/// Returns whether `filename` matches any of the glob-like patterns in
/// `patterns` (each of the form `*.ext`; only the suffix form is supported,
/// matching the patterns the core actually uses, e.g. `*.flac`).
pub fn matches_any_pattern(filename: &str, patterns: &[String]) -> bool {
    let lower = filename.to_ascii_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        match pattern.strip_prefix('*') {
            Some(suffix) => lower.ends_with(suffix),
            None => lower == pattern,
        }
    })
}

/// Walks `root` (recursively if `recursive`), returning every file path
/// matching `patterns`, in ascending path order, skipping directories that
/// contain a `noscan` sentinel file.
pub fn walk(root: &Path, patterns: &[String], recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk_inner(root, patterns, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk_inner(dir: &Path, patterns: &[String], recursive: bool, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if dir.join(NOSCAN_SENTINEL).exists() {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if recursive {
                walk_inner(&path, patterns, recursive, found)?;
            }
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if matches_any_pattern(name, patterns) {
                found.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn pattern_matching_is_case_insensitive_on_extension() {
        let patterns = vec!["*.flac".to_string(), "*.mp3".to_string()];
        assert!(matches_any_pattern("Track.FLAC", &patterns));
        assert!(!matches_any_pattern("Track.wav", &patterns));
    }

    #[test]
    fn walk_skips_directories_with_noscan_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let skipped = dir.path().join("skip_me");
        fs::create_dir(&skipped).unwrap();
        fs::write(skipped.join("noscan"), b"").unwrap();
        fs::write(skipped.join("a.flac"), b"").unwrap();

        let kept = dir.path().join("keep_me");
        fs::create_dir(&kept).unwrap();
        fs::write(kept.join("b.flac"), b"").unwrap();

        let patterns = vec!["*.flac".to_string()];
        let found = walk(dir.path(), &patterns, true).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("b.flac"));
    }
}
