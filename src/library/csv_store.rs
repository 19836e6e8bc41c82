//! Library CSV persistence: the 33-field semicolon-separated record format,
//! backup rotation, and the companion errors file (spec §4.2, §6).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::LibraryConfig;
use crate::hash::{url_decode, url_encode};

use super::song::Song;

const FIELD_COUNT: usize = 33;
const MAX_BACKUPS: usize = 5;

pub const CSV_HEADER: &str = "codec;artist;original_artist;album_artist;album;title;genre;composer;conductor;original_album_artist;title_hash;album_hash;track;disk;year;date;sample_count;sample_size;sample_rate;bits_per_sample;bytes_per_sample;channels;bit_rate;chunk_size;duration_ms;seconds;hms;path;mtime;file_size;file_hash;config_bitmask;inserted";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),
}

/// A fully-parsed CSV row, prior to arena insertion (the arena assigns the
/// `SongId`, so this carries every other `Song` field).
#[derive(Debug, Clone)]
pub struct CsvRecord {
    pub codec: String,
    pub artist: String,
    pub original_artist: String,
    pub album_artist: String,
    pub album: String,
    pub title: String,
    pub genre: String,
    pub composer: String,
    pub conductor: String,
    pub original_album_artist: String,
    pub title_hash: String,
    pub album_hash: String,
    pub track_number: u32,
    pub track_count: u32,
    pub disk_number: u32,
    pub disk_count: u32,
    pub year: u32,
    pub date: String,
    pub sample_count: u64,
    pub sample_size: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub bytes_per_sample: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub chunk_size: u32,
    pub duration_ms: u64,
    pub path: PathBuf,
    pub modified_unix: u64,
    pub size_bytes: u64,
    pub file_hash: String,
    pub inserted_unix: u64,
}

fn scanner_bitmask(config: &LibraryConfig) -> u32 {
    let mut mask = 0u32;
    if config.allow_group_name_swap {
        mask |= 1 << 0;
    }
    if config.allow_artist_name_restore {
        mask |= 1 << 1;
    }
    if config.allow_full_name_swap {
        mask |= 1 << 2;
    }
    if config.allow_the_band_prefix_swap {
        mask |= 1 << 3;
    }
    if config.allow_deep_name_inspection {
        mask |= 1 << 4;
    }
    if config.allow_various_artists_rename {
        mask |= 1 << 5;
    }
    if config.allow_move_preamble {
        mask |= 1 << 6;
    }
    if config.url_encoded {
        mask |= 1 << 9;
    }
    mask
}

fn hms(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h}:{m:02}:{s:02}")
}

fn maybe_encode(text: &str, url_encoded: bool) -> String {
    if url_encoded {
        url_encode(text)
    } else {
        text.to_string()
    }
}

fn fraction(value: u32, count: u32) -> String {
    if count > 0 {
        format!("{value}/{count}")
    } else {
        value.to_string()
    }
}

/// Formats one song as a semicolon-separated record, per spec §4.2.
pub fn format_record(song: &Song, config: &LibraryConfig) -> String {
    let url_encoded = config.url_encoded;
    let fields: [String; FIELD_COUNT] = [
        song.codec.clone(),
        maybe_encode(&song.artist, url_encoded),
        maybe_encode(&song.original_artist, url_encoded),
        maybe_encode(&song.album_artist, url_encoded),
        maybe_encode(&song.album, url_encoded),
        maybe_encode(&song.title, url_encoded),
        maybe_encode(&song.genre, url_encoded),
        maybe_encode(&song.composer, url_encoded),
        maybe_encode(&song.conductor, url_encoded),
        maybe_encode(&song.original_album_artist, url_encoded),
        song.title_hash.clone(),
        song.album_hash.clone(),
        fraction(song.track_number, song.track_count),
        fraction(song.disk_number, song.disk_count),
        song.year.to_string(),
        song.date.clone(),
        song.sample_count.to_string(),
        song.bits_per_sample.to_string(),
        song.sample_rate.to_string(),
        song.bits_per_sample.to_string(),
        song.bytes_per_sample.to_string(),
        song.channels.to_string(),
        song.bit_rate.to_string(),
        song.chunk_size.to_string(),
        song.duration_ms.to_string(),
        song.duration_s.to_string(),
        hms(song.duration_s),
        maybe_encode(&song.path.to_string_lossy(), url_encoded),
        song.modified_unix.to_string(),
        song.size_bytes.to_string(),
        song.file_hash.clone(),
        scanner_bitmask(config).to_string(),
        song.inserted_unix.to_string(),
    ];
    fields.join(";")
}

/// Parses one previously-written record line.
pub fn parse_record(line: &str, url_encoded: bool) -> Result<CsvRecord, CsvError> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() != FIELD_COUNT {
        return Err(CsvError::FieldCount(fields.len()));
    }
    let decode = |s: &str| if url_encoded { url_decode(s) } else { s.to_string() };
    let parse_fraction = |s: &str| -> (u32, u32) {
        let mut parts = s.split('/');
        let value = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        let count = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        (value, count)
    };

    let (track_number, track_count) = parse_fraction(fields[12]);
    let (disk_number, disk_count) = parse_fraction(fields[13]);

    Ok(CsvRecord {
        codec: fields[0].to_string(),
        artist: decode(fields[1]),
        original_artist: decode(fields[2]),
        album_artist: decode(fields[3]),
        album: decode(fields[4]),
        title: decode(fields[5]),
        genre: decode(fields[6]),
        composer: decode(fields[7]),
        conductor: decode(fields[8]),
        original_album_artist: decode(fields[9]),
        title_hash: fields[10].to_string(),
        album_hash: fields[11].to_string(),
        track_number,
        track_count,
        disk_number,
        disk_count,
        year: fields[14].parse().unwrap_or(0),
        date: fields[15].to_string(),
        sample_count: fields[16].parse().unwrap_or(0),
        sample_size: fields[17].parse().unwrap_or(0),
        sample_rate: fields[18].parse().unwrap_or(0),
        bits_per_sample: fields[19].parse().unwrap_or(0),
        bytes_per_sample: fields[20].parse().unwrap_or(0),
        channels: fields[21].parse().unwrap_or(0),
        bit_rate: fields[22].parse().unwrap_or(0),
        chunk_size: fields[23].parse().unwrap_or(0),
        duration_ms: fields[24].parse().unwrap_or(0),
        path: PathBuf::from(decode(fields[27])),
        modified_unix: fields[28].parse().unwrap_or(0),
        size_bytes: fields[29].parse().unwrap_or(0),
        file_hash: fields[30].to_string(),
        inserted_unix: fields[32].parse().unwrap_or(0),
    })
}

/// Rotates the previous file to a timestamped `.bak`, keeping at most
/// [`MAX_BACKUPS`].
fn rotate_backup(path: &Path, now_unix: u64) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let backup_path = path.with_extension(format!("{now_unix}.bak"));
    fs::rename(path, &backup_path)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
    let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&stem) && n.ends_with(".bak"))
                .unwrap_or(false)
        })
        .collect();
    backups.sort();
    while backups.len() > MAX_BACKUPS {
        let oldest = backups.remove(0);
        let _ = fs::remove_file(oldest);
    }
    Ok(())
}

/// Writes the full song set as delimited text, rotating any previous file
/// to a timestamped backup first.
pub fn save_to_file(path: &Path, songs: &[&Song], config: &LibraryConfig, now_unix: u64) -> Result<(), CsvError> {
    rotate_backup(path, now_unix)?;
    let mut body = String::new();
    body.push_str(CSV_HEADER);
    body.push_str("\r\n");
    for song in songs {
        body.push_str(&format_record(song, config));
        body.push_str("\r\n");
    }
    fs::write(path, body)?;
    Ok(())
}

/// Parses a previously-saved CSV file into records, skipping the header.
pub fn load_from_file(path: &Path, config: &LibraryConfig) -> Result<Vec<CsvRecord>, CsvError> {
    let contents = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        records.push(parse_record(line, config.url_encoded)?);
    }
    Ok(records)
}

/// One failed-import record: `<n>;<path>;<error>;<text>;<hint>` (spec §6).
pub fn format_error_record(index: usize, path: &Path, error_code: i32, text: &str, hint: &str) -> String {
    format!("{index};{};{error_code};{text};{hint}", path.display())
}

/// Appends failed-import records to the errors file.
pub fn append_errors(path: &Path, records: &[String]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    for record in records {
        writeln!(file, "{record}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MediaClass, MetadataDescriptor, StreamDescriptor};
    use std::path::Path;

    fn sample_song() -> Song {
        let stream = StreamDescriptor {
            codec: "FLAC".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 2,
            sample_count: 44_100 * 3,
            byte_size: 44_100 * 3 * 4,
            bit_rate: 1411,
        };
        let meta = MetadataDescriptor {
            artist: "Test Artist".into(),
            album: "Test Album".into(),
            album_artist: "Test Artist".into(),
            title: "Test Title".into(),
            track_number: 1,
            track_count: 10,
            ..Default::default()
        };
        Song::new(0, Path::new("/music/test.flac"), stream, meta, 1000, 2000, 3000)
    }

    #[test]
    fn record_round_trips_through_format_and_parse() {
        let song = sample_song();
        let config = LibraryConfig::default();
        let line = format_record(&song, &config);
        let parsed = parse_record(&line, config.url_encoded).unwrap();

        assert_eq!(parsed.artist, song.artist);
        assert_eq!(parsed.album, song.album);
        assert_eq!(parsed.title_hash, song.title_hash);
        assert_eq!(parsed.file_hash, song.file_hash);
        assert_eq!(parsed.track_number, 1);
        assert_eq!(parsed.track_count, 10);
        assert_eq!(parsed.sample_rate, 44_100);
        assert_eq!(parsed.media_class_sanity_check(), song.media_class);
    }

    impl CsvRecord {
        fn media_class_sanity_check(&self) -> MediaClass {
            MediaClass::derive(self.sample_rate, self.bits_per_sample)
        }
    }

    #[test]
    fn save_rotates_previous_file_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.csv");
        let song = sample_song();
        let config = LibraryConfig::default();

        save_to_file(&path, &[&song], &config, 1000).unwrap();
        assert!(path.exists());
        save_to_file(&path, &[&song], &config, 2000).unwrap();

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
