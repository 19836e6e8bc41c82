//! Persistent application configuration model and defaults.

/// Root configuration persisted to `tonearm.toml`.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Audio output and sink/buffer-pool preferences.
    #[serde(default)]
    pub output: OutputConfig,
    /// Decoder/player buffering behavior.
    #[serde(default)]
    pub buffering: BufferingConfig,
    /// Library scan/normalization behavior.
    #[serde(default)]
    pub library: LibraryConfig,
    /// Playlist-set behavior.
    #[serde(default)]
    pub playlist: PlaylistConfig,
}

/// Output device, sink format, and buffer-pool preferences (spec §6).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub output_device_name: String,
    #[serde(default = "default_true")]
    pub output_device_auto: bool,
    #[serde(default = "default_period_time_us")]
    pub period_time_us: u64,
    #[serde(default = "default_buffer_time_us")]
    pub buffer_time_us: u64,
    #[serde(default = "default_max_buffer_count")]
    pub max_buffer_count: usize,
    #[serde(default = "default_min_buffer_size")]
    pub min_buffer_size: usize,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_memory_fraction_percent")]
    pub memory_fraction_percent: u8,
    #[serde(default = "default_skip_frame_seconds")]
    pub skip_frame_seconds: f64,
    #[serde(default = "default_true")]
    pub dithered: bool,
    #[serde(default)]
    pub ignore_mixer: bool,
}

/// Tuning knobs for decode/playback buffering.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct BufferingConfig {
    #[serde(default = "default_player_low_watermark_ms")]
    pub player_low_watermark_ms: u32,
    #[serde(default = "default_player_target_buffer_ms")]
    pub player_target_buffer_ms: u32,
    #[serde(default = "default_player_request_interval_ms")]
    pub player_request_interval_ms: u32,
    #[serde(default = "default_decoder_request_chunk_ms")]
    pub decoder_request_chunk_ms: u32,
}

/// Scanner normalization flags, mirroring `EScannerType` in
/// `original_source/src/inc/audiotypes.h`, exposed as named booleans rather
/// than a raw bitmask.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub allow_full_name_swap: bool,
    #[serde(default)]
    pub allow_group_name_swap: bool,
    #[serde(default)]
    pub allow_artist_name_restore: bool,
    #[serde(default)]
    pub allow_the_band_prefix_swap: bool,
    #[serde(default)]
    pub allow_deep_name_inspection: bool,
    #[serde(default = "default_true")]
    pub allow_various_artists_rename: bool,
    #[serde(default)]
    pub allow_move_preamble: bool,
    #[serde(default)]
    pub sort_case_sensitive: bool,
    #[serde(default)]
    pub sort_albums_by_year: bool,
    #[serde(default)]
    pub url_encoded: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,
}

/// Playlist-set behavior knobs.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_recent_playlist_name")]
    pub recent_playlist_name: String,
    #[serde(default = "default_max_playlist_size")]
    pub max_playlist_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_device_name: String::new(),
            output_device_auto: true,
            period_time_us: default_period_time_us(),
            buffer_time_us: default_buffer_time_us(),
            max_buffer_count: default_max_buffer_count(),
            min_buffer_size: default_min_buffer_size(),
            max_buffer_size: default_max_buffer_size(),
            memory_fraction_percent: default_memory_fraction_percent(),
            skip_frame_seconds: default_skip_frame_seconds(),
            dithered: true,
            ignore_mixer: false,
        }
    }
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            player_low_watermark_ms: default_player_low_watermark_ms(),
            player_target_buffer_ms: default_player_target_buffer_ms(),
            player_request_interval_ms: default_player_request_interval_ms(),
            decoder_request_chunk_ms: default_decoder_request_chunk_ms(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            allow_full_name_swap: false,
            allow_group_name_swap: false,
            allow_artist_name_restore: false,
            allow_the_band_prefix_swap: false,
            allow_deep_name_inspection: false,
            allow_various_artists_rename: true,
            allow_move_preamble: false,
            sort_case_sensitive: false,
            sort_albums_by_year: false,
            url_encoded: false,
            debug: false,
            verbosity: default_verbosity(),
            file_patterns: default_file_patterns(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            recent_playlist_name: default_recent_playlist_name(),
            max_playlist_size: default_max_playlist_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_period_time_us() -> u64 {
    1_000_000
}

fn default_buffer_time_us() -> u64 {
    default_period_time_us() * 4
}

fn default_max_buffer_count() -> usize {
    32
}

fn default_min_buffer_size() -> usize {
    64 * 1024
}

fn default_max_buffer_size() -> usize {
    4 * 1024 * 1024
}

fn default_memory_fraction_percent() -> u8 {
    10
}

fn default_skip_frame_seconds() -> f64 {
    10.0
}

fn default_player_low_watermark_ms() -> u32 {
    12_000
}

fn default_player_target_buffer_ms() -> u32 {
    24_000
}

fn default_player_request_interval_ms() -> u32 {
    120
}

fn default_decoder_request_chunk_ms() -> u32 {
    1_500
}

fn default_verbosity() -> u8 {
    1
}

fn default_recent_playlist_name() -> String {
    "state".to_string()
}

fn default_max_playlist_size() -> usize {
    50_000
}

/// Returns the built-in file-pattern set used for new configs.
pub fn default_file_patterns() -> Vec<String> {
    vec![
        "*.flac".to_string(),
        "*.wav".to_string(),
        "*.aiff".to_string(),
        "*.aif".to_string(),
        "*.dsf".to_string(),
        "*.dff".to_string(),
        "*.mp3".to_string(),
        "*.m4a".to_string(),
        "*.mp4".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::{default_file_patterns, BufferingConfig, Config};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.output.period_time_us, 1_000_000);
        assert_eq!(config.output.buffer_time_us, 4_000_000);
        assert!(config.output.dithered);
        assert_eq!(config.output.memory_fraction_percent, 10);
        assert!(config.output.output_device_auto);

        assert_eq!(config.buffering.player_low_watermark_ms, 12_000);
        assert_eq!(config.buffering.player_target_buffer_ms, 24_000);

        assert!(config.library.allow_various_artists_rename);
        assert!(!config.library.allow_deep_name_inspection);
        assert_eq!(config.library.file_patterns, default_file_patterns());

        assert_eq!(config.playlist.recent_playlist_name, "state");
    }

    #[test]
    fn test_legacy_config_deserialization_applies_defaults() {
        let legacy_config_toml = r#"
[output]
period_time_us = 1000000

[buffering]
player_low_watermark_ms = 12000
player_target_buffer_ms = 24000
player_request_interval_ms = 120
decoder_request_chunk_ms = 1500
"#;

        let parsed: Config = toml::from_str(legacy_config_toml).expect("config should parse");
        assert!(parsed.output.output_device_auto);
        assert_eq!(parsed.output.max_buffer_count, 32);
        assert_eq!(
            parsed.buffering.player_target_buffer_ms,
            BufferingConfig::default().player_target_buffer_ms
        );
    }
}
