//! tonearm binary entrypoint: thin CLI orchestration over the Library,
//! Playlist Set, and Playback Engine core (spec §1 "thin CLIs ... are extra
//! and not specified here").

mod config;
mod context;
mod error;
mod hash;
mod library;
mod metadata;
mod playback;
mod playlist;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use config::Config;
use context::Context;
use library::Library;
use log::{error, info, warn};
use playback::{AdvanceDirection, ControlCommand, Engine};
use playlist::Playlists;

/// `Library` and `Playlists` behind one shared lock, so the main REPL
/// thread and the playback thread's next-track-provider closure never have
/// to acquire the two locks in opposite orders (spec §5: "All public
/// Library/Playlist mutations are serialized by the library's exclusive
/// lock").
struct Catalog {
    library: Library,
    playlists: Playlists,
}

fn initialize_logging() {
    let mut clog = colog::basic_builder();
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        // Respect explicit user overrides completely when RUST_LOG is set.
        clog.parse_filters(&rust_log);
    } else {
        // Default policy: full tonearm diagnostics, warnings/errors from dependencies.
        clog.filter(None, log::LevelFilter::Warn);
        clog.filter(Some("tonearm"), log::LevelFilter::Debug);
    }
    clog.init();
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(std::env::temp_dir).join("tonearm").join("tonearm.toml")
}

fn data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("tonearm")
}

fn library_csv_path(data_dir: &Path) -> PathBuf {
    data_dir.join("library.csv")
}

fn playlists_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("playlists")
}

fn load_config(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
            warn!("config at {} failed to parse ({}), using defaults", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

fn save_config(path: &Path, config: &Config) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match toml::to_string(config) {
        Ok(text) => {
            if let Err(e) = std::fs::write(path, text) {
                warn!("failed to save config to {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("failed to serialize config: {}", e),
    }
}

/// One message accepted by the playback thread: either a control command or
/// a request to open a new track.
enum PlaybackMessage {
    Open(PathBuf, metadata::StreamDescriptor, String),
    Control(ControlCommand),
    Shutdown,
}

/// Runs the engine's pump loop on its own OS thread, draining queued
/// messages at each period boundary, per spec §5's producer/consumer model.
fn run_playback_thread(mut engine: Engine, commands: mpsc::Receiver<PlaybackMessage>, period: Duration) {
    loop {
        match commands.recv_timeout(period) {
            Ok(PlaybackMessage::Open(path, stream, file_hash)) => {
                if let Err(e) = engine.open_track(path.clone(), stream, file_hash) {
                    error!("failed to open {}: {}", path.display(), e);
                }
            }
            Ok(PlaybackMessage::Control(command)) => engine.apply_command(command),
            Ok(PlaybackMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        match engine.pump() {
            Ok(_) => {}
            Err(e) => error!("playback engine error: {}", e),
        }
    }
    info!("playback thread stopped at {} ms", engine.position_ms());
}

/// Saves the library and every playlist, per spec §6's graceful-shutdown
/// contract for any entry-point CLI driving the core.
fn save_all(ctx: &Context, catalog: &Catalog, data_dir: &Path) {
    let config = ctx.config_snapshot();
    if let Err(e) =
        catalog.library.save_to_file(&library_csv_path(data_dir), &config.library, ctx.clock.now_unix_secs())
    {
        error!("failed to save library: {}", e);
    }
    if let Err(e) = catalog.playlists.save_to_dir(&playlists_dir(data_dir)) {
        error!("failed to save playlists: {}", e);
    }
}

/// Resolves the next track to play from the playing playlist (or the
/// recent playlist if none is marked playing), advancing `playing_index`
/// and resolving the resulting track against the library (spec §2 "C->E").
fn resolve_next_track(
    catalog: &Mutex<Catalog>,
    direction: AdvanceDirection,
) -> Option<(PathBuf, metadata::StreamDescriptor, String)> {
    let mut guard = catalog.lock().expect("catalog lock poisoned");
    let Catalog { library, playlists } = &mut *guard;

    let playlist_name = playlists.playing().unwrap_or_else(|| playlists.recent().name.as_str()).to_string();
    let playlist = playlists.get_mut(&playlist_name)?;
    let current = playlist.playing_index().unwrap_or(0);

    let next_index = match direction {
        AdvanceDirection::Auto | AdvanceDirection::Next => playlist.next_song(current),
        AdvanceDirection::Prev => playlist.previous_song(current),
    }?;

    let file_hash = playlist.track_at(next_index)?.file_hash.clone();
    playlist.set_playing_index(Some(next_index));
    let song = library.find_by_file_hash(&file_hash)?;
    Some((song.path.clone(), song.stream_descriptor(), song.file_hash.clone()))
}

fn print_help() {
    println!(
        "commands: import <dir>, play <n>, pause, resume, stop, next, prev, seek <pct>, list, quit"
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    initialize_logging();
    install_panic_hook();

    let cfg_path = config_path();
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let config = load_config(&cfg_path);
    save_config(&cfg_path, &config);
    let ctx = Context::new(config.clone());

    let mut library = Library::new();
    match library.load_from_file(&library_csv_path(&data_dir), &config.library) {
        Ok(n) => info!("loaded {} songs from catalogue", n),
        Err(e) => warn!("no existing catalogue loaded ({})", e),
    }

    let mut playlists = Playlists::new(&config.playlist);
    match playlists.load_from_dir(&playlists_dir(&data_dir)) {
        Ok(n) => info!("loaded {} playlists", n),
        Err(e) => warn!("no existing playlists loaded ({})", e),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    for arg in &args {
        let path = PathBuf::from(arg);
        match library.import(&ctx, &[path.clone()], true) {
            Ok((added, failures)) => {
                info!("imported {} songs from {}", added, path.display());
                for (failed_path, e) in failures {
                    warn!("skipped {}: {}", failed_path.display(), e);
                }
            }
            Err(e) => error!("import of {} failed: {}", path.display(), e),
        }
    }

    let catalog = Arc::new(Mutex::new(Catalog { library, playlists }));
    if !args.is_empty() {
        save_all(&ctx, &catalog.lock().expect("catalog lock poisoned"), &data_dir);
    }

    let output = config.output.clone();
    let buffer_count = output.max_buffer_count.clamp(2, 64);
    let buffer_size = output.min_buffer_size;
    let sink = playback::sink::CpalSink::new(if output.output_device_auto {
        None
    } else {
        Some(output.output_device_name.clone())
    });
    let mut engine = Engine::new(Box::new(sink), buffer_count, buffer_size, 16, output.dithered);

    let provider_catalog = catalog.clone();
    engine.set_next_track_provider(Box::new(move |direction| resolve_next_track(&provider_catalog, direction)));

    let (tx, rx) = mpsc::channel::<PlaybackMessage>();
    let period = Duration::from_micros(output.period_time_us);
    let playback_thread = thread::Builder::new()
        .name("playback-consumer".into())
        .spawn(move || run_playback_thread(engine, rx, period))?;

    let terminate = Arc::new(AtomicBool::new(false));
    let signal_tx = tx.clone();
    let signal_terminate = terminate.clone();
    let signal_thread = thread::Builder::new().name("signal-watcher".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_io().build() {
            Ok(rt) => rt,
            Err(e) => {
                warn!("signal watcher unavailable ({}); Ctrl+C will terminate immediately", e);
                return;
            }
        };
        runtime.block_on(async {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        });
        signal_terminate.store(true, Ordering::SeqCst);
        let _ = signal_tx.send(PlaybackMessage::Shutdown);
    })?;

    print_help();
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::Builder::new().name("stdin-reader".into()).spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    })?;

    loop {
        if terminate.load(Ordering::SeqCst) {
            break;
        }
        let line = match line_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let mut parts = line.trim().split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => break,
            Some("import") => {
                if let Some(dir) = parts.next() {
                    let mut guard = catalog.lock().expect("catalog lock poisoned");
                    match guard.library.import(&ctx, &[PathBuf::from(dir)], true) {
                        Ok((added, _)) => println!("imported {} songs", added),
                        Err(e) => println!("import failed: {}", e),
                    }
                }
            }
            Some("list") => {
                let guard = catalog.lock().expect("catalog lock poisoned");
                println!("{} songs, {} albums", guard.library.song_count(), guard.library.album_count());
            }
            Some("play") => {
                if let Some(index_str) = parts.next() {
                    if let Ok(index) = index_str.parse::<usize>() {
                        let mut guard = catalog.lock().expect("catalog lock poisoned");
                        let Catalog { library, playlists } = &mut *guard;
                        match library.song_at(index) {
                            Some(song) => {
                                let (path, stream, file_hash) =
                                    (song.path.clone(), song.stream_descriptor(), song.file_hash.clone());
                                let max_size = config.playlist.max_playlist_size;
                                let recent = playlists.recent_mut();
                                if !recent.tracks().iter().any(|t| t.file_hash == file_hash) {
                                    recent.add_by_hash(library, &file_hash, max_size);
                                }
                                let position = recent.tracks().iter().position(|t| t.file_hash == file_hash);
                                recent.set_playing_index(position);
                                let recent_name = playlists.recent().name.clone();
                                playlists.set_playing(Some(&recent_name));
                                drop(guard);
                                let _ = tx.send(PlaybackMessage::Open(path, stream, file_hash));
                                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Play));
                            }
                            None => println!("no song at index {}", index),
                        }
                    }
                }
            }
            Some("pause") => {
                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Pause));
            }
            Some("resume") => {
                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Play));
            }
            Some("stop") => {
                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Stop));
            }
            Some("next") => {
                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Next));
            }
            Some("prev") => {
                let _ = tx.send(PlaybackMessage::Control(ControlCommand::Prev));
            }
            Some("seek") => {
                if let Some(pct_str) = parts.next() {
                    if let Ok(pct) = pct_str.parse::<f64>() {
                        let _ = tx.send(PlaybackMessage::Control(ControlCommand::PositionPercent(pct)));
                    }
                }
            }
            Some(other) => println!("unknown command: {}", other),
            None => {}
        }
    }

    let _ = tx.send(PlaybackMessage::Shutdown);
    drop(tx);
    let _ = playback_thread.join();
    let _ = signal_thread.join();

    save_all(&ctx, &catalog.lock().expect("catalog lock poisoned"), &data_dir);
    info!("shutdown complete");
    Ok(())
}
