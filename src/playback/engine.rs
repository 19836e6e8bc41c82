//! Playback Engine (spec §4.5): the state machine, control-command queue,
//! producer/consumer buffer pool, and underrun recovery ladder driving one
//! active track through a [`Decoder`] into an [`AudioSink`].
//!
//! The producer/consumer split runs as two OS threads in production (spec
//! §5); the synchronous [`Engine::pump`] step implemented here is the
//! testable core each thread's loop calls repeatedly, grounded in the
//! message-driven control loop of `AudioPlayer::run` in the teacher's
//! `audio/audio_player.rs`.

use std::path::PathBuf;

use log::{debug, warn};

use super::buffer::{AudioBuffer, AudioBufferList, BufferStatus};
use super::convert::{convert_buffer, DitherState};
use super::decoder::{self, Decoder, PlaybackError};
use super::sink::{AudioSink, SinkError, SinkSignal};
use crate::metadata::StreamDescriptor;

/// Playback state machine, per spec §4.5's 9-state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No device open, no decoder attached.
    Closed,
    /// Device open, decoder attached, not yet playing.
    Idle,
    Play,
    /// Producer-starved: the buffer pool is empty but the stream hasn't
    /// reached end-of-stream, distinct from an underrun on the device side.
    Wait,
    /// Draining a silence burst into the still-open old-format sink before
    /// it is closed and reopened against a different stream's format.
    Reopen,
    Pause,
    /// Recovering from a sink underrun on a streamable codec via the
    /// escalation ladder, without abandoning playback outright.
    Halt,
    Stop,
    Error,
}

/// Control commands accepted by the engine, per spec §4.5.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Forward,
    Rewind,
    PositionPercent(f64),
    Next,
    Prev,
    Pause,
    Play,
    Stop,
}

/// Why the engine is requesting the next track, passed through to the
/// caller-supplied [`NextTrackFn`] so playlist advance/stepping logic can
/// tell an automatic end-of-track rollover from an explicit skip (spec §2
/// "C->E: engine pulls the next song from the playing playlist").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceDirection {
    Auto,
    Next,
    Prev,
}

/// Callback the engine calls to pull the next track from whatever is
/// driving playlist order; returns `(path, stream, file_hash)` or `None`
/// when there is nothing left to play.
pub type NextTrackFn = Box<dyn FnMut(AdvanceDirection) -> Option<(PathBuf, StreamDescriptor, String)> + Send>;

const SEEK_STEP_MS: u64 = 10_000;
/// Caps the underrun recovery ladder at 3 escalations before giving up
/// (spec §4.5: PIPE -> prepare -> SUSPENDED -> resume -> prepare -> Error).
const MAX_UNDERRUN_ESCALATIONS: u32 = 3;
/// How many bytes of silence to drain into the old-format sink during a
/// `Reopen` transition before closing it.
const REOPEN_SILENCE_BYTES: usize = 4096;

/// Codecs the metadata scanner/decoder treat as streamable (sequential
/// container readers); WAV/AIFF/DSF/DFF are random-access and excluded from
/// the `Halt` underrun path's streamable guard (spec §4.4, §4.5).
fn is_streamable_codec(codec: &str) -> bool {
    matches!(codec.to_ascii_uppercase().as_str(), "FLAC" | "MP3" | "MP4" | "ALAC" | "AAC")
}

/// Drives one track's decode/convert/output pipeline.
pub struct Engine {
    state: PlayerState,
    sink: Box<dyn AudioSink>,
    decoder: Option<Box<dyn Decoder>>,
    buffers: AudioBufferList,
    dither_state: DitherState,
    output_bits: u16,
    dithered: bool,
    position_ms: u64,
    duration_ms: u64,
    current_path: Option<PathBuf>,
    current_file_hash: Option<String>,
    underrun_escalations: u32,
    played_seconds: u64,
    last_format: Option<(u32, u16, u16)>,
    pending_reopen: Option<(PathBuf, StreamDescriptor, String)>,
    next_track: Option<NextTrackFn>,
    sequence_counter: u64,
    end_of_stream_reached: bool,
}

impl Engine {
    pub fn new(sink: Box<dyn AudioSink>, buffer_count: usize, buffer_size: usize, output_bits: u16, dithered: bool) -> Self {
        Engine {
            state: PlayerState::Closed,
            sink,
            decoder: None,
            buffers: AudioBufferList::new(buffer_count, buffer_size),
            dither_state: DitherState::default(),
            output_bits,
            dithered,
            position_ms: 0,
            duration_ms: 0,
            current_path: None,
            current_file_hash: None,
            underrun_escalations: 0,
            played_seconds: 0,
            last_format: None,
            pending_reopen: None,
            next_track: None,
            sequence_counter: 0,
            end_of_stream_reached: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn played_seconds(&self) -> u64 {
        self.played_seconds
    }

    /// Installs the callback the engine uses to pull the next track from
    /// the playing playlist, per spec §2's "C->E" data flow. Must be set
    /// before `pump`/`apply_command(Next|Prev)` are relied upon to advance.
    pub fn set_next_track_provider(&mut self, provider: NextTrackFn) {
        self.next_track = Some(provider);
    }

    /// Opens `path` for playback, identified by `file_hash` so the buffer
    /// pool and seek machinery can scope slots to this track (spec §3). If
    /// playback is currently active and the new stream's format differs
    /// from the sink's, the transition goes through `Reopen` (drain old
    /// sink with silence, close, reopen); otherwise it opens directly and
    /// lands in `Idle`, awaiting an explicit `ControlCommand::Play`.
    pub fn open_track(&mut self, path: PathBuf, stream: StreamDescriptor, file_hash: String) -> Result<(), PlaybackError> {
        self.begin_transition(path, stream, file_hash)
    }

    fn begin_transition(&mut self, path: PathBuf, stream: StreamDescriptor, file_hash: String) -> Result<(), PlaybackError> {
        let new_format = (stream.sample_rate, self.output_bits, stream.channels);
        let sink_open = self.sink.is_open();
        let format_changed = !sink_open || self.last_format != Some(new_format);
        let was_active = matches!(self.state, PlayerState::Play | PlayerState::Wait | PlayerState::Halt);

        if format_changed && sink_open {
            self.pending_reopen = Some((path, stream, file_hash));
            self.state = PlayerState::Reopen;
            return Ok(());
        }

        self.open_internal(path, stream, file_hash)?;
        self.state = if was_active { PlayerState::Play } else { PlayerState::Idle };
        Ok(())
    }

    /// Single source of truth for attaching a new decoder/sink/position to
    /// the engine, used by both manual `open_track` and the automatic
    /// post-`Reopen` transition in `finish_reopen`.
    fn open_internal(&mut self, path: PathBuf, stream: StreamDescriptor, file_hash: String) -> Result<(), PlaybackError> {
        let decoder = decoder::open(&path, stream.clone())?;

        let new_format = (stream.sample_rate, self.output_bits, stream.channels);
        if !self.sink.is_open() || self.last_format != Some(new_format) {
            self.sink.close();
            self.sink
                .open(stream.sample_rate, self.output_bits, stream.channels)
                .map_err(|e| PlaybackError::Open(path.clone(), e.to_string()))?;
            self.last_format = Some(new_format);
        }

        self.buffers.release_owned(&file_hash);
        self.duration_ms = stream.duration_ms();
        self.position_ms = 0;
        self.current_path = Some(path);
        self.current_file_hash = Some(file_hash);
        self.decoder = Some(decoder);
        self.end_of_stream_reached = false;
        Ok(())
    }

    /// Completes a `Reopen` transition: writes a short silence burst to the
    /// still-open old-format sink, closes it, then opens the pending track
    /// against its own format, landing back in `Play` (spec §4.5: "Reopen
    /// -> drain completes, sink reopened -> Play").
    fn finish_reopen(&mut self) -> Result<(), PlaybackError> {
        let Some((path, stream, file_hash)) = self.pending_reopen.take() else {
            self.state = PlayerState::Idle;
            return Ok(());
        };
        if self.sink.is_open() {
            let silence = vec![0u8; REOPEN_SILENCE_BYTES];
            let _ = self.sink.write(&silence);
        }
        self.sink.close();
        self.open_internal(path, stream, file_hash)?;
        self.state = PlayerState::Play;
        Ok(())
    }

    /// Applies one control command, per spec §4.5's control-command table.
    pub fn apply_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Play => match self.state {
                PlayerState::Pause => {
                    let _ = self.sink.resume();
                    self.state = PlayerState::Play;
                }
                PlayerState::Idle => {
                    self.state = PlayerState::Play;
                }
                _ => {}
            },
            ControlCommand::Pause => {
                if self.state == PlayerState::Play {
                    let _ = self.sink.pause();
                    self.state = PlayerState::Pause;
                }
            }
            ControlCommand::Stop => {
                self.decoder = None;
                self.current_file_hash = None;
                self.current_path = None;
                self.position_ms = 0;
                self.state = PlayerState::Stop;
            }
            ControlCommand::Forward => {
                let target = (self.position_ms + SEEK_STEP_MS).min(self.duration_ms);
                self.seek_to_ms(target);
            }
            ControlCommand::Rewind => {
                let target = self.position_ms.saturating_sub(SEEK_STEP_MS);
                self.seek_to_ms(target);
            }
            ControlCommand::PositionPercent(pct) => {
                let clamped = pct.clamp(0.0, 100.0);
                let Some(stream) = self.decoder.as_ref().map(|d| d.stream().clone()) else {
                    return;
                };
                let frame_size = stream.chunk_size().max(1) as u64;
                let mut absolute_byte = ((clamped / 100.0) * stream.byte_size as f64) as u64;
                absolute_byte -= absolute_byte % frame_size;
                let target_ms = if stream.byte_size > 0 {
                    (absolute_byte * self.duration_ms) / stream.byte_size
                } else {
                    0
                };
                self.seek_to_byte(target_ms, absolute_byte);
            }
            ControlCommand::Next => self.do_advance(AdvanceDirection::Next),
            ControlCommand::Prev => self.do_advance(AdvanceDirection::Prev),
        }
    }

    fn do_advance(&mut self, direction: AdvanceDirection) {
        if let Err(e) = self.advance(direction) {
            warn!("Engine: advance failed: {}", e);
            self.state = PlayerState::Error;
        }
    }

    /// Pulls the next track from the installed [`NextTrackFn`] and begins
    /// the transition to it; stops the engine if there is nothing left
    /// (spec §2 "C->E", §4.5 "Next"/"Prev").
    fn advance(&mut self, direction: AdvanceDirection) -> Result<(), PlaybackError> {
        let next = match &mut self.next_track {
            Some(provider) => provider(direction),
            None => None,
        };
        match next {
            Some((path, stream, file_hash)) => self.begin_transition(path, stream, file_hash),
            None => {
                self.decoder = None;
                self.current_file_hash = None;
                self.state = PlayerState::Stop;
                Ok(())
            }
        }
    }

    /// Closes the sink after a `Stop`, per spec §4.5's separate
    /// `Stop -> close() -> Closed` transition.
    pub fn close(&mut self) {
        self.sink.close();
        self.last_format = None;
        self.state = PlayerState::Closed;
    }

    fn seek_to_ms(&mut self, target_ms: u64) {
        let Some(stream) = self.decoder.as_ref().map(|d| d.stream().clone()) else {
            return;
        };
        let frame_size = stream.chunk_size().max(1) as u64;
        let bytes_per_ms = (stream.sample_rate as u64 * frame_size) / 1000;
        let mut absolute_byte = target_ms.saturating_mul(bytes_per_ms.max(1));
        absolute_byte -= absolute_byte % frame_size;
        self.seek_to_byte(target_ms, absolute_byte);
    }

    /// Seeks to `absolute_byte` of the current track, per spec §4.5's
    /// `PositionPercent` algorithm: first tries to reposition within the
    /// already-buffered window, falling back to a real decoder seek (and
    /// discarding stale buffers) only when the target isn't currently
    /// buffered.
    fn seek_to_byte(&mut self, target_ms: u64, absolute_byte: u64) {
        let Some(file_hash) = self.current_file_hash.clone() else {
            return;
        };
        if let Some((index, local_offset)) = self.buffers.find_seek_buffer(&file_hash, absolute_byte) {
            self.buffers.reposition_for_seek(&file_hash, index, local_offset);
            self.position_ms = target_ms;
            return;
        }
        self.buffers.release_owned(&file_hash);
        if let Some(decoder) = &mut self.decoder {
            if decoder.seek(target_ms).is_ok() {
                self.position_ms = target_ms;
                self.end_of_stream_reached = false;
            }
        }
    }

    /// One pump step: handles a pending `Reopen`, polls the sink for
    /// underrun/suspend signals, then produces ahead and consumes one
    /// ready buffer. Returns `false` once the engine has nothing left to do
    /// (stopped/errored).
    pub fn pump(&mut self) -> Result<bool, PlaybackError> {
        if self.state == PlayerState::Reopen {
            self.finish_reopen()?;
            return Ok(true);
        }
        if self.state != PlayerState::Play && self.state != PlayerState::Wait {
            return Ok(true);
        }

        match self.sink.poll_signal() {
            SinkSignal::Pipe => {
                self.handle_underrun();
                return Ok(true);
            }
            SinkSignal::Suspended => {
                if self.sink.resume().is_err() {
                    self.state = PlayerState::Error;
                    return Ok(false);
                }
            }
            SinkSignal::Ok => {}
        }

        self.produce()?;
        self.consume()
    }

    /// Fills every empty pool slot ahead from the decoder, tagged with the
    /// current track's `file_hash`, until the pool is full or end-of-stream
    /// is reached (spec §3/§5: a genuine pre-buffering producer, not a
    /// one-buffer-per-tick allocator).
    fn produce(&mut self) -> Result<(), PlaybackError> {
        if self.end_of_stream_reached {
            return Ok(());
        }
        let Some(file_hash) = self.current_file_hash.clone() else {
            return Ok(());
        };

        loop {
            let Some(slot_index) = self.buffers.allocate(&file_hash) else {
                break;
            };
            let Some(decoder) = &mut self.decoder else {
                self.buffers.release(slot_index);
                break;
            };

            let stream_bits = decoder.stream().bits_per_sample;
            let chunk = match decoder.decode_chunk(4096) {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.buffers.release(slot_index);
                    warn!("Engine: decode error: {}", e);
                    self.state = PlayerState::Error;
                    return Err(e);
                }
            };
            let converted = convert_buffer(&chunk.samples, stream_bits, self.output_bits, self.dithered, &mut self.dither_state);
            let bytes = samples_to_bytes(&converted, self.output_bits);

            let buffer = self.buffers.get_mut(slot_index);
            buffer.status = BufferStatus::Buffering;
            buffer.fill(&bytes);
            buffer.status = BufferStatus::Buffered;
            buffer.sequence = self.sequence_counter;
            self.sequence_counter += 1;

            if chunk.end_of_stream {
                self.end_of_stream_reached = true;
                break;
            }
        }
        Ok(())
    }

    /// Writes the next ready buffer scoped to the current track. Moves to
    /// `Wait` if the pool has nothing ready yet and the stream hasn't
    /// ended; advances to the next track once it has and the pool has
    /// drained.
    fn consume(&mut self) -> Result<bool, PlaybackError> {
        let Some(file_hash) = self.current_file_hash.clone() else {
            self.state = PlayerState::Stop;
            return Ok(false);
        };

        let Some(slot_index) = self.buffers.find_next_playable_for(&file_hash) else {
            if self.end_of_stream_reached {
                self.do_advance(AdvanceDirection::Auto);
                return Ok(self.state != PlayerState::Stop);
            }
            self.state = PlayerState::Wait;
            return Ok(true);
        };
        if self.state == PlayerState::Wait {
            self.state = PlayerState::Play;
        }

        let sample_rate = self.decoder.as_ref().map(|d| d.stream().sample_rate).unwrap_or(44_100).max(1);
        let frame_size = self.decoder.as_ref().map(|d| d.stream().chunk_size()).unwrap_or(4).max(1) as u64;

        let buffer = self.buffers.get_mut(slot_index);
        let unread = buffer.unread() as u64;
        write_buffer(&mut *self.sink, buffer)?;
        self.buffers.release(slot_index);

        self.position_ms += (unread * 1000) / (sample_rate as u64 * frame_size);
        self.played_seconds = self.position_ms / 1000;

        Ok(true)
    }

    /// Drives the recovery ladder for a sink `PIPE` (underrun) signal:
    /// `prepare()`, and if the device reports `SUSPENDED`, `resume()` then
    /// `prepare()` again, giving up after [`MAX_UNDERRUN_ESCALATIONS`].
    /// Streamable codecs route through `Halt` while recovering; random-
    /// access codecs (WAV/AIFF/DSF/DFF) recover directly (spec §4.4, §4.5).
    fn handle_underrun(&mut self) {
        self.underrun_escalations += 1;
        warn!("Engine: underrun detected (escalation {})", self.underrun_escalations);
        if self.underrun_escalations > MAX_UNDERRUN_ESCALATIONS {
            self.state = PlayerState::Error;
            return;
        }

        let streamable = self.decoder.as_ref().map(|d| is_streamable_codec(&d.stream().codec)).unwrap_or(false);
        if streamable {
            self.state = PlayerState::Halt;
        }

        if self.sink.prepare().is_err() {
            let _ = self.sink.resume();
            if self.sink.prepare().is_err() {
                self.state = PlayerState::Error;
                return;
            }
        }
        debug!("Engine: recovered from underrun");
        self.state = PlayerState::Play;
    }

    pub fn reset_underrun_counter(&mut self) {
        self.underrun_escalations = 0;
    }
}

fn write_buffer(sink: &mut dyn AudioSink, buffer: &mut AudioBuffer) -> Result<(), PlaybackError> {
    let bytes = buffer.consume(buffer.unread()).to_vec();
    sink.write(&bytes).map_err(sink_error_to_playback_error)?;
    buffer.status = BufferStatus::Played;
    Ok(())
}

fn sink_error_to_playback_error(e: SinkError) -> PlaybackError {
    PlaybackError::Decode(e.to_string())
}

fn samples_to_bytes(samples: &[i32], bits: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for &s in samples {
        match bits {
            16 => out.extend_from_slice(&(s as i16).to_le_bytes()),
            24 => out.extend_from_slice(&s.to_le_bytes()[..3]),
            _ => out.extend_from_slice(&s.to_le_bytes()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::sink::MockSink;

    fn stream() -> StreamDescriptor {
        StreamDescriptor {
            codec: "WAV".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 2,
            sample_count: 44_100,
            byte_size: 44_100 * 4,
            bit_rate: 1411,
        }
    }

    struct NoopDecoder(StreamDescriptor);
    impl Decoder for NoopDecoder {
        fn stream(&self) -> &StreamDescriptor {
            &self.0
        }
        fn decode_chunk(&mut self, _max_samples: usize) -> Result<super::super::decoder::DecodedChunk, PlaybackError> {
            Ok(super::super::decoder::DecodedChunk { samples: Vec::new(), end_of_stream: true })
        }
        fn seek(&mut self, _position_ms: u64) -> Result<(), PlaybackError> {
            Ok(())
        }
    }

    /// A decoder that yields `chunks` one at a time, then signals
    /// end-of-stream on an empty final chunk, used to exercise multi-buffer
    /// pre-buffering and the buffer-scoped seek path.
    struct ScriptedDecoder {
        stream: StreamDescriptor,
        chunks: Vec<Vec<i32>>,
        next: usize,
    }
    impl Decoder for ScriptedDecoder {
        fn stream(&self) -> &StreamDescriptor {
            &self.stream
        }
        fn decode_chunk(&mut self, _max_samples: usize) -> Result<super::super::decoder::DecodedChunk, PlaybackError> {
            if self.next >= self.chunks.len() {
                return Ok(super::super::decoder::DecodedChunk { samples: Vec::new(), end_of_stream: true });
            }
            let samples = self.chunks[self.next].clone();
            self.next += 1;
            let end_of_stream = self.next >= self.chunks.len();
            Ok(super::super::decoder::DecodedChunk { samples, end_of_stream })
        }
        fn seek(&mut self, _position_ms: u64) -> Result<(), PlaybackError> {
            Ok(())
        }
    }

    #[test]
    fn play_from_paused_resumes_sink() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.state = PlayerState::Pause;
        engine.apply_command(ControlCommand::Play);
        assert_eq!(engine.state(), PlayerState::Play);
    }

    #[test]
    fn stop_clears_decoder_but_leaves_sink_open() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.state = PlayerState::Play;
        engine.decoder = Some(Box::new(NoopDecoder(stream())));
        engine.apply_command(ControlCommand::Stop);
        assert_eq!(engine.state(), PlayerState::Stop);
        assert!(engine.decoder.is_none());
    }

    #[test]
    fn close_after_stop_closes_sink() {
        let mut sink = MockSink::new();
        sink.open(44_100, 16, 2).unwrap();
        let mut engine = Engine::new(Box::new(sink), 4, 4096, 16, true);
        engine.state = PlayerState::Stop;
        engine.close();
        assert_eq!(engine.state(), PlayerState::Closed);
    }

    #[test]
    fn underrun_ladder_gives_up_after_max_escalations() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.state = PlayerState::Play;
        engine.decoder = Some(Box::new(NoopDecoder(stream())));
        for _ in 0..=MAX_UNDERRUN_ESCALATIONS {
            engine.handle_underrun();
        }
        assert_eq!(engine.state(), PlayerState::Error);
    }

    #[test]
    fn streamable_underrun_routes_through_halt() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.state = PlayerState::Play;
        engine.decoder = Some(Box::new(NoopDecoder(StreamDescriptor { codec: "FLAC".into(), ..stream() })));
        engine.handle_underrun();
        assert_eq!(engine.state(), PlayerState::Play);
        assert_eq!(engine.underrun_escalations, 1);
    }

    #[test]
    fn position_percent_falls_back_to_decoder_seek_when_unbuffered() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.duration_ms = 100_000;
        engine.current_file_hash = Some("song-a".to_string());
        engine.decoder = Some(Box::new(NoopDecoder(stream())));
        engine.apply_command(ControlCommand::PositionPercent(50.0));
        assert_eq!(engine.position_ms, 50_000);
    }

    #[test]
    fn position_percent_repositions_within_buffered_window() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        let s = stream();
        engine.duration_ms = s.duration_ms();
        engine.current_file_hash = Some("song-a".to_string());
        engine.decoder = Some(Box::new(NoopDecoder(s.clone())));

        let frame_size = s.chunk_size() as usize;
        let a = engine.buffers.allocate("song-a").unwrap();
        engine.buffers.get_mut(a).sequence = 0;
        engine.buffers.get_mut(a).fill(&vec![0u8; frame_size * 10]);
        let b = engine.buffers.allocate("song-a").unwrap();
        engine.buffers.get_mut(b).sequence = 1;
        engine.buffers.get_mut(b).fill(&vec![0u8; frame_size * 10]);

        // Target a byte offset inside the second buffer.
        let target_byte = (frame_size * 12) as u64;
        let target_pct = (target_byte as f64 / s.byte_size as f64) * 100.0;
        engine.apply_command(ControlCommand::PositionPercent(target_pct));

        assert_eq!(engine.buffers.get(a).status, BufferStatus::Empty);
        assert_eq!(engine.buffers.get(b).status, BufferStatus::Playing);
    }

    #[test]
    fn produce_fills_multiple_buffers_ahead_of_consumption() {
        let mut engine = Engine::new(Box::new(MockSink::new()), 4, 4096, 16, true);
        engine.current_file_hash = Some("a".to_string());
        engine.decoder = Some(Box::new(ScriptedDecoder {
            stream: stream(),
            chunks: vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
            next: 0,
        }));
        engine.produce().unwrap();
        assert_eq!(engine.buffers.count_by_status(BufferStatus::Buffered), 2);
        assert!(engine.end_of_stream_reached);
    }

    #[test]
    fn next_with_same_format_stays_gapless() {
        let mut sink = MockSink::new();
        sink.open(44_100, 16, 2).unwrap();
        let opened_before = sink.open_calls;
        let mut engine = Engine::new(Box::new(sink), 4, 4096, 16, true);
        engine.decoder = Some(Box::new(NoopDecoder(stream())));
        engine.current_file_hash = Some("a".to_string());
        engine.last_format = Some((44_100, 16, 2));
        engine.state = PlayerState::Play;

        let next_stream = stream();
        engine.set_next_track_provider(Box::new(move |_dir| {
            Some((PathBuf::from("b.wav"), next_stream.clone(), "b".to_string()))
        }));
        engine.apply_command(ControlCommand::Next);

        // Same format: no Reopen detour, lands straight back in Play.
        assert_eq!(engine.state(), PlayerState::Play);
        assert_eq!(engine.last_format, Some((44_100, 16, 2)));
        assert_eq!(opened_before, 1);
    }

    #[test]
    fn next_with_different_format_reopens_sink() {
        let mut sink = MockSink::new();
        sink.open(44_100, 16, 2).unwrap();
        let mut engine = Engine::new(Box::new(sink), 4, 4096, 16, true);
        engine.decoder = Some(Box::new(NoopDecoder(stream())));
        engine.current_file_hash = Some("a".to_string());
        engine.last_format = Some((44_100, 16, 2));
        engine.state = PlayerState::Play;

        let different = StreamDescriptor { sample_rate: 48_000, ..stream() };
        engine.set_next_track_provider(Box::new(move |_dir| {
            Some((PathBuf::from("b.flac"), different.clone(), "b".to_string()))
        }));
        engine.apply_command(ControlCommand::Next);
        assert_eq!(engine.state(), PlayerState::Reopen);

        engine.pump().unwrap();
        assert_eq!(engine.state(), PlayerState::Play);
        assert_eq!(engine.last_format, Some((48_000, 16, 2)));
    }
}
