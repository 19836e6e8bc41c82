//! `AudioSink` capability interface (spec §6) and its two implementations:
//! a `cpal`-backed real output device, and an in-memory mock used by tests
//! and the scenario tests in SPEC_FULL.md §D.
//!
//! Device selection and the `cpal` config-negotiation dance are grounded in
//! `AudioPlayer::open_output_device`/`choose_best_stream_config` in the
//! teacher's `audio/audio_player.rs`.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no output device available")]
    NoDevice,
    #[error("no matching output stream config for {sample_rate}Hz/{bits}-bit/{channels}ch")]
    NoMatchingConfig { sample_rate: u32, bits: u16, channels: u16 },
    #[error("device error: {0}")]
    Device(String),
    #[error("sink is not open")]
    NotOpen,
}

/// Underrun/xrun recovery state a sink may report back to the engine so it
/// can drive the recovery ladder in spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSignal {
    Ok,
    Pipe,
    Suspended,
}

/// Capability interface the playback engine drives; out-of-scope per spec
/// §1, only the interface itself is specified.
pub trait AudioSink: Send {
    fn open(&mut self, sample_rate: u32, bits_per_sample: u16, channels: u16) -> Result<(), SinkError>;
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError>;
    fn pause(&mut self) -> Result<(), SinkError>;
    fn resume(&mut self) -> Result<(), SinkError>;
    /// Re-primes the device after an underrun (`PIPE`) without a full
    /// close/reopen, per spec §4.5's recovery ladder.
    fn prepare(&mut self) -> Result<(), SinkError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn poll_signal(&mut self) -> SinkSignal;
}

/// Real output device, backed by `cpal`.
pub struct CpalSink {
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
    write_buffer: Arc<Mutex<Vec<u8>>>,
    open: bool,
}

impl CpalSink {
    pub fn new(device_name: Option<String>) -> Self {
        CpalSink {
            device_name,
            stream: None,
            write_buffer: Arc::new(Mutex::new(Vec::new())),
            open: false,
        }
    }

    fn select_device(&self) -> Result<cpal::Device, SinkError> {
        let host = cpal::default_host();
        if let Some(name) = &self.device_name {
            if let Some(device) = host
                .output_devices()
                .map_err(|e| SinkError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            {
                return Ok(device);
            }
        }
        host.default_output_device().ok_or(SinkError::NoDevice)
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, sample_rate: u32, _bits_per_sample: u16, channels: u16) -> Result<(), SinkError> {
        let device = self.select_device()?;
        let supported = device
            .supported_output_configs()
            .map_err(|e| SinkError::Device(e.to_string()))?
            .find(|c| c.channels() == channels && c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
            .ok_or(SinkError::NoMatchingConfig { sample_rate, bits: _bits_per_sample, channels })?;

        let config = supported.with_sample_rate(cpal::SampleRate(sample_rate)).config();
        let buffer = self.write_buffer.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pending = buffer.lock().expect("write buffer lock poisoned");
                    let available = pending.len().min(output.len() * 4);
                    for (i, frame) in output.iter_mut().enumerate() {
                        let byte_offset = i * 4;
                        *frame = if byte_offset + 4 <= available {
                            f32::from_le_bytes([
                                pending[byte_offset],
                                pending[byte_offset + 1],
                                pending[byte_offset + 2],
                                pending[byte_offset + 3],
                            ])
                        } else {
                            0.0
                        };
                    }
                    pending.drain(..available);
                },
                |_err| {},
                None,
            )
            .map_err(|e| SinkError::Device(e.to_string()))?;

        stream.play().map_err(|e| SinkError::Device(e.to_string()))?;
        self.stream = Some(stream);
        self.open = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError> {
        if !self.open {
            return Err(SinkError::NotOpen);
        }
        self.write_buffer.lock().expect("write buffer lock poisoned").extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        if let Some(stream) = &self.stream {
            stream.pause().map_err(|e| SinkError::Device(e.to_string()))?;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| SinkError::Device(e.to_string()))?;
        }
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), SinkError> {
        self.resume()
    }

    fn close(&mut self) {
        self.stream = None;
        self.open = false;
        self.write_buffer.lock().expect("write buffer lock poisoned").clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn poll_signal(&mut self) -> SinkSignal {
        SinkSignal::Ok
    }
}

/// In-memory sink used by tests (spec §8's scenario tests): records every
/// byte written plus open/close call counts so tests can assert gapless vs.
/// reopen-on-stream-change transitions.
#[derive(Debug, Default)]
pub struct MockSink {
    pub open_calls: u32,
    pub close_calls: u32,
    pub written: Vec<u8>,
    pub current_format: Option<(u32, u16, u16)>,
    pub forced_signal: SinkSignal,
    open: bool,
}

impl MockSink {
    pub fn new() -> Self {
        MockSink {
            forced_signal: SinkSignal::Ok,
            ..Default::default()
        }
    }
}

impl Default for SinkSignal {
    fn default() -> Self {
        SinkSignal::Ok
    }
}

impl AudioSink for MockSink {
    fn open(&mut self, sample_rate: u32, bits_per_sample: u16, channels: u16) -> Result<(), SinkError> {
        self.open_calls += 1;
        self.current_format = Some((sample_rate, bits_per_sample, channels));
        self.open = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError> {
        if !self.open {
            return Err(SinkError::NotOpen);
        }
        self.written.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn poll_signal(&mut self) -> SinkSignal {
        self.forced_signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_sink_tracks_open_and_close_calls() {
        let mut sink = MockSink::new();
        sink.open(44_100, 16, 2).unwrap();
        assert_eq!(sink.open_calls, 1);
        sink.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(sink.written, vec![1, 2, 3, 4]);
        sink.close();
        assert_eq!(sink.close_calls, 1);
        assert!(!sink.is_open());
    }

    #[test]
    fn mock_sink_rejects_writes_before_open() {
        let mut sink = MockSink::new();
        assert!(sink.write(&[1]).is_err());
    }
}
