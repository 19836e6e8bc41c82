//! Decoder Adapter (spec §4.4): the `Decoder` capability interface plus a
//! variant dispatcher over the format-specific readers. Concrete codec
//! libraries are out of scope per spec §1; only this interface and the
//! formats the metadata scanner already understands the container layout
//! of (WAV/AIFF/DSF/DFF) are implemented as direct readers. Streamable
//! formats (FLAC/MP3/MP4) are decoded via `symphonia`, matching the
//! teacher's `audio_decoder.rs`.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as SymphoniaDecoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;

use crate::metadata::StreamDescriptor;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to open {0}: {1}")]
    Open(PathBuf, String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("seek error: {0}")]
    Seek(String),
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),
}

/// One decoded chunk: interleaved PCM samples as signed 32-bit integers
/// (the engine narrows/widens via `convert` to the sink's actual format).
pub struct DecodedChunk {
    pub samples: Vec<i32>,
    pub end_of_stream: bool,
}

/// Capability interface the engine drives to pull decoded audio from a
/// track, per spec §4.4.
pub trait Decoder: Send {
    fn stream(&self) -> &StreamDescriptor;
    /// Decodes up to `max_samples` interleaved samples.
    fn decode_chunk(&mut self, max_samples: usize) -> Result<DecodedChunk, PlaybackError>;
    fn seek(&mut self, position_ms: u64) -> Result<(), PlaybackError>;
}

/// Opens `path` and returns the appropriate `Decoder` implementation.
pub fn open(path: &Path, stream: StreamDescriptor) -> Result<Box<dyn Decoder>, PlaybackError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "wav" | "aiff" | "aif" | "dsf" | "dff" => Ok(Box::new(RawPcmDecoder::open(path, stream)?)),
        "flac" | "mp3" | "m4a" | "mp4" | "alac" | "aac" => Ok(Box::new(SymphoniaDecoderAdapter::open(path, stream)?)),
        other => Err(PlaybackError::UnsupportedExtension(other.to_string())),
    }
}

/// Direct random-access reader for containers whose PCM data region the
/// metadata scanner already located (WAV/AIFF native PCM, DSF/DFF DSD via
/// `convert::pack_dop_frames`).
struct RawPcmDecoder {
    stream: StreamDescriptor,
    data: Vec<u8>,
    data_offset: usize,
    cursor: usize,
    is_dsd: bool,
}

impl RawPcmDecoder {
    fn open(path: &Path, stream: StreamDescriptor) -> Result<Self, PlaybackError> {
        let bytes = std::fs::read(path).map_err(|e| PlaybackError::Open(path.to_path_buf(), e.to_string()))?;
        let is_dsd = stream.bits_per_sample == 1;
        // The PCM/DSD payload location was already validated by the metadata
        // scanner; here we only need its length, which `byte_size` already
        // records, so we read from the tail of the file working backwards.
        let data_offset = bytes.len().saturating_sub(stream.byte_size as usize);
        Ok(RawPcmDecoder {
            stream,
            data: bytes,
            data_offset,
            cursor: 0,
            is_dsd,
        })
    }
}

impl Decoder for RawPcmDecoder {
    fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }

    fn decode_chunk(&mut self, max_samples: usize) -> Result<DecodedChunk, PlaybackError> {
        let payload = &self.data[self.data_offset..];
        if self.is_dsd {
            let bytes_wanted = max_samples * 2;
            let start = self.cursor;
            let end = (start + bytes_wanted).min(payload.len());
            let slice = &payload[start..end];
            self.cursor = end;
            let samples = crate::playback::convert::pack_dop_frames(slice);
            return Ok(DecodedChunk { samples, end_of_stream: end >= payload.len() });
        }

        let bytes_per_sample = self.stream.bytes_per_sample() as usize;
        let bytes_wanted = max_samples * bytes_per_sample;
        let start = self.cursor;
        let end = (start + bytes_wanted).min(payload.len());
        let slice = &payload[start..end];
        self.cursor = end;

        let mut samples = Vec::with_capacity(slice.len() / bytes_per_sample.max(1));
        for chunk in slice.chunks_exact(bytes_per_sample) {
            let value = match bytes_per_sample {
                2 => i16::from_le_bytes([chunk[0], chunk[1]]) as i32,
                3 => {
                    let b = [chunk[0], chunk[1], chunk[2], if chunk[2] & 0x80 != 0 { 0xFF } else { 0x00 }];
                    i32::from_le_bytes(b)
                }
                4 => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                _ => 0,
            };
            samples.push(value);
        }
        Ok(DecodedChunk { samples, end_of_stream: end >= payload.len() })
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlaybackError> {
        let bytes_per_sample = if self.is_dsd { 2 } else { self.stream.bytes_per_sample() as u64 };
        let frame_bytes = bytes_per_sample * self.stream.channels as u64;
        let target_sample = (position_ms * self.stream.sample_rate as u64) / 1000;
        self.cursor = (target_sample * frame_bytes) as usize;
        Ok(())
    }
}

/// `symphonia`-backed decoder for FLAC/MP3/MP4 container families.
struct SymphoniaDecoderAdapter {
    stream: StreamDescriptor,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
}

impl SymphoniaDecoderAdapter {
    fn open(path: &Path, stream: StreamDescriptor) -> Result<Self, PlaybackError> {
        let file = File::open(path).map_err(|e| PlaybackError::Open(path.to_path_buf(), e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlaybackError::Open(path.to_path_buf(), e.to_string()))?;
        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| PlaybackError::Decode("no default track".to_string()))?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        Ok(SymphoniaDecoderAdapter { stream, format, decoder, track_id })
    }
}

impl Decoder for SymphoniaDecoderAdapter {
    fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }

    fn decode_chunk(&mut self, max_samples: usize) -> Result<DecodedChunk, PlaybackError> {
        let mut samples = Vec::new();
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(DecodedChunk { samples, end_of_stream: true });
                }
                Err(e) => return Err(PlaybackError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| PlaybackError::Decode(e.to_string()))?;
            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
            if samples.len() >= max_samples {
                break;
            }
        }
        Ok(DecodedChunk { samples, end_of_stream: false })
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlaybackError> {
        let seconds = position_ms / 1000;
        let frac = (position_ms % 1000) as f64 / 1000.0;
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time { time: Time { seconds, frac }, track_id: Some(self.track_id) },
            )
            .map_err(|e| PlaybackError::Seek(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StreamDescriptor;
    use std::io::Write;

    fn wav_stream() -> StreamDescriptor {
        StreamDescriptor {
            codec: "WAV".into(),
            sample_rate: 44_100,
            bits_per_sample: 16,
            channels: 2,
            sample_count: 4,
            byte_size: 16,
            bit_rate: 1411,
        }
    }

    #[test]
    fn raw_pcm_decoder_reads_samples_from_tail_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[0xFFu8; 20]).unwrap(); // fake header
        let samples: Vec<i16> = vec![1, -1, 2, -2];
        for s in &samples {
            f.write_all(&s.to_le_bytes()).unwrap();
        }

        let mut decoder = RawPcmDecoder::open(&path, wav_stream()).unwrap();
        let chunk = decoder.decode_chunk(4).unwrap();
        assert_eq!(chunk.samples, vec![1, -1, 2, -2]);
        assert!(chunk.end_of_stream);
    }
}
