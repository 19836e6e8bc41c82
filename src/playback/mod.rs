//! Playback Engine (spec §4.5): buffer pool, sample conversion, the decoder
//! capability interface, the sink capability interface, and the state
//! machine/control loop tying them together.

pub mod buffer;
pub mod convert;
pub mod decoder;
pub mod engine;
pub mod sink;

pub use decoder::PlaybackError;
pub use engine::{AdvanceDirection, ControlCommand, Engine, NextTrackFn, PlayerState};
pub use sink::{AudioSink, SinkError};
