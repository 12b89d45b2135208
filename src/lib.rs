//! Timing and event synchronization for scrolling MIDI note displays.
//!
//! - [`midi`] decodes Standard MIDI Files into tracks of notes and tempo
//!   changes, and maps ticks to seconds through a tempo map.
//! - [`playback`] keeps an audio-hardware clock and a frame-driven scheduler
//!   in step, feeding note-on/note-off intents through a pooled queue.

pub mod config;
pub mod error;
pub mod midi;
pub mod playback;

pub use config::{FrameMode, SchedulerConfig};
pub use error::{DecodeError, PlaybackError};
