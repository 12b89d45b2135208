//! Error types for decoding and playback.
//!
//! Decoding errors are fatal for the whole buffer: no partial track list is
//! ever returned alongside one. Playback errors leave the clock stopped.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    /// A chunk did not start with the expected four-byte tag.
    #[error("Bad chunk magic at offset {offset}: expected {expected:?}, found {found:?}")]
    BadMagic {
        offset: usize,
        expected: [u8; 4],
        found: [u8; 4],
    },

    /// A read ran past the end of the buffer (or of the current track chunk).
    #[error("Truncated stream: needed {needed} byte(s) at offset {offset}, {available} available")]
    TruncatedStream {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A byte that cannot start an event in the current decoder state.
    #[error("Unknown event syntax in track {track} at offset {offset}: byte {byte:#04x}")]
    UnknownEventSyntax { track: usize, offset: usize, byte: u8 },

    /// SMPTE or zero time division.
    #[error("Unsupported time division {0:#06x}")]
    UnsupportedTimeDivision(u16),

    #[error("Failed to read MIDI file: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The hardware clock refused to leave the suspended state.
    #[error("Audio hardware refused to resume: {0}")]
    ResumeRejected(String),

    #[error("Audio hardware unavailable: {0}")]
    HardwareUnavailable(String),
}
