//! Standard MIDI File decoding and tick to seconds conversion.

pub mod cursor;
pub mod loader;
pub mod tempo;
pub mod track_data;

pub use cursor::ByteCursor;
pub use loader::{decode, load_midi_file, DecodedMidi};
pub use tempo::{
    seconds_to_ticks, ticks_to_seconds, TempoBreakpoint, TempoMap, TempoSource,
    DEFAULT_MICROSECONDS_PER_BEAT,
};
pub use track_data::{RawNoteEvent, RawTempoEvent, Track, TrackEvent};
