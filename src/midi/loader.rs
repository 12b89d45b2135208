use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::DecodeError;
use crate::midi::cursor::ByteCursor;
use crate::midi::tempo::TempoMap;
use crate::midi::track_data::{decode_track, RawNoteEvent, RawTempoEvent, Track};

const HEADER_MAGIC: [u8; 4] = *b"MThd";
const TRACK_MAGIC: [u8; 4] = *b"MTrk";
const CANONICAL_HEADER_LEN: usize = 6;

/// Result of decoding a Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedMidi {
    pub format_type: u16,
    pub track_count: u16,
    pub time_division: u16,
    pub tracks: Vec<Track>,
}

impl DecodedMidi {
    /// Tempo markers from every track merged into tick order. The sort is
    /// stable, so markers sharing a tick keep their stream order.
    pub fn tempo_events(&self) -> Vec<RawTempoEvent> {
        let mut events: Vec<RawTempoEvent> = self
            .tracks
            .iter()
            .flat_map(|t| t.tempo_events().copied())
            .collect();
        events.sort_by_key(|e| e.tick);
        events
    }

    pub fn tempo_map(&self) -> TempoMap {
        TempoMap::build(&self.tempo_events(), self.time_division)
    }

    /// All notes with the index of the track they came from.
    pub fn notes(&self) -> impl Iterator<Item = (usize, &RawNoteEvent)> {
        self.tracks
            .iter()
            .enumerate()
            .flat_map(|(i, t)| t.notes().map(move |n| (i, n)))
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(Track::note_count).sum()
    }

    /// Tick at which the last note ends.
    pub fn last_tick(&self) -> u64 {
        self.notes().map(|(_, n)| n.end_tick()).max().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.tempo_map().ticks_to_seconds(self.last_tick())
    }
}

/// Decode a Standard MIDI File held in memory.
///
/// Track chunk boundaries are located first; the chunk bodies are then
/// decoded in parallel. Any error aborts the whole decode.
pub fn decode(buffer: &[u8]) -> Result<DecodedMidi, DecodeError> {
    let mut cursor = ByteCursor::new(buffer);

    let magic_offset = cursor.position();
    let magic = cursor.read_tag()?;
    if magic != HEADER_MAGIC {
        return Err(DecodeError::BadMagic {
            offset: magic_offset,
            expected: HEADER_MAGIC,
            found: magic,
        });
    }

    let header_len = cursor.read_u32_be()? as usize;
    let format_type = cursor.read_u16_be()?;
    let track_count = cursor.read_u16_be()?;
    let time_division = cursor.read_u16_be()?;
    if header_len > CANONICAL_HEADER_LEN {
        cursor.skip(header_len - CANONICAL_HEADER_LEN)?;
    }

    if time_division == 0 || (time_division & 0x8000) != 0 {
        return Err(DecodeError::UnsupportedTimeDivision(time_division));
    }

    log::debug!(
        "MIDI header: format {}, {} track(s), {} ticks per quarter note",
        format_type,
        track_count,
        time_division
    );

    let mut chunks = Vec::with_capacity(usize::from(track_count));
    for _ in 0..track_count {
        let tag_offset = cursor.position();
        let tag = cursor.read_tag()?;
        if tag != TRACK_MAGIC {
            return Err(DecodeError::BadMagic {
                offset: tag_offset,
                expected: TRACK_MAGIC,
                found: tag,
            });
        }
        let length = cursor.read_u32_be()? as usize;
        let base = cursor.position();
        let body = cursor.read_bytes(length)?;
        chunks.push((base, body));
    }

    let tracks = chunks
        .par_iter()
        .enumerate()
        .map(|(index, &(base, body))| decode_track(index, body, base))
        .collect::<Result<Vec<Track>, DecodeError>>()?;

    for track in &tracks {
        log::debug!(
            "{}: {} note(s), {} tempo change(s)",
            track.name,
            track.note_count(),
            track.tempo_events().count()
        );
    }

    Ok(DecodedMidi {
        format_type,
        track_count,
        time_division,
        tracks,
    })
}

/// Read and decode a MIDI file from disk.
pub fn load_midi_file<P: AsRef<Path>>(filename: P) -> Result<DecodedMidi, DecodeError> {
    let data = std::fs::read(&filename)?;
    log::info!(
        "Loaded {} ({} bytes)",
        filename.as_ref().display(),
        data.len()
    );
    decode(&data)
}
