use serde::Serialize;

use crate::error::DecodeError;
use crate::midi::cursor::ByteCursor;

const META_EVENT: u8 = 0xFF;
const SYSEX_START: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_SET_TEMPO: u8 = 0x51;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const PROGRAM_CHANGE: u8 = 0xC0;
const CHANNEL_PRESSURE: u8 = 0xD0;

/// A note recovered from a matched note-on / note-off pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNoteEvent {
    pub channel: u8,
    pub note_number: u8,
    pub velocity: u8,
    pub start_tick: u64,
    pub duration_ticks: u64,
}

impl RawNoteEvent {
    #[inline]
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.duration_ticks
    }
}

/// A set-tempo meta event at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTempoEvent {
    pub tick: u64,
    pub microseconds_per_beat: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrackEvent {
    Note(RawNoteEvent),
    Tempo(RawTempoEvent),
}

/// One decoded track chunk.
///
/// Note events appear in the order their note-off was read; tempo markers
/// appear in stream order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub name: String,
    pub events: Vec<TrackEvent>,
}

impl Track {
    pub fn new(index: usize) -> Self {
        Track {
            name: format!("Track {}", index + 1),
            events: Vec::new(),
        }
    }

    pub fn notes(&self) -> impl Iterator<Item = &RawNoteEvent> {
        self.events.iter().filter_map(|e| match e {
            TrackEvent::Note(n) => Some(n),
            TrackEvent::Tempo(_) => None,
        })
    }

    pub fn tempo_events(&self) -> impl Iterator<Item = &RawTempoEvent> {
        self.events.iter().filter_map(|e| match e {
            TrackEvent::Tempo(t) => Some(t),
            TrackEvent::Note(_) => None,
        })
    }

    pub fn note_count(&self) -> usize {
        self.notes().count()
    }
}

/// Where the per-event loop stands.
///
/// A data byte seen in `AwaitingStatus` is never consumed there: the state
/// moves to `AwaitingData` with the running status and the byte is read as
/// the event's first data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeState {
    AwaitingDeltaTime,
    AwaitingStatus,
    AwaitingData(u8),
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    start_tick: u64,
    velocity: u8,
}

/// Decoder for the body of a single `MTrk` chunk.
pub(crate) struct TrackDecoder<'a> {
    index: usize,
    cursor: ByteCursor<'a>,
    tick: u64,
    running_status: Option<u8>,
    // Indexed by channel * 128 + note.
    pending: Vec<Option<PendingNote>>,
    track: Track,
}

impl<'a> TrackDecoder<'a> {
    pub(crate) fn new(index: usize, data: &'a [u8], base: usize) -> Self {
        TrackDecoder {
            index,
            cursor: ByteCursor::with_base(data, base),
            tick: 0,
            running_status: None,
            pending: vec![None; 16 * 128],
            track: Track::new(index),
        }
    }

    /// Advance the state machine by one transition.
    pub(crate) fn step(&mut self, state: DecodeState) -> Result<DecodeState, DecodeError> {
        match state {
            DecodeState::AwaitingDeltaTime => {
                if self.cursor.is_empty() {
                    return Ok(DecodeState::Finished);
                }
                let delta = self.cursor.read_var_len()?;
                self.tick += u64::from(delta);
                Ok(DecodeState::AwaitingStatus)
            }
            DecodeState::AwaitingStatus => {
                let byte = self.cursor.peek_u8()?;
                if byte & 0x80 != 0 {
                    self.cursor.read_u8()?;
                    // Meta and sysex events do not take part in running status.
                    if byte < 0xF0 {
                        self.running_status = Some(byte);
                    }
                    Ok(DecodeState::AwaitingData(byte))
                } else {
                    match self.running_status {
                        Some(status) => Ok(DecodeState::AwaitingData(status)),
                        None => Err(DecodeError::UnknownEventSyntax {
                            track: self.index,
                            offset: self.cursor.position(),
                            byte,
                        }),
                    }
                }
            }
            DecodeState::AwaitingData(status) => self.read_event(status),
            DecodeState::Finished => Ok(DecodeState::Finished),
        }
    }

    pub(crate) fn run(mut self) -> Result<Track, DecodeError> {
        let mut state = DecodeState::AwaitingDeltaTime;
        while state != DecodeState::Finished {
            state = self.step(state)?;
        }
        let open = self.pending.iter().filter(|p| p.is_some()).count();
        if open > 0 {
            log::debug!(
                "{}: discarding {} note(s) still open at end of track",
                self.track.name,
                open
            );
        }
        Ok(self.track)
    }

    fn read_event(&mut self, status: u8) -> Result<DecodeState, DecodeError> {
        match status {
            META_EVENT => self.read_meta_event(),
            SYSEX_START | SYSEX_ESCAPE => {
                let len = self.cursor.read_var_len()? as usize;
                self.cursor.skip(len)?;
                Ok(DecodeState::AwaitingDeltaTime)
            }
            0xF1..=0xFE => Err(DecodeError::UnknownEventSyntax {
                track: self.index,
                offset: self.cursor.position().saturating_sub(1),
                byte: status,
            }),
            _ => {
                self.read_channel_event(status)?;
                Ok(DecodeState::AwaitingDeltaTime)
            }
        }
    }

    fn read_meta_event(&mut self) -> Result<DecodeState, DecodeError> {
        let meta_type = self.cursor.read_u8()?;
        let len = self.cursor.read_var_len()? as usize;
        let payload = self.cursor.read_bytes(len)?;

        match meta_type {
            META_TRACK_NAME => {
                // One char per byte; no multi-byte decoding.
                self.track.name = payload.iter().map(|&b| char::from(b)).collect();
            }
            META_SET_TEMPO if payload.len() == 3 => {
                let microseconds_per_beat = (u32::from(payload[0]) << 16)
                    | (u32::from(payload[1]) << 8)
                    | u32::from(payload[2]);
                if microseconds_per_beat > 0 {
                    self.track.events.push(TrackEvent::Tempo(RawTempoEvent {
                        tick: self.tick,
                        microseconds_per_beat,
                    }));
                }
            }
            META_END_OF_TRACK => return Ok(DecodeState::Finished),
            _ => {}
        }
        Ok(DecodeState::AwaitingDeltaTime)
    }

    fn read_channel_event(&mut self, status: u8) -> Result<(), DecodeError> {
        let kind = status & 0xF0;
        let channel = status & 0x0F;

        let data1 = self.cursor.read_u8()?;
        let data2 = match kind {
            PROGRAM_CHANGE | CHANNEL_PRESSURE => 0,
            _ => self.cursor.read_u8()?,
        };

        match kind {
            NOTE_ON if data2 > 0 => self.open_note(channel, data1, data2),
            NOTE_ON | NOTE_OFF => self.close_note(channel, data1),
            _ => {}
        }
        Ok(())
    }

    #[inline]
    fn slot(channel: u8, note: u8) -> usize {
        usize::from(channel & 0x0F) * 128 + usize::from(note & 0x7F)
    }

    fn open_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.pending[Self::slot(channel, note)] = Some(PendingNote {
            start_tick: self.tick,
            velocity,
        });
    }

    fn close_note(&mut self, channel: u8, note: u8) {
        if let Some(open) = self.pending[Self::slot(channel, note)].take() {
            self.track.events.push(TrackEvent::Note(RawNoteEvent {
                channel,
                note_number: note & 0x7F,
                velocity: open.velocity,
                start_tick: open.start_tick,
                duration_ticks: self.tick - open.start_tick,
            }));
        }
    }
}

/// Decode the body of one track chunk. `base` is the chunk body's offset in
/// the whole file, used for error positions.
pub(crate) fn decode_track(index: usize, data: &[u8], base: usize) -> Result<Track, DecodeError> {
    TrackDecoder::new(index, data, base).run()
}
