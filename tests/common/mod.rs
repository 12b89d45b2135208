//! Builders for synthetic Standard MIDI File buffers.

#![allow(dead_code)]

pub fn var_len(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    bytes
}

pub fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
    let mut out = b"MThd".to_vec();
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&tracks.to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    out
}

/// Accumulates delta-timed events for one track chunk.
#[derive(Default)]
pub struct TrackBuilder {
    body: Vec<u8>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw event bytes after a delta time, status byte included or not.
    pub fn event(mut self, delta: u32, bytes: &[u8]) -> Self {
        self.body.extend(var_len(delta));
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn note_on(self, delta: u32, channel: u8, note: u8, velocity: u8) -> Self {
        self.event(delta, &[0x90 | channel, note, velocity])
    }

    pub fn note_off(self, delta: u32, channel: u8, note: u8) -> Self {
        self.event(delta, &[0x80 | channel, note, 0])
    }

    pub fn tempo(self, delta: u32, microseconds_per_beat: u32) -> Self {
        let b = microseconds_per_beat.to_be_bytes();
        self.event(delta, &[0xFF, 0x51, 0x03, b[1], b[2], b[3]])
    }

    pub fn name(self, delta: u32, name: &str) -> Self {
        let mut bytes = vec![0xFF, 0x03];
        bytes.extend(var_len(name.len() as u32));
        bytes.extend_from_slice(name.as_bytes());
        self.event(delta, &bytes)
    }

    pub fn end(self) -> Self {
        self.event(0, &[0xFF, 0x2F, 0x00])
    }

    pub fn chunk(&self) -> Vec<u8> {
        let mut out = b"MTrk".to_vec();
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn smf(format: u16, division: u16, tracks: &[TrackBuilder]) -> Vec<u8> {
    let mut out = header(format, tracks.len() as u16, division);
    for track in tracks {
        out.extend(track.chunk());
    }
    out
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
