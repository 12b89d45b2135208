use serde::Serialize;

use crate::midi::{DecodedMidi, TempoMap};
use crate::playback::queue::EventQueue;

/// A decoded note placed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteCue {
    pub track: usize,
    pub note: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

/// Every note of a file in seconds, sorted by start time, able to emit the
/// note-on and note-off intents that fall inside a playback window.
#[derive(Debug, Clone, Default)]
pub struct NoteTimeline {
    cues: Vec<NoteCue>,
}

impl NoteTimeline {
    pub fn new(mut cues: Vec<NoteCue>) -> Self {
        cues.sort_by(|a, b| a.start.total_cmp(&b.start));
        NoteTimeline { cues }
    }

    pub fn from_midi(midi: &DecodedMidi) -> Self {
        Self::with_tempo_map(midi, &midi.tempo_map())
    }

    pub fn with_tempo_map(midi: &DecodedMidi, tempo: &TempoMap) -> Self {
        let cues = midi
            .notes()
            .map(|(track, n)| NoteCue {
                track,
                note: n.note_number,
                velocity: n.velocity,
                start: tempo.ticks_to_seconds(n.start_tick),
                end: tempo.ticks_to_seconds(n.end_tick()),
            })
            .collect();
        Self::new(cues)
    }

    pub fn cues(&self) -> &[NoteCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Time the last note ends.
    pub fn end_time(&self) -> f64 {
        self.cues.iter().map(|c| c.end).fold(0.0, f64::max)
    }

    /// Notes sounding at `time`.
    pub fn active_at(&self, time: f64) -> impl Iterator<Item = &NoteCue> {
        let upto = self.cues.partition_point(|c| c.start <= time);
        self.cues[..upto].iter().filter(move |c| c.end > time)
    }

    /// Queue the note boundaries inside `[from, to)` in time order. At equal
    /// times note-offs go first, except that a zero-length note is switched
    /// on before it is switched off. Returns the number of intents queued.
    pub fn feed(&self, queue: &mut EventQueue, from: f64, to: f64) -> usize {
        if to <= from {
            return 0;
        }
        self.feed_window(queue, from, |t| t < to)
    }

    /// Queue every boundary at or after `from`, including those exactly at
    /// [`end_time`](Self::end_time).
    pub fn feed_remaining(&self, queue: &mut EventQueue, from: f64) -> usize {
        self.feed_window(queue, from, |_| true)
    }

    fn feed_window<F>(&self, queue: &mut EventQueue, from: f64, before_end: F) -> usize
    where
        F: Fn(f64) -> bool,
    {
        let in_window = |t: f64| t >= from && before_end(t);

        // (time, order, cue): order 0 = off, 1 = on, 2 = off of a zero-length note
        let mut boundaries: Vec<(f64, u8, &NoteCue)> = Vec::new();
        let upto = self.cues.partition_point(|c| before_end(c.start));
        for cue in &self.cues[..upto] {
            if in_window(cue.start) {
                boundaries.push((cue.start, 1, cue));
            }
            if in_window(cue.end) {
                let order = if cue.end <= cue.start { 2 } else { 0 };
                boundaries.push((cue.end, order, cue));
            }
        }
        boundaries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for &(_, order, cue) in &boundaries {
            if order == 1 {
                queue.enqueue_note_on(cue.note, cue.velocity, cue.start, cue.end);
            } else {
                queue.enqueue_note_off(cue.note);
            }
        }
        boundaries.len()
    }
}

/// How far a [`NoteTimeline`] has been fed into an event queue.
///
/// Each frame calls [`advance`](Self::advance) with the clock's current
/// time. When the audio ends before the clock passes the last note,
/// [`finish`](Self::finish) flushes the rest so no note is left sounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playhead {
    position: f64,
    finished: bool,
}

impl Playhead {
    pub fn new(position: f64) -> Self {
        Playhead {
            position,
            finished: false,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Every boundary of the timeline has been queued.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Queue the boundaries between the last position and `now`. Finishes
    /// once `now` is past the end of the timeline.
    pub fn advance(&mut self, timeline: &NoteTimeline, queue: &mut EventQueue, now: f64) -> usize {
        if self.finished || now <= self.position {
            return 0;
        }
        let queued = timeline.feed(queue, self.position, now);
        self.position = now;
        if now > timeline.end_time() {
            self.finished = true;
        }
        queued
    }

    /// Queue everything left, including boundaries at the end time.
    pub fn finish(&mut self, timeline: &NoteTimeline, queue: &mut EventQueue) -> usize {
        if self.finished {
            return 0;
        }
        let queued = timeline.feed_remaining(queue, self.position);
        self.position = self.position.max(timeline.end_time());
        self.finished = true;
        queued
    }
}
