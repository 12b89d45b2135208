use std::borrow::Cow;

use serde::Serialize;

use crate::midi::track_data::RawTempoEvent;

/// 120 BPM, used when a file carries no tempo event at tick 0.
pub const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

/// Anchor translating a tick into cumulative seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoBreakpoint {
    pub tick: u64,
    pub microseconds_per_beat: u32,
    pub cumulative_seconds: f64,
}

impl TempoBreakpoint {
    #[inline]
    fn seconds_per_tick(&self, division: f64) -> f64 {
        f64::from(self.microseconds_per_beat) / 1e6 / division
    }
}

/// Piecewise-linear tick to seconds mapping.
///
/// Breakpoints are sorted by tick with strictly increasing ticks, the first
/// one sits at tick 0 and cumulative seconds never decrease.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoMap {
    time_division: u16,
    breakpoints: Vec<TempoBreakpoint>,
}

impl TempoMap {
    /// Build the breakpoint table from tempo events in tick order.
    ///
    /// Each breakpoint's seconds are accumulated with the tempo of the
    /// segment before it. Events sharing a tick collapse into one breakpoint
    /// carrying the last tempo.
    pub fn build(events: &[RawTempoEvent], time_division: u16) -> Self {
        let events: Cow<'_, [RawTempoEvent]> = if events.is_sorted_by_key(|e| e.tick) {
            Cow::Borrowed(events)
        } else {
            log::warn!("Tempo events out of tick order, sorting before building the map");
            let mut sorted = events.to_vec();
            sorted.sort_by_key(|e| e.tick);
            Cow::Owned(sorted)
        };

        let division = f64::from(time_division.max(1));
        let mut breakpoints: Vec<TempoBreakpoint> = Vec::with_capacity(events.len() + 1);

        if events.first().is_none_or(|e| e.tick > 0) {
            breakpoints.push(TempoBreakpoint {
                tick: 0,
                microseconds_per_beat: DEFAULT_MICROSECONDS_PER_BEAT,
                cumulative_seconds: 0.0,
            });
        }

        for event in events.iter() {
            if let Some(last) = breakpoints.last_mut() {
                if last.tick == event.tick {
                    last.microseconds_per_beat = event.microseconds_per_beat;
                    continue;
                }
            }

            let cumulative_seconds = match breakpoints.last() {
                Some(prev) => {
                    prev.cumulative_seconds
                        + (event.tick - prev.tick) as f64 * prev.seconds_per_tick(division)
                }
                None => 0.0,
            };
            breakpoints.push(TempoBreakpoint {
                tick: event.tick,
                microseconds_per_beat: event.microseconds_per_beat,
                cumulative_seconds,
            });
        }

        TempoMap {
            time_division,
            breakpoints,
        }
    }

    pub fn time_division(&self) -> u16 {
        self.time_division
    }

    pub fn breakpoints(&self) -> &[TempoBreakpoint] {
        &self.breakpoints
    }

    fn division(&self) -> f64 {
        f64::from(self.time_division.max(1))
    }

    /// Seconds elapsed at `tick`.
    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        // The first breakpoint is at tick 0, so the index is at least 1.
        let idx = self.breakpoints.partition_point(|b| b.tick <= tick);
        let bp = &self.breakpoints[idx.saturating_sub(1)];
        bp.cumulative_seconds + (tick - bp.tick) as f64 * bp.seconds_per_tick(self.division())
    }

    /// Fractional tick reached after `seconds`. Negative input maps to 0.
    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        let idx = self
            .breakpoints
            .partition_point(|b| b.cumulative_seconds <= seconds);
        let bp = &self.breakpoints[idx.saturating_sub(1)];
        bp.tick as f64 + (seconds - bp.cumulative_seconds) / bp.seconds_per_tick(self.division())
    }
}

/// Anything a tempo map can be obtained from.
///
/// A built [`TempoMap`] is used as-is; a raw event list is turned into
/// breakpoints on demand.
pub trait TempoSource {
    fn tempo_map(&self, time_division: u16) -> Cow<'_, TempoMap>;
}

impl TempoSource for TempoMap {
    fn tempo_map(&self, time_division: u16) -> Cow<'_, TempoMap> {
        if self.time_division == time_division {
            return Cow::Borrowed(self);
        }
        let events: Vec<RawTempoEvent> = self
            .breakpoints
            .iter()
            .map(|b| RawTempoEvent {
                tick: b.tick,
                microseconds_per_beat: b.microseconds_per_beat,
            })
            .collect();
        Cow::Owned(TempoMap::build(&events, time_division))
    }
}

impl TempoSource for [RawTempoEvent] {
    fn tempo_map(&self, time_division: u16) -> Cow<'_, TempoMap> {
        Cow::Owned(TempoMap::build(self, time_division))
    }
}

impl TempoSource for Vec<RawTempoEvent> {
    fn tempo_map(&self, time_division: u16) -> Cow<'_, TempoMap> {
        self.as_slice().tempo_map(time_division)
    }
}

pub fn ticks_to_seconds<S: TempoSource + ?Sized>(tick: u64, source: &S, time_division: u16) -> f64 {
    source.tempo_map(time_division).ticks_to_seconds(tick)
}

pub fn seconds_to_ticks<S: TempoSource + ?Sized>(
    seconds: f64,
    source: &S,
    time_division: u16,
) -> f64 {
    source.tempo_map(time_division).seconds_to_ticks(seconds)
}
