use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Applied-event throughput over a sliding window of frames.
///
/// Counters are atomic so a reporting thread can read them while the frame
/// loop records. Sized at one frame rate's worth of frames the window sum is
/// events per second.
#[derive(Debug)]
pub struct EventRateMeter {
    frames: Vec<AtomicU32>,
    cursor: AtomicUsize,
    total: AtomicU64,
    peak: AtomicU32,
}

impl EventRateMeter {
    pub fn new(window_frames: usize) -> Self {
        Self {
            frames: (0..window_frames.max(1)).map(|_| AtomicU32::new(0)).collect(),
            cursor: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            peak: AtomicU32::new(0),
        }
    }

    /// Window sized for a frame rate in Hz.
    pub fn for_rate(hz: f64) -> Self {
        Self::new(hz.round().max(1.0) as usize)
    }

    /// Count events applied in the current frame.
    pub fn record(&self, events: usize) {
        let events = u32::try_from(events).unwrap_or(u32::MAX);
        let slot = self.cursor.load(Ordering::Relaxed);
        self.frames[slot].fetch_add(events, Ordering::Relaxed);
        self.total.fetch_add(u64::from(events), Ordering::Relaxed);
    }

    /// Close the current frame: fold the window into the peak and clear the
    /// oldest slot for reuse. Returns the window sum before rolling.
    pub fn end_frame(&self) -> u32 {
        let rate = self.rate();
        self.peak.fetch_max(rate, Ordering::Relaxed);

        let next = (self.cursor.load(Ordering::Relaxed) + 1) % self.frames.len();
        self.frames[next].store(0, Ordering::Relaxed);
        self.cursor.store(next, Ordering::Relaxed);
        rate
    }

    pub fn rate(&self) -> u32 {
        self.frames
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.load(Ordering::Relaxed)))
    }

    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for f in &self.frames {
            f.store(0, Ordering::Relaxed);
        }
        self.cursor.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_slides() {
        let meter = EventRateMeter::new(3);
        meter.record(5);
        assert_eq!(meter.end_frame(), 5);
        meter.record(2);
        assert_eq!(meter.end_frame(), 7);
        meter.record(1);
        assert_eq!(meter.end_frame(), 8);

        // Oldest frame (5) has been cleared.
        assert_eq!(meter.rate(), 3);
        assert_eq!(meter.peak(), 8);
        assert_eq!(meter.total(), 8);
    }

    #[test]
    fn test_rate_window_rounding() {
        let meter = EventRateMeter::for_rate(59.94);
        for _ in 0..60 {
            meter.record(1);
            meter.end_frame();
        }
        // Sixty frames recorded, window holds 60 slots with the next cleared.
        assert_eq!(meter.rate(), 59);
        assert_eq!(EventRateMeter::for_rate(0.0).frames.len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let meter = EventRateMeter::new(4);
        meter.record(10);
        meter.end_frame();
        meter.reset();
        assert_eq!(meter.rate(), 0);
        assert_eq!(meter.peak(), 0);
        assert_eq!(meter.total(), 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let meter = std::sync::Arc::new(EventRateMeter::new(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = std::sync::Arc::clone(&meter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(meter.rate(), 400);
        assert_eq!(meter.total(), 400);
    }
}
