use crate::config::SchedulerConfig;
use crate::playback::queue::{EventQueue, QueuedEvent};

/// Per-frame state handed back to the caller after each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub frame_index: u64,
    pub timestamp: f64,
    /// Delta since the previous frame, clamped to the configured ceiling.
    pub delta_seconds: f64,
    /// Delta before clamping.
    pub raw_delta_seconds: f64,
    pub applied_events: usize,
    pub pending_events: usize,
}

impl FrameContext {
    pub fn was_clamped(&self) -> bool {
        self.raw_delta_seconds > self.delta_seconds
    }
}

/// The per-frame callback: drains a bounded batch from the event queue and
/// tracks the delta between consecutive refresh timestamps.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    config: SchedulerConfig,
    last_timestamp: Option<f64>,
    frame_index: u64,
}

impl FrameScheduler {
    /// A `max_batch` of 0 would never drain the queue and is raised to 1.
    pub fn new(mut config: SchedulerConfig) -> Self {
        if config.max_batch == 0 {
            log::warn!("max_batch of 0 raised to 1");
            config.max_batch = 1;
        }
        FrameScheduler {
            config,
            last_timestamp: None,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frame_index
    }

    /// Forget the previous timestamp; the next frame reports a zero delta.
    pub fn reset(&mut self) {
        self.last_timestamp = None;
    }

    /// Run one frame at `timestamp` seconds on the refresh clock.
    pub fn on_frame<F>(
        &mut self,
        timestamp: f64,
        queue: &mut EventQueue,
        on_event: F,
    ) -> FrameContext
    where
        F: FnMut(&QueuedEvent),
    {
        let raw_delta = match self.last_timestamp {
            Some(last) => (timestamp - last).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp);

        let delta = raw_delta.min(self.config.max_frame_delta);
        if raw_delta > delta {
            log::debug!(
                "Frame {}: delta {:.3}s clamped to {:.3}s",
                self.frame_index,
                raw_delta,
                delta
            );
        }

        let applied = queue.process_event_queue(self.config.max_batch, on_event);
        let context = FrameContext {
            frame_index: self.frame_index,
            timestamp,
            delta_seconds: delta,
            raw_delta_seconds: raw_delta,
            applied_events: applied,
            pending_events: queue.len(),
        };
        self.frame_index += 1;
        context
    }
}
