//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How frame callbacks are driven.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FrameMode {
    /// Once per display refresh at the given rate.
    DisplayRefresh { hz: f64 },
    /// Fixed timer interval, independent of the display.
    #[serde(rename_all = "camelCase")]
    FixedRate { interval_ms: u64 },
}

impl FrameMode {
    pub fn interval(&self) -> Duration {
        match *self {
            FrameMode::DisplayRefresh { hz } if hz > 0.0 => Duration::from_secs_f64(1.0 / hz),
            FrameMode::DisplayRefresh { .. } => Duration::from_secs_f64(1.0 / 60.0),
            FrameMode::FixedRate { interval_ms } => Duration::from_millis(interval_ms.max(1)),
        }
    }
}

impl Default for FrameMode {
    fn default() -> Self {
        FrameMode::DisplayRefresh { hz: 60.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Most queued events applied in one frame. 0 is treated as 1.
    pub max_batch: usize,
    /// Ceiling for the per-frame delta, in seconds.
    pub max_frame_delta: f64,
    pub frame_mode: FrameMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_batch: 64,
            max_frame_delta: 0.1,
            frame_mode: FrameMode::default(),
        }
    }
}
