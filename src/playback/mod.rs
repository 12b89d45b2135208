//! Live playback: the audio-driven clock, the per-frame scheduler and the
//! note event queue between them.
//!
//! Everything here runs on one cooperative turn per frame. The only shared
//! state for multi-threaded hosts is [`SharedEventQueue`], where one lock
//! covers the queue, its slot pool and the active note registry.

pub mod clock;
pub mod frame_loop;
pub mod hardware;
pub mod queue;
pub mod rate_meter;
pub mod registry;
pub mod scheduler;
pub mod timeline;

pub use clock::{EndedCallback, PlaybackClock, PlaybackClockState};
pub use frame_loop::{spawn_frame_loop, FrameLoopHandle};
pub use hardware::{
    AudioBuffer, AudioHardware, AudioSource, EndedNotifier, HardwareState, SimulatedHardware,
    SystemHardware,
};
pub use queue::{EventQueue, QueuedEvent, SharedEventQueue};
pub use rate_meter::EventRateMeter;
pub use registry::{ActiveNote, ActiveNoteRegistry};
pub use scheduler::{FrameContext, FrameScheduler};
pub use timeline::{NoteCue, NoteTimeline, Playhead};
