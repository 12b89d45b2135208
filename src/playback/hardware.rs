//! Audio hardware clock abstraction.
//!
//! The playback clock never reads wall time directly: it samples an
//! [`AudioHardware`] clock and plays buffers through the sources it creates.
//! [`SystemHardware`] runs against the monotonic system clock;
//! [`SimulatedHardware`] is advanced by hand, for tests and offline runs.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, Sender};
use parking_lot::Mutex;

use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareState {
    Running,
    Suspended,
}

/// Decoded audio, one sample vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        AudioBuffer {
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    /// A silent buffer of the given length, for hosts that only need timing.
    pub fn silent(sample_rate: u32, channel_count: usize, seconds: f64) -> Self {
        let frames = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
        Self::new(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Completion signal a source fires when it plays to the end on its own.
///
/// Carries the generation of the source it was issued to, so the clock can
/// tell a live source's completion from a stale one.
#[derive(Debug, Clone)]
pub struct EndedNotifier {
    generation: u64,
    tx: Sender<u64>,
}

impl EndedNotifier {
    pub(crate) fn new(generation: u64, tx: Sender<u64>) -> Self {
        EndedNotifier { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self) {
        let _ = self.tx.send(self.generation);
    }
}

/// A one-shot playable source created for a buffer.
pub trait AudioSource: Send {
    /// Install or clear the completion signal.
    fn set_on_ended(&mut self, notifier: Option<EndedNotifier>);

    /// Begin playback `offset_seconds` into the buffer.
    fn start(&mut self, offset_seconds: f64);

    /// Stop playback. Does not fire the completion signal.
    fn stop(&mut self);
}

pub trait AudioHardware {
    type Source: AudioSource;

    /// Hardware time in seconds. Only advances while running.
    fn current_time(&self) -> f64;

    fn state(&self) -> HardwareState;

    fn resume(&mut self) -> Result<(), PlaybackError>;

    fn create_source(&mut self, buffer: Arc<AudioBuffer>) -> Result<Self::Source, PlaybackError>;
}

// How often a source's timer rechecks a suspended clock.
const SUSPENDED_POLL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct SystemClock {
    epoch: Instant,
    paused_total: Duration,
    suspended_at: Option<Instant>,
}

impl SystemClock {
    fn now(&self) -> f64 {
        let now = self.suspended_at.unwrap_or_else(Instant::now);
        now.duration_since(self.epoch)
            .saturating_sub(self.paused_total)
            .as_secs_f64()
    }

    fn is_suspended(&self) -> bool {
        self.suspended_at.is_some()
    }
}

/// Hardware clock backed by [`Instant`].
///
/// Suspension freezes the reported time; resuming continues from the frozen
/// value. Sources created here share the clock, so a suspended clock also
/// holds back their completion.
#[derive(Debug)]
pub struct SystemHardware {
    clock: Arc<Mutex<SystemClock>>,
}

impl Default for SystemHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHardware {
    pub fn new() -> Self {
        SystemHardware {
            clock: Arc::new(Mutex::new(SystemClock {
                epoch: Instant::now(),
                paused_total: Duration::ZERO,
                suspended_at: None,
            })),
        }
    }

    pub fn suspend(&mut self) {
        let mut clock = self.clock.lock();
        if clock.suspended_at.is_none() {
            clock.suspended_at = Some(Instant::now());
        }
    }
}

impl AudioHardware for SystemHardware {
    type Source = SystemSource;

    fn current_time(&self) -> f64 {
        self.clock.lock().now()
    }

    fn state(&self) -> HardwareState {
        if self.clock.lock().is_suspended() {
            HardwareState::Suspended
        } else {
            HardwareState::Running
        }
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        let mut clock = self.clock.lock();
        if let Some(at) = clock.suspended_at.take() {
            clock.paused_total += at.elapsed();
        }
        Ok(())
    }

    fn create_source(&mut self, buffer: Arc<AudioBuffer>) -> Result<SystemSource, PlaybackError> {
        Ok(SystemSource {
            buffer,
            clock: Arc::clone(&self.clock),
            notifier: Arc::new(Mutex::new(None)),
            stop_tx: None,
        })
    }
}

/// Source that produces no sound but ends on time: a timer thread fires the
/// completion signal once the hardware clock has run for the remaining
/// buffer duration. Time spent suspended does not count.
pub struct SystemSource {
    buffer: Arc<AudioBuffer>,
    clock: Arc<Mutex<SystemClock>>,
    notifier: Arc<Mutex<Option<EndedNotifier>>>,
    stop_tx: Option<Sender<()>>,
}

impl AudioSource for SystemSource {
    fn set_on_ended(&mut self, notifier: Option<EndedNotifier>) {
        *self.notifier.lock() = notifier;
    }

    fn start(&mut self, offset_seconds: f64) {
        self.stop();
        let remaining = (self.buffer.duration() - offset_seconds).max(0.0);
        let clock = Arc::clone(&self.clock);
        let ends_at = clock.lock().now() + remaining;
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let notifier = Arc::clone(&self.notifier);
        thread::spawn(move || {
            loop {
                let wait = {
                    let clock = clock.lock();
                    let now = clock.now();
                    if clock.is_suspended() {
                        SUSPENDED_POLL
                    } else if now >= ends_at {
                        break;
                    } else {
                        Duration::from_secs_f64(ends_at - now)
                    }
                };
                select! {
                    recv(after(wait)) -> _ => {}
                    recv(stop_rx) -> _ => return,
                }
            }
            if let Some(n) = notifier.lock().as_ref() {
                n.notify();
            }
        });
        self.stop_tx = Some(stop_tx);
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl Drop for SystemSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug)]
struct SimVoice {
    duration: f64,
    started_at: Option<f64>,
    offset: f64,
    notifier: Option<EndedNotifier>,
}

#[derive(Debug)]
struct SimState {
    time: f64,
    state: HardwareState,
    resume_failure: Option<String>,
    source_failure: Option<String>,
    sources_created: usize,
    start_offsets: Vec<f64>,
    stops: usize,
    voices: Vec<Weak<Mutex<SimVoice>>>,
}

/// Deterministic hardware clock. Clones share the same clock, so a test can
/// keep one handle to advance time while the playback clock owns another.
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    inner: Arc<Mutex<SimState>>,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHardware {
    pub fn new() -> Self {
        SimulatedHardware {
            inner: Arc::new(Mutex::new(SimState {
                time: 0.0,
                state: HardwareState::Running,
                resume_failure: None,
                source_failure: None,
                sources_created: 0,
                start_offsets: Vec::new(),
                stops: 0,
                voices: Vec::new(),
            })),
        }
    }

    /// Move hardware time forward, if running, and fire the completion
    /// signal of every source that reached the end of its buffer.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.inner.lock();
        if state.state == HardwareState::Suspended {
            return;
        }
        state.time += seconds.max(0.0);
        let now = state.time;

        state.voices.retain(|weak| {
            let Some(voice) = weak.upgrade() else {
                return false;
            };
            let mut voice = voice.lock();
            if let Some(started) = voice.started_at {
                if now - started >= voice.duration - voice.offset {
                    voice.started_at = None;
                    if let Some(n) = voice.notifier.as_ref() {
                        n.notify();
                    }
                }
            }
            true
        });
    }

    pub fn suspend(&self) {
        self.inner.lock().state = HardwareState::Suspended;
    }

    /// Make the next `resume` calls fail with `reason`, or succeed again
    /// with `None`.
    pub fn set_resume_failure(&self, reason: Option<&str>) {
        self.inner.lock().resume_failure = reason.map(str::to_owned);
    }

    /// Make `create_source` fail with `reason`, or succeed again with `None`.
    pub fn set_source_failure(&self, reason: Option<&str>) {
        self.inner.lock().source_failure = reason.map(str::to_owned);
    }

    pub fn sources_created(&self) -> usize {
        self.inner.lock().sources_created
    }

    /// Buffer offsets passed to `start`, in call order.
    pub fn start_offsets(&self) -> Vec<f64> {
        self.inner.lock().start_offsets.clone()
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().stops
    }
}

impl AudioHardware for SimulatedHardware {
    type Source = SimulatedSource;

    fn current_time(&self) -> f64 {
        self.inner.lock().time
    }

    fn state(&self) -> HardwareState {
        self.inner.lock().state
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        let mut state = self.inner.lock();
        if let Some(reason) = state.resume_failure.clone() {
            return Err(PlaybackError::ResumeRejected(reason));
        }
        state.state = HardwareState::Running;
        Ok(())
    }

    fn create_source(
        &mut self,
        buffer: Arc<AudioBuffer>,
    ) -> Result<SimulatedSource, PlaybackError> {
        if let Some(reason) = self.inner.lock().source_failure.clone() {
            return Err(PlaybackError::HardwareUnavailable(reason));
        }
        let voice = Arc::new(Mutex::new(SimVoice {
            duration: buffer.duration(),
            started_at: None,
            offset: 0.0,
            notifier: None,
        }));
        let mut state = self.inner.lock();
        state.sources_created += 1;
        state.voices.push(Arc::downgrade(&voice));
        Ok(SimulatedSource {
            voice,
            hardware: Arc::clone(&self.inner),
        })
    }
}

pub struct SimulatedSource {
    voice: Arc<Mutex<SimVoice>>,
    hardware: Arc<Mutex<SimState>>,
}

impl AudioSource for SimulatedSource {
    fn set_on_ended(&mut self, notifier: Option<EndedNotifier>) {
        self.voice.lock().notifier = notifier;
    }

    fn start(&mut self, offset_seconds: f64) {
        let now = {
            let mut hw = self.hardware.lock();
            hw.start_offsets.push(offset_seconds);
            hw.time
        };
        let mut voice = self.voice.lock();
        voice.started_at = Some(now);
        voice.offset = offset_seconds;
    }

    fn stop(&mut self) {
        self.hardware.lock().stops += 1;
        self.voice.lock().started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::new(4, vec![vec![0.0; 10], vec![0.0; 6]]);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 10);
        assert_eq!(buffer.duration(), 2.5);
        assert_eq!(buffer.channel(1).map(<[f32]>::len), Some(6));
        assert!(buffer.channel(2).is_none());

        let silent = AudioBuffer::silent(100, 1, 1.5);
        assert_eq!(silent.frames(), 150);
    }

    #[test]
    fn test_simulated_source_ends_once() {
        let mut hw = SimulatedHardware::new();
        let (tx, rx) = unbounded();
        let mut source = hw
            .create_source(Arc::new(AudioBuffer::silent(10, 1, 2.0)))
            .unwrap();
        source.set_on_ended(Some(EndedNotifier::new(7, tx)));
        source.start(0.5);

        hw.advance(1.0);
        assert!(rx.try_recv().is_err());
        hw.advance(0.5);
        assert_eq!(rx.try_recv().unwrap(), 7);
        hw.advance(5.0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hw.start_offsets(), [0.5]);
    }

    #[test]
    fn test_simulated_stop_suppresses_end() {
        let mut hw = SimulatedHardware::new();
        let (tx, rx) = unbounded();
        let mut source = hw
            .create_source(Arc::new(AudioBuffer::silent(10, 1, 1.0)))
            .unwrap();
        source.set_on_ended(Some(EndedNotifier::new(1, tx)));
        source.start(0.0);
        source.stop();
        hw.advance(2.0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hw.stops(), 1);
    }

    #[test]
    fn test_simulated_suspend_freezes_time() {
        let mut hw = SimulatedHardware::new();
        hw.advance(1.0);
        hw.suspend();
        hw.advance(3.0);
        assert_eq!(hw.current_time(), 1.0);
        assert_eq!(hw.state(), HardwareState::Suspended);

        hw.set_resume_failure(Some("no device"));
        assert_eq!(
            hw.resume(),
            Err(PlaybackError::ResumeRejected("no device".to_string()))
        );
        hw.set_resume_failure(None);
        hw.resume().unwrap();
        hw.advance(1.0);
        assert_eq!(hw.current_time(), 2.0);
    }

    #[test]
    fn test_system_hardware_suspend() {
        let mut hw = SystemHardware::new();
        hw.suspend();
        let frozen = hw.current_time();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(hw.current_time(), frozen);
        assert_eq!(hw.state(), HardwareState::Suspended);
        hw.resume().unwrap();
        assert_eq!(hw.state(), HardwareState::Running);
        assert!(hw.current_time() >= frozen);
    }

    #[test]
    fn test_system_source_ends() {
        let mut hw = SystemHardware::new();
        let (tx, rx) = unbounded();
        let mut source = hw
            .create_source(Arc::new(AudioBuffer::silent(1000, 1, 0.01)))
            .unwrap();
        source.set_on_ended(Some(EndedNotifier::new(3, tx)));
        source.start(0.0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 3);
    }

    #[test]
    fn test_simulated_source_failure() {
        let mut hw = SimulatedHardware::new();
        hw.set_source_failure(Some("device lost"));
        let result = hw.create_source(Arc::new(AudioBuffer::silent(10, 1, 1.0)));
        let unavailable = PlaybackError::HardwareUnavailable("device lost".to_string());
        assert_eq!(result.err(), Some(unavailable));
        assert_eq!(hw.sources_created(), 0);

        hw.set_source_failure(None);
        assert!(hw.create_source(Arc::new(AudioBuffer::silent(10, 1, 1.0))).is_ok());
        assert_eq!(hw.sources_created(), 1);
    }

    #[test]
    fn test_system_source_waits_out_suspension() {
        let mut hw = SystemHardware::new();
        let (tx, rx) = unbounded();
        let mut source = hw
            .create_source(Arc::new(AudioBuffer::silent(1000, 1, 0.05)))
            .unwrap();
        source.set_on_ended(Some(EndedNotifier::new(9, tx)));
        source.start(0.0);
        hw.suspend();

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        hw.resume().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 9);
    }
}
