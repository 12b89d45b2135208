use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use crate::error::PlaybackError;
use crate::playback::hardware::{
    AudioBuffer, AudioHardware, AudioSource, EndedNotifier, HardwareState,
};

/// Fired once when the audio source plays to its end on its own.
pub type EndedCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackClockState {
    pub start_offset_seconds: f64,
    pub is_playing: bool,
    pub play_start_hardware_time: f64,
    pub trim_offset_seconds: f64,
}

/// Playback position derived from an audio hardware clock.
///
/// While stopped the position is `start_offset_seconds`. While playing it
/// also includes the hardware time elapsed since playback started. The
/// audio source, when a buffer is loaded, plays from
/// `trim_offset_seconds + start_offset_seconds`.
pub struct PlaybackClock<H: AudioHardware> {
    hardware: H,
    state: PlaybackClockState,
    buffer: Option<Arc<AudioBuffer>>,
    source: Option<H::Source>,
    // Bumped whenever a source is attached or detached; completion signals
    // carrying an older value are ignored.
    generation: u64,
    ended_tx: Sender<u64>,
    ended_rx: Receiver<u64>,
    on_ended: Option<EndedCallback>,
    note_count: usize,
}

impl<H: AudioHardware> PlaybackClock<H> {
    pub fn new(hardware: H) -> Self {
        let (ended_tx, ended_rx) = unbounded();
        PlaybackClock {
            hardware,
            state: PlaybackClockState {
                start_offset_seconds: 0.0,
                is_playing: false,
                play_start_hardware_time: 0.0,
                trim_offset_seconds: 0.0,
            },
            buffer: None,
            source: None,
            generation: 0,
            ended_tx,
            ended_rx,
            on_ended: None,
            note_count: 0,
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn state(&self) -> PlaybackClockState {
        self.state
    }

    /// Attach decoded audio. Leading `trim_seconds` of the buffer are skipped.
    /// Stops playback if it is running.
    pub fn load_buffer(&mut self, buffer: Arc<AudioBuffer>, trim_seconds: f64) {
        if self.state.is_playing {
            self.stop(false);
        }
        log::info!(
            "Audio buffer loaded: {:.3}s, trim {:.3}s",
            buffer.duration(),
            trim_seconds
        );
        self.buffer = Some(buffer);
        self.state.trim_offset_seconds = trim_seconds.max(0.0);
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    /// Start playback from the current start offset.
    ///
    /// Returns `Ok(false)` and leaves the clock stopped when there is neither
    /// an audio buffer nor any note to animate. A suspended hardware clock is
    /// resumed first; a rejected resume is returned as an error with the
    /// clock still stopped.
    pub fn start(
        &mut self,
        note_count: usize,
        on_ended: Option<EndedCallback>,
    ) -> Result<bool, PlaybackError> {
        if self.state.is_playing {
            log::debug!("start() while playing, ignored");
            return Ok(true);
        }
        if self.buffer.is_none() && note_count == 0 {
            log::warn!("Nothing to play: no audio buffer and no notes");
            return Ok(false);
        }

        self.ensure_running()?;
        self.begin(note_count, on_ended)?;
        Ok(true)
    }

    /// Stop playback. With `preserve_offset` the elapsed time is folded into
    /// the start offset so a later `start` resumes where this one stopped;
    /// otherwise the offset goes back to 0. The completion callback does
    /// not fire.
    pub fn stop(&mut self, preserve_offset: bool) {
        if !self.state.is_playing {
            return;
        }
        self.halt(preserve_offset);
        self.on_ended = None;
        log::info!(
            "Playback stopped at {:.3}s",
            self.state.start_offset_seconds
        );
    }

    /// Move the start offset by `delta`, clamped to `[0, max(0, duration - trim)]`.
    pub fn seek(&mut self, delta: f64, duration: f64, trim: f64) {
        let upper = (duration - trim).max(0.0);
        self.state.start_offset_seconds =
            (self.state.start_offset_seconds + delta).clamp(0.0, upper);
    }

    /// [`seek`](Self::seek) against the loaded buffer. Without a buffer only
    /// the lower bound applies.
    pub fn seek_by(&mut self, delta: f64) {
        match &self.buffer {
            Some(buffer) => {
                let duration = buffer.duration();
                let trim = self.state.trim_offset_seconds;
                self.seek(delta, duration, trim);
            }
            None => {
                self.state.start_offset_seconds =
                    (self.state.start_offset_seconds + delta).max(0.0);
            }
        }
    }

    pub fn current_time(&self) -> f64 {
        if self.state.is_playing {
            self.state.start_offset_seconds
                + (self.hardware.current_time() - self.state.play_start_hardware_time)
        } else {
            self.state.start_offset_seconds
        }
    }

    pub fn start_offset(&self) -> f64 {
        self.state.start_offset_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn reset_start_offset(&mut self) {
        self.state.start_offset_seconds = 0.0;
    }

    /// Deliver a pending end-of-audio signal. When the live source finished
    /// on its own the clock stops, the start offset resets to 0 and the
    /// `on_ended` callback runs. Returns whether that happened.
    pub fn poll(&mut self) -> bool {
        let mut ended = false;
        for generation in self.ended_rx.try_iter() {
            if generation == self.generation && self.source.is_some() {
                ended = true;
            }
        }
        if !ended || !self.state.is_playing {
            return false;
        }

        if let Some(mut source) = self.source.take() {
            source.set_on_ended(None);
        }
        self.generation += 1;
        self.state.is_playing = false;
        self.state.start_offset_seconds = 0.0;
        log::info!("Playback ended");
        if let Some(callback) = self.on_ended.take() {
            callback();
        }
        true
    }

    /// Restart playback on a fresh source at the current position.
    ///
    /// Used after the hardware clock was suspended and resumed, or when a
    /// new source object is needed. The position does not jump: the elapsed
    /// time is folded into the start offset before the new start. Returns
    /// `Ok(false)` when the clock is not playing. On error the clock is left
    /// stopped with its offset preserved.
    pub fn resync(&mut self) -> Result<bool, PlaybackError> {
        if !self.state.is_playing {
            return Ok(false);
        }
        let on_ended = self.on_ended.take();
        let note_count = self.note_count;

        self.halt(true);
        if let Err(err) = self.ensure_running() {
            log::warn!("Resync failed: {}", err);
            return Err(err);
        }
        self.begin(note_count, on_ended)?;
        log::debug!("Resynced at {:.3}s", self.state.start_offset_seconds);
        Ok(true)
    }

    fn ensure_running(&mut self) -> Result<(), PlaybackError> {
        if self.hardware.state() == HardwareState::Suspended {
            log::debug!("Resuming suspended audio hardware");
            self.hardware.resume()?;
        }
        Ok(())
    }

    fn begin(
        &mut self,
        note_count: usize,
        on_ended: Option<EndedCallback>,
    ) -> Result<(), PlaybackError> {
        if let Some(buffer) = &self.buffer {
            let mut source = self.hardware.create_source(Arc::clone(buffer))?;
            self.generation += 1;
            source.set_on_ended(Some(EndedNotifier::new(
                self.generation,
                self.ended_tx.clone(),
            )));
            source.start(self.state.trim_offset_seconds + self.state.start_offset_seconds);
            self.source = Some(source);
        }

        self.state.play_start_hardware_time = self.hardware.current_time();
        self.state.is_playing = true;
        self.on_ended = on_ended;
        self.note_count = note_count;
        log::info!(
            "Playback started at {:.3}s",
            self.state.start_offset_seconds
        );
        Ok(())
    }

    fn halt(&mut self, preserve_offset: bool) {
        if preserve_offset {
            self.state.start_offset_seconds +=
                self.hardware.current_time() - self.state.play_start_hardware_time;
        } else {
            self.state.start_offset_seconds = 0.0;
        }
        if let Some(mut source) = self.source.take() {
            source.set_on_ended(None);
            source.stop();
        }
        self.generation += 1;
        self.state.is_playing = false;
    }
}
