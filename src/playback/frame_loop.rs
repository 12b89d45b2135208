use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;

use crate::config::FrameMode;

/// Handle to a running frame loop.
///
/// `cancel` may be called any number of times, from any thread, including
/// from inside the frame callback. Once it returns, no further callback
/// starts: a tick already delivered by the timer is discarded because the
/// loop re-checks the active flag before invoking the callback.
pub struct FrameLoopHandle {
    active: Arc<AtomicBool>,
    cancel_tx: Sender<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FrameLoopHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let _ = self.cancel_tx.try_send(());
            log::debug!("Frame loop cancelled");
        }
        if let Some(handle) = self.thread.lock().take() {
            // Joining from the loop thread itself would deadlock; the loop
            // exits on its own once the callback returns.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Block until the loop stops, either by cancellation or because the
    /// callback returned `ControlFlow::Break`.
    pub fn wait(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameLoopHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start driving `callback` on its own thread at the rate `mode` selects.
///
/// The callback receives the loop's refresh timestamp in seconds since the
/// loop started. Returning `ControlFlow::Break` stops the loop.
pub fn spawn_frame_loop<F>(mode: FrameMode, mut callback: F) -> FrameLoopHandle
where
    F: FnMut(f64) -> ControlFlow<()> + Send + 'static,
{
    let active = Arc::new(AtomicBool::new(true));
    let (cancel_tx, cancel_rx) = bounded::<()>(1);
    let interval = mode.interval();

    let loop_active = Arc::clone(&active);
    let thread = thread::spawn(move || {
        let started = Instant::now();
        let ticker = tick(interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    if !loop_active.load(Ordering::Acquire) {
                        break;
                    }
                    let timestamp = started.elapsed().as_secs_f64();
                    if callback(timestamp).is_break() {
                        loop_active.store(false, Ordering::Release);
                        break;
                    }
                }
                recv(cancel_rx) -> _ => break,
            }
        }
    });

    log::debug!("Frame loop started, interval {:?}", interval);
    FrameLoopHandle {
        active,
        cancel_tx,
        thread: Mutex::new(Some(thread)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_loop_runs_until_break() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);
        let handle = spawn_frame_loop(FrameMode::FixedRate { interval_ms: 1 }, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        handle.wait();
        assert_eq!(frames.load(Ordering::SeqCst), 5);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_cancel_is_idempotent_and_final() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);
        let handle = spawn_frame_loop(FrameMode::FixedRate { interval_ms: 1 }, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        thread::sleep(Duration::from_millis(10));
        handle.cancel();
        handle.cancel();
        let after_cancel = frames.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(frames.load(Ordering::SeqCst), after_cancel);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_timestamps_increase() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stamps);
        let handle = spawn_frame_loop(FrameMode::FixedRate { interval_ms: 1 }, move |t| {
            let mut s = sink.lock();
            s.push(t);
            if s.len() == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        handle.wait();
        let stamps = stamps.lock();
        assert!(stamps.windows(2).all(|w| w[1] >= w[0]));
    }
}
