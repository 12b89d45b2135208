use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::playback::registry::{ActiveNote, ActiveNoteRegistry};

/// A note lifecycle intent waiting to be applied on the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueuedEvent {
    NoteOn {
        note: u8,
        velocity: u8,
        start: f64,
        end: f64,
    },
    NoteOff {
        note: u8,
    },
}

impl QueuedEvent {
    #[inline]
    pub fn note(&self) -> u8 {
        match *self {
            QueuedEvent::NoteOn { note, .. } | QueuedEvent::NoteOff { note } => note,
        }
    }
}

/// FIFO of note intents backed by a reusable slot pool.
///
/// Event storage lives in `slots`; the queue and the free list hold slot
/// indices. A slot goes back to the free list only after its event has been
/// applied to the registry and handed to the callback.
///
/// For each note the queue remembers its most recent pending event. A new
/// note-on merges into a pending note-on of the same note, and a new note-off
/// is dropped when a note-off for that note is already pending.
#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<QueuedEvent>,
    free: Vec<usize>,
    pending: VecDeque<usize>,
    last_pending: [Option<usize>; 128],
    registry: ActiveNoteRegistry,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a queue whose pool already holds `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        EventQueue {
            slots: vec![QueuedEvent::NoteOff { note: 0 }; capacity],
            free: (0..capacity).rev().collect(),
            pending: VecDeque::with_capacity(capacity),
            last_pending: [None; 128],
            registry: ActiveNoteRegistry::new(),
        }
    }

    pub fn enqueue_note_on(&mut self, note: u8, velocity: u8, start: f64, end: f64) {
        let note = note & 0x7F;
        let event = QueuedEvent::NoteOn {
            note,
            velocity,
            start,
            end,
        };

        if let Some(slot) = self.last_pending[usize::from(note)] {
            if let QueuedEvent::NoteOn { .. } = self.slots[slot] {
                self.slots[slot] = event;
                return;
            }
        }
        self.push(event);
    }

    pub fn enqueue_note_off(&mut self, note: u8) {
        let note = note & 0x7F;
        if let Some(slot) = self.last_pending[usize::from(note)] {
            if let QueuedEvent::NoteOff { .. } = self.slots[slot] {
                return;
            }
        }
        self.push(QueuedEvent::NoteOff { note });
    }

    fn push(&mut self, event: QueuedEvent) {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = event;
                slot
            }
            None => {
                self.slots.push(event);
                log::debug!("Event pool grew to {} slot(s)", self.slots.len());
                self.slots.len() - 1
            }
        };
        self.pending.push_back(slot);
        self.last_pending[usize::from(event.note())] = Some(slot);
    }

    /// Apply up to `max_batch` queued events in FIFO order.
    ///
    /// Each event updates the active note registry, then is passed to
    /// `on_event`. Events past the batch limit stay queued in order.
    /// Returns the number of events applied.
    pub fn process_event_queue<F>(&mut self, max_batch: usize, mut on_event: F) -> usize
    where
        F: FnMut(&QueuedEvent),
    {
        let mut applied = 0;
        while applied < max_batch {
            let Some(slot) = self.pending.pop_front() else {
                break;
            };
            let event = self.slots[slot];
            let note = usize::from(event.note());
            if self.last_pending[note] == Some(slot) {
                self.last_pending[note] = None;
            }

            match event {
                QueuedEvent::NoteOn {
                    note,
                    velocity,
                    start,
                    end,
                } => self.registry.insert(
                    note,
                    ActiveNote {
                        velocity,
                        start,
                        end,
                    },
                ),
                QueuedEvent::NoteOff { note } => {
                    self.registry.remove(note);
                }
            }

            on_event(&event);
            self.free.push(slot);
            applied += 1;
        }
        applied
    }

    /// Events waiting to be applied.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.pending.iter().map(|&slot| &self.slots[slot])
    }

    /// Total slots owned by the pool, in use or free.
    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    pub fn pool_available(&self) -> usize {
        self.free.len()
    }

    pub fn active_notes(&self) -> &ActiveNoteRegistry {
        &self.registry
    }

    /// Drop every pending event and silence all active notes. Slots return
    /// to the pool.
    pub fn clear(&mut self) {
        self.free.extend(self.pending.drain(..));
        self.last_pending = [None; 128];
        self.registry.clear();
    }
}

/// An [`EventQueue`] shared between threads. One lock guards the queue, its
/// pool and the active note registry.
#[derive(Debug, Clone, Default)]
pub struct SharedEventQueue {
    inner: Arc<Mutex<EventQueue>>,
}

impl SharedEventQueue {
    pub fn new(queue: EventQueue) -> Self {
        SharedEventQueue {
            inner: Arc::new(Mutex::new(queue)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EventQueue> {
        self.inner.lock()
    }

    pub fn enqueue_note_on(&self, note: u8, velocity: u8, start: f64, end: f64) {
        self.inner.lock().enqueue_note_on(note, velocity, start, end);
    }

    pub fn enqueue_note_off(&self, note: u8) {
        self.inner.lock().enqueue_note_off(note);
    }

    pub fn process_event_queue<F>(&self, max_batch: usize, on_event: F) -> usize
    where
        F: FnMut(&QueuedEvent),
    {
        self.inner.lock().process_event_queue(max_batch, on_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_burst_coalesces() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(60, 10, 0.0, 1.0);
        queue.enqueue_note_on(60, 99, 2.0, 3.0);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.pending().next(),
            Some(&QueuedEvent::NoteOn {
                note: 60,
                velocity: 99,
                start: 2.0,
                end: 3.0
            })
        );
    }

    #[test]
    fn test_note_on_merges_across_other_notes() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(60, 10, 0.0, 1.0);
        queue.enqueue_note_on(62, 10, 0.0, 1.0);
        queue.enqueue_note_on(60, 20, 0.5, 1.5);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_note_on_after_note_off_is_not_merged() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(60, 10, 0.0, 1.0);
        queue.enqueue_note_off(60);
        queue.enqueue_note_on(60, 20, 1.0, 2.0);
        assert_eq!(queue.len(), 3);

        queue.process_event_queue(usize::MAX, |_| {});
        assert_eq!(queue.active_notes().get(60).unwrap().velocity, 20);
    }

    #[test]
    fn test_duplicate_note_off_dropped() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_off(60);
        queue.enqueue_note_off(60);
        queue.enqueue_note_off(61);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_batch_limit_preserves_order() {
        let mut queue = EventQueue::new();
        for note in 0..10u8 {
            queue.enqueue_note_on(note, 100, 0.0, 1.0);
        }

        let mut seen = Vec::new();
        let applied = queue.process_event_queue(4, |e| seen.push(e.note()));
        assert_eq!(applied, 4);
        assert_eq!(queue.len(), 6);

        queue.process_event_queue(4, |e| seen.push(e.note()));
        queue.process_event_queue(4, |e| seen.push(e.note()));
        assert_eq!(seen, (0..10).collect::<Vec<u8>>());
        assert_eq!(queue.active_notes().len(), 10);
    }

    #[test]
    fn test_registry_follows_on_off() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(60, 80, 0.0, 1.0);
        queue.process_event_queue(8, |_| {});
        assert!(queue.active_notes().is_active(60));

        queue.enqueue_note_off(60);
        queue.process_event_queue(8, |_| {});
        assert!(!queue.active_notes().is_active(60));
    }

    #[test]
    fn test_slots_are_reused() {
        let mut queue = EventQueue::with_capacity(2);
        assert_eq!(queue.pool_available(), 2);

        for round in 0..5 {
            queue.enqueue_note_on(round, 1, 0.0, 1.0);
            queue.enqueue_note_off(round);
            queue.process_event_queue(8, |_| {});
        }
        assert_eq!(queue.pool_size(), 2);
        assert_eq!(queue.pool_available(), 2);

        queue.enqueue_note_on(1, 1, 0.0, 1.0);
        queue.enqueue_note_on(2, 1, 0.0, 1.0);
        queue.enqueue_note_on(3, 1, 0.0, 1.0);
        assert_eq!(queue.pool_size(), 3);
    }

    #[test]
    fn test_note_on_after_drain_is_new_event() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(60, 1, 0.0, 1.0);
        queue.process_event_queue(1, |_| {});
        queue.enqueue_note_on(60, 2, 0.0, 1.0);
        assert_eq!(queue.len(), 1);
        let mut applied = Vec::new();
        queue.process_event_queue(1, |e| applied.push(*e));
        assert_eq!(
            applied,
            [QueuedEvent::NoteOn {
                note: 60,
                velocity: 2,
                start: 0.0,
                end: 1.0
            }]
        );
    }

    #[test]
    fn test_clear_returns_slots() {
        let mut queue = EventQueue::new();
        queue.enqueue_note_on(1, 1, 0.0, 1.0);
        queue.enqueue_note_on(2, 1, 0.0, 1.0);
        queue.process_event_queue(1, |_| {});
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.active_notes().is_empty());
        assert_eq!(queue.pool_available(), queue.pool_size());
    }

    #[test]
    fn test_shared_queue_across_threads() {
        let shared = SharedEventQueue::new(EventQueue::new());
        let producer = shared.clone();
        let handle = std::thread::spawn(move || {
            for note in 0..32u8 {
                producer.enqueue_note_on(note, 64, 0.0, 1.0);
            }
        });
        handle.join().unwrap();

        let applied = shared.process_event_queue(usize::MAX, |_| {});
        assert_eq!(applied, 32);
        assert_eq!(shared.lock().active_notes().len(), 32);
    }
}
