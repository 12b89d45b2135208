use serde::Serialize;

const NOTE_COUNT: usize = 128;

/// A note currently sounding on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveNote {
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

/// Currently sounding notes, at most one entry per note number.
#[derive(Debug, Clone)]
pub struct ActiveNoteRegistry {
    notes: [Option<ActiveNote>; NOTE_COUNT],
    len: usize,
}

impl Default for ActiveNoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveNoteRegistry {
    pub fn new() -> Self {
        ActiveNoteRegistry {
            notes: [None; NOTE_COUNT],
            len: 0,
        }
    }

    #[inline]
    pub fn get(&self, note: u8) -> Option<&ActiveNote> {
        self.notes[usize::from(note & 0x7F)].as_ref()
    }

    #[inline]
    pub fn is_active(&self, note: u8) -> bool {
        self.get(note).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &ActiveNote)> {
        self.notes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (i as u8, n)))
    }

    /// Insert or overwrite the entry for `note`.
    pub(crate) fn insert(&mut self, note: u8, active: ActiveNote) {
        let slot = &mut self.notes[usize::from(note & 0x7F)];
        if slot.is_none() {
            self.len += 1;
        }
        *slot = Some(active);
    }

    pub(crate) fn remove(&mut self, note: u8) -> Option<ActiveNote> {
        let removed = self.notes[usize::from(note & 0x7F)].take();
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.notes = [None; NOTE_COUNT];
        self.len = 0;
    }
}
