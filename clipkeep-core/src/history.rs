use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{Entry, now_unix_ms};

/// Notified after every mutation that should reach durable storage.
pub trait ChangeListener: Send + Sync {
    fn history_changed(&self);
}

/// Bounded, newest-first collection of clipboard entries.
///
/// A single lock serializes `append`, `clear` and `bulk_load`, and is held
/// while `search` and `snapshot` copy entries out, so readers never see a
/// half-applied mutation. Both readers return owned vectors.
pub struct History {
    entries: Mutex<VecDeque<Entry>>,
    max_entries: usize,
    listener: Option<Box<dyn ChangeListener>>,
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
            listener: None,
        }
    }

    pub fn with_listener(max_entries: usize, listener: Box<dyn ChangeListener>) -> Self {
        Self {
            listener: Some(listener),
            ..Self::new(max_entries)
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inserts `text` at the head stamped with the current time, evicting
    /// from the tail past the bound.
    pub fn append(&self, text: impl Into<String>) {
        self.insert(Entry::new(now_unix_ms(), text));
    }

    fn insert(&self, entry: Entry) {
        {
            let mut entries = self.lock();
            entries.push_front(entry);
            entries.truncate(self.max_entries);
        }
        self.notify();
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.notify();
    }

    /// Up to `limit` entries, newest first, whose text contains `query`
    /// ignoring case. The query is trimmed; a blank query matches everything.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Entry> {
        let needle = query.trim().to_lowercase();
        let entries = self.lock();
        entries
            .iter()
            .filter(|entry| needle.is_empty() || entry.text.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Entry> {
        self.lock().iter().cloned().collect()
    }

    /// Replaces the contents wholesale. Used for startup hydration, so the
    /// change listener is not notified.
    pub fn bulk_load(&self, items: Vec<Entry>, newest_first: bool) {
        let mut items: VecDeque<Entry> = items.into();
        if !newest_first {
            items.make_contiguous().reverse();
        }
        items.truncate(self.max_entries);
        *self.lock() = items;
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener.history_changed();
        }
    }
}
