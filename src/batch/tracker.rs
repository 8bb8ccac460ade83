//! Per-item state map shared by every pipeline of a batch

use crate::types::{BatchSummary, BookRecord, ItemId, ItemState};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Entry {
    record: BookRecord,
    state: ItemState,
}

/// Tracks the state of every item in a batch
///
/// This is the only place the batch runner looks at to decide what is unfinished.
/// Updates are synchronous so they can never be interrupted halfway by task
/// cancellation.
#[derive(Debug)]
pub struct CompletionTracker {
    entries: Mutex<Vec<Entry>>,
    publishing: bool,
}

impl CompletionTracker {
    /// Track `records`, all starting in [`ItemState::Pending`]
    ///
    /// `publishing` selects whether [`ItemState::Fetched`] is terminal.
    pub fn new(records: Vec<BookRecord>, publishing: bool) -> Self {
        let entries = records
            .into_iter()
            .map(|record| Entry {
                record,
                state: ItemState::Pending,
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
            publishing,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // a panicking pipeline must not hide the states of the others
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tracked items
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Record a transition
    pub fn set(&self, id: ItemId, state: ItemState) {
        if let Some(entry) = self.lock().get_mut(id.get()) {
            tracing::trace!(item = %entry.record.display_name, from = ?entry.state, to = ?state, "state transition");
            entry.state = state;
        }
    }

    /// Current state of an item
    pub fn state(&self, id: ItemId) -> Option<ItemState> {
        self.lock().get(id.get()).map(|e| e.state)
    }

    /// Records that have not reached a terminal state, in batch order
    pub fn remaining(&self) -> Vec<BookRecord> {
        self.lock()
            .iter()
            .filter(|e| !e.state.is_terminal(self.publishing))
            .map(|e| e.record.clone())
            .collect()
    }

    /// Counts per outcome
    pub fn summary(&self) -> BatchSummary {
        let entries = self.lock();
        let mut summary = BatchSummary {
            total: entries.len(),
            ..BatchSummary::default()
        };
        for entry in entries.iter() {
            match entry.state {
                ItemState::FetchFailed => summary.fetch_failed += 1,
                ItemState::PublishFailed => summary.publish_failed += 1,
                state if state.is_success(self.publishing) => summary.succeeded += 1,
                _ => summary.remaining += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<BookRecord> {
        (0..n)
            .map(|i| BookRecord::new(format!("Book {i}"), format!("http://x/{i}.pdf")))
            .collect()
    }

    #[test]
    fn everything_starts_pending_and_remaining() {
        let tracker = CompletionTracker::new(records(3), true);
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.state(ItemId(1)), Some(ItemState::Pending));
        assert_eq!(tracker.remaining().len(), 3);
    }

    #[test]
    fn remaining_excludes_terminal_states_and_keeps_order() {
        let tracker = CompletionTracker::new(records(5), true);
        tracker.set(ItemId(0), ItemState::Done);
        tracker.set(ItemId(1), ItemState::FetchFailed);
        tracker.set(ItemId(2), ItemState::Publishing);
        tracker.set(ItemId(3), ItemState::PublishFailed);

        let remaining: Vec<_> = tracker
            .remaining()
            .into_iter()
            .map(|r| r.display_name)
            .collect();
        assert_eq!(remaining, vec!["Book 2", "Book 4"]);
    }

    #[test]
    fn fetched_counts_as_success_without_publishing() {
        let tracker = CompletionTracker::new(records(2), false);
        tracker.set(ItemId(0), ItemState::Fetched);
        let summary = tracker.summary();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.remaining, 1);
    }

    #[test]
    fn summary_counts_each_outcome() {
        let tracker = CompletionTracker::new(records(4), true);
        tracker.set(ItemId(0), ItemState::Done);
        tracker.set(ItemId(1), ItemState::FetchFailed);
        tracker.set(ItemId(2), ItemState::PublishFailed);
        tracker.set(ItemId(3), ItemState::Fetched);

        let summary = tracker.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.fetch_failed, 1);
        assert_eq!(summary.publish_failed, 1);
        assert_eq!(summary.remaining, 1);
    }

    #[test]
    fn unknown_id_is_ignored() {
        let tracker = CompletionTracker::new(records(1), true);
        tracker.set(ItemId(9), ItemState::Done);
        assert_eq!(tracker.state(ItemId(9)), None);
    }
}
