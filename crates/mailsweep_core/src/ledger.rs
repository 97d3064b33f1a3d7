//! Session-scoped ledger of senders that have completed at least one run.
//!
//! Append-only within a session; the host uses it to annotate rows as
//! already unsubscribed. Cleared only when the session storage is cleared.

use crate::selection::SelectionStore;
use crate::storage::{read_or_default, write_json, SessionStorage, PROCESSED_SENDERS_KEY};

pub fn processed_senders<S: SessionStorage + ?Sized>(storage: &S) -> Vec<String> {
    read_or_default(storage, PROCESSED_SENDERS_KEY)
}

pub fn is_processed_sender<S: SessionStorage + ?Sized>(storage: &S, sender: &str) -> bool {
    processed_senders(storage).iter().any(|s| s == sender)
}

/// Appends senders, deduplicating while preserving first-seen order.
pub fn record_processed_senders<S: SessionStorage + ?Sized>(storage: &mut S, senders: &[String]) {
    let mut existing = processed_senders(storage);
    for sender in senders {
        if !existing.contains(sender) {
            existing.push(sender.clone());
        }
    }
    write_json(storage, PROCESSED_SENDERS_KEY, &existing);
}

/// Post-run bookkeeping: remembers the run's senders, then empties the
/// selection so the next page load starts clean.
pub fn record_completed_run<S: SessionStorage>(store: &mut SelectionStore<S>, senders: &[String]) {
    record_processed_senders(store.storage_mut(), senders);
    store.clear_all();
}
