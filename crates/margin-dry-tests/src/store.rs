// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comment store double: an in-memory store that counts calls and can be told
//! to fail.

use margin_app_core::{CommentStore, MemoryCommentStore, Record, RecordMap, StoreError};
use std::sync::{Mutex, MutexGuard};

/// [`MemoryCommentStore`] wrapper that records call counts and injects
/// backend failures.
///
/// ```
/// use margin_app_core::CommentStore;
/// use margin_dry_tests::{record, RecordingCommentStore};
///
/// let store = RecordingCommentStore::new();
/// store.set_fail_writes(true);
/// assert!(store.add_comment("doc1", record(serde_json::json!({}))).is_err());
/// assert_eq!(store.add_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingCommentStore {
    inner: MemoryCommentStore,
    stats: Mutex<Stats>,
}

#[derive(Debug, Default)]
struct Stats {
    read_count: usize,
    add_count: usize,
    amend_count: usize,
    fail_reads: bool,
    fail_writes: bool,
}

#[derive(Clone, Copy)]
enum Call {
    Read,
    Add,
    Amend,
}

impl RecordingCommentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: Call) -> Result<(), StoreError> {
        let mut stats = self.stats();
        let fail = match call {
            Call::Read => {
                stats.read_count += 1;
                stats.fail_reads
            }
            Call::Add => {
                stats.add_count += 1;
                stats.fail_writes
            }
            Call::Amend => {
                stats.amend_count += 1;
                stats.fail_writes
            }
        };
        if fail {
            Err(StoreError::Backend("simulated store failure".into()))
        } else {
            Ok(())
        }
    }

    /// Make list calls fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.stats().fail_reads = fail;
    }

    /// Make every mutating call fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.stats().fail_writes = fail;
    }

    /// Number of list calls (attempted, not successful).
    pub fn read_count(&self) -> usize {
        self.stats().read_count
    }

    /// Number of add calls, single or bulk (attempted, not successful).
    pub fn add_count(&self) -> usize {
        self.stats().add_count
    }

    /// Number of delete, text update, accept/revert and pad lifecycle calls.
    pub fn amend_count(&self) -> usize {
        self.stats().amend_count
    }
}

impl CommentStore for RecordingCommentStore {
    fn list_comments(&self, pad: &str) -> Result<RecordMap, StoreError> {
        self.record(Call::Read)?;
        self.inner.list_comments(pad)
    }

    fn list_replies(&self, pad: &str) -> Result<RecordMap, StoreError> {
        self.record(Call::Read)?;
        self.inner.list_replies(pad)
    }

    fn add_comment(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError> {
        self.record(Call::Add)?;
        self.inner.add_comment(pad, content)
    }

    fn add_comments(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        self.record(Call::Add)?;
        self.inner.add_comments(pad, contents)
    }

    fn add_reply(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError> {
        self.record(Call::Add)?;
        self.inner.add_reply(pad, content)
    }

    fn add_replies(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        self.record(Call::Add)?;
        self.inner.add_replies(pad, contents)
    }

    fn delete_comment(&self, pad: &str, id: &str, author: &str) -> Result<(), StoreError> {
        self.record(Call::Amend)?;
        self.inner.delete_comment(pad, id, author)
    }

    fn update_comment_text(
        &self,
        pad: &str,
        id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        self.record(Call::Amend)?;
        self.inner.update_comment_text(pad, id, text, author)
    }

    fn set_accepted_state(&self, pad: &str, id: &str, accepted: bool) -> Result<(), StoreError> {
        self.record(Call::Amend)?;
        self.inner.set_accepted_state(pad, id, accepted)
    }

    fn delete_all(&self, pad: &str) -> Result<(), StoreError> {
        self.record(Call::Amend)?;
        self.inner.delete_all(pad)
    }

    fn copy_all(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.record(Call::Amend)?;
        self.inner.copy_all(from, to)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record;
    use serde_json::json;

    #[test]
    fn delegates_and_counts() {
        let store = RecordingCommentStore::new();
        let (id, _) = store.add_comment("doc1", record(json!({"text": "a"}))).unwrap();
        store.set_accepted_state("doc1", &id, true).unwrap();
        assert_eq!(store.list_comments("doc1").unwrap().len(), 1);
        assert_eq!(
            (store.add_count(), store.amend_count(), store.read_count()),
            (1, 1, 1)
        );
    }

    #[test]
    fn failures_leave_state_untouched() {
        let store = RecordingCommentStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.add_reply("doc1", record(json!({"text": "a"}))),
            Err(StoreError::Backend(_))
        ));
        store.set_fail_writes(false);
        assert!(store.list_replies("doc1").unwrap().is_empty());

        store.set_fail_reads(true);
        assert!(store.list_comments("doc1").is_err());
        assert_eq!(store.read_count(), 2);
    }
}
