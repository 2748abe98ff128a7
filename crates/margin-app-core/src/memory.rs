// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Process-local `CommentStore`. Nothing survives a restart.

use crate::store::{CommentStore, Record, RecordMap, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory comment store. Comment ids are `c-<n>`, reply ids `c-reply-<n>`.
#[derive(Debug, Default)]
pub struct MemoryCommentStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pads: HashMap<String, PadRecords>,
    next_comment: u64,
    next_reply: u64,
}

#[derive(Debug, Clone, Default)]
struct PadRecords {
    comments: RecordMap,
    replies: RecordMap,
}

impl PadRecords {
    fn find_mut(&mut self, id: &str) -> Option<&mut Record> {
        match self.comments.get_mut(id) {
            Some(record) => Some(record),
            None => self.replies.get_mut(id),
        }
    }
}

impl Inner {
    fn comment_id(&mut self) -> String {
        self.next_comment += 1;
        format!("c-{}", self.next_comment)
    }

    fn reply_id(&mut self) -> String {
        self.next_reply += 1;
        format!("c-reply-{}", self.next_reply)
    }

    fn record_mut(&mut self, pad: &str, id: &str) -> Result<&mut Record, StoreError> {
        self.pads
            .get_mut(pad)
            .and_then(|records| records.find_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                pad: pad.to_owned(),
                id: id.to_owned(),
            })
    }
}

fn check_author(record: &Record, id: &str, author: &str) -> Result<(), StoreError> {
    if record.get("author").and_then(Value::as_str) == Some(author) {
        Ok(())
    } else {
        Err(StoreError::NotAuthor {
            id: id.to_owned(),
            author: author.to_owned(),
        })
    }
}

impl MemoryCommentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CommentStore for MemoryCommentStore {
    fn list_comments(&self, pad: &str) -> Result<RecordMap, StoreError> {
        Ok(self
            .lock()
            .pads
            .get(pad)
            .map(|records| records.comments.clone())
            .unwrap_or_default())
    }

    fn list_replies(&self, pad: &str) -> Result<RecordMap, StoreError> {
        Ok(self
            .lock()
            .pads
            .get(pad)
            .map(|records| records.replies.clone())
            .unwrap_or_default())
    }

    fn add_comment(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError> {
        let mut inner = self.lock();
        let id = inner.comment_id();
        inner
            .pads
            .entry(pad.to_owned())
            .or_default()
            .comments
            .insert(id.clone(), content.clone());
        Ok((id, content))
    }

    fn add_comments(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        let mut inner = self.lock();
        let mut added = Vec::with_capacity(contents.len());
        for content in contents {
            let id = inner.comment_id();
            added.push((id, content));
        }
        let records = inner.pads.entry(pad.to_owned()).or_default();
        for (id, content) in &added {
            records.comments.insert(id.clone(), content.clone());
        }
        Ok(added)
    }

    fn add_reply(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError> {
        let mut inner = self.lock();
        let id = inner.reply_id();
        inner
            .pads
            .entry(pad.to_owned())
            .or_default()
            .replies
            .insert(id.clone(), content.clone());
        Ok((id, content))
    }

    fn add_replies(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        let mut inner = self.lock();
        let mut added = Vec::with_capacity(contents.len());
        for content in contents {
            let id = inner.reply_id();
            added.push((id, content));
        }
        let records = inner.pads.entry(pad.to_owned()).or_default();
        for (id, content) in &added {
            records.replies.insert(id.clone(), content.clone());
        }
        Ok(added)
    }

    fn delete_comment(&self, pad: &str, id: &str, author: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let not_found = || StoreError::NotFound {
            pad: pad.to_owned(),
            id: id.to_owned(),
        };
        let records = inner.pads.get_mut(pad).ok_or_else(not_found)?;
        let record = records.comments.get(id).ok_or_else(not_found)?;
        check_author(record, id, author)?;
        records.comments.remove(id);
        Ok(())
    }

    fn update_comment_text(
        &self,
        pad: &str,
        id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.record_mut(pad, id)?;
        check_author(record, id, author)?;
        record.insert("text".to_owned(), Value::String(text.to_owned()));
        Ok(())
    }

    fn set_accepted_state(&self, pad: &str, id: &str, accepted: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.record_mut(pad, id)?;
        record.insert("changeAccepted".to_owned(), Value::Bool(accepted));
        Ok(())
    }

    fn delete_all(&self, pad: &str) -> Result<(), StoreError> {
        self.lock().pads.remove(pad);
        Ok(())
    }

    fn copy_all(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let copied = inner.pads.get(from).cloned().unwrap_or_default();
        inner.pads.insert(to.to_owned(), copied);
        Ok(())
    }
}
