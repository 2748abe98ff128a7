// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comment store port.
//!
//! Comments and replies are opaque JSON objects owned by the store. Ids are
//! assigned by the store and are unique per pad. Accept/revert and text
//! updates take an id that may name either a comment or a reply.

use std::collections::BTreeMap;
use thiserror::Error;

/// One comment or reply record.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Records keyed by id.
pub type RecordMap = BTreeMap<String, Record>;

/// Errors surfaced by comment stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No comment or reply with this id on the pad.
    #[error("no comment or reply {id:?} on pad {pad:?}")]
    NotFound {
        /// Canonical pad id.
        pad: String,
        /// Requested record id.
        id: String,
    },
    /// The caller is not the record's author.
    #[error("author {author:?} does not own {id:?}")]
    NotAuthor {
        /// Requested record id.
        id: String,
        /// Author attempting the change.
        author: String,
    },
    /// Backend failure (I/O, database, serialization).
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Narrow CRUD interface over persisted comments and replies.
pub trait CommentStore: Send + Sync {
    /// All comments of `pad`.
    fn list_comments(&self, pad: &str) -> Result<RecordMap, StoreError>;
    /// All replies of `pad`.
    fn list_replies(&self, pad: &str) -> Result<RecordMap, StoreError>;
    /// Persist a comment, returning its assigned id and stored record.
    fn add_comment(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError>;
    /// Persist comments in order; ids come back in the same order.
    fn add_comments(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError>;
    /// Persist a reply, returning its assigned id and stored record.
    fn add_reply(&self, pad: &str, content: Record) -> Result<(String, Record), StoreError>;
    /// Persist replies in order; ids come back in the same order.
    fn add_replies(
        &self,
        pad: &str,
        contents: Vec<Record>,
    ) -> Result<Vec<(String, Record)>, StoreError>;
    /// Delete a comment authored by `author`.
    fn delete_comment(&self, pad: &str, id: &str, author: &str) -> Result<(), StoreError>;
    /// Replace the text of a comment or reply authored by `author`.
    fn update_comment_text(
        &self,
        pad: &str,
        id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError>;
    /// Set the `changeAccepted` flag of a comment or reply.
    fn set_accepted_state(&self, pad: &str, id: &str, accepted: bool) -> Result<(), StoreError>;
    /// Drop every comment and reply of `pad` (pad deleted).
    fn delete_all(&self, pad: &str) -> Result<(), StoreError>;
    /// Copy every comment and reply of `from` onto `to` (pad duplicated).
    fn copy_all(&self, from: &str, to: &str) -> Result<(), StoreError>;
}
