// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session wire schema for the Margin comment hub.
//!
//! Clients send requests carrying a correlation id and receive exactly one
//! [`Message::Ack`] per request with the same id. Room events reach every
//! other member of the room as [`Message::Event`] with id 0. Comment and
//! reply bodies are opaque JSON objects.

pub use margin_access::PadAccess;
pub use margin_app_core::{Record, RecordMap};
pub use margin_changeset::JsonablePool;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

pub mod wire;

/// Connection id assigned by the hub.
pub type ConnId = u64;

/// Default Unix socket path for the comment hub.
///
/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to `/tmp`
/// when unavailable.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("margin-session.sock")
}

/// Envelope carried as the payload of a packet.
///
/// * `op` – message name (see [`Message::op_name`]).
/// * `id` – request correlation id, echoed in the ack; 0 for events.
/// * `ts` – hub logical timestamp (authoritative on the hub side).
/// * `payload` – message specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<P> {
    /// Message name.
    pub op: String,
    /// Correlation id.
    pub id: u64,
    /// Logical timestamp.
    pub ts: u64,
    /// Message body.
    pub payload: P,
}

/// Identity announced by a client (client → hub). The hub trusts it; the
/// transport in front of the hub is responsible for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    /// Author id stamped on comments and checked on delete/update.
    pub author_id: String,
    /// Account name used for per-user comment settings.
    #[serde(default)]
    pub user: Option<String>,
    /// Authorization per canonical pad id.
    #[serde(default)]
    pub authorizations: BTreeMap<String, PadAccess>,
    /// Implementation version (not wire version).
    pub client_version: u32,
}

/// Hello acknowledgement (hub → client).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloAckPayload {
    /// Status of the hello.
    pub status: AckStatus,
    /// Hub implementation version.
    pub server_version: u32,
    /// Connection id assigned by the hub.
    pub conn_id: ConnId,
    /// Error when status == Error.
    pub error: Option<ErrorPayload>,
}

/// Error body of failed acks: a stable name plus a human readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Stable identifier (`AuthorizationDenied`, `BadInput`, `InternalError`).
    pub name: String,
    /// Human readable message.
    pub message: String,
}

/// Targets a pad (join/list).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PadRef {
    /// Raw pad id (canonical or read-only alias).
    pub pad_id: String,
}

/// Targets one comment or reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentRef {
    /// Raw pad id.
    pub pad_id: String,
    /// Comment or reply id.
    pub comment_id: String,
}

/// New comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddCommentPayload {
    /// Raw pad id.
    pub pad_id: String,
    /// Comment body.
    pub comment: Record,
}

/// New comments, assigned ids in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkAddCommentsPayload {
    /// Raw pad id.
    pub pad_id: String,
    /// Comment bodies.
    pub comments: Vec<Record>,
}

/// New reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddReplyPayload {
    /// Raw pad id.
    pub pad_id: String,
    /// Reply body.
    pub reply: Record,
}

/// New replies, assigned ids in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkAddRepliesPayload {
    /// Raw pad id.
    pub pad_id: String,
    /// Reply bodies.
    pub replies: Vec<Record>,
}

/// Replace the text of a comment or reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTextPayload {
    /// Raw pad id.
    pub pad_id: String,
    /// Comment or reply id.
    pub comment_id: String,
    /// New text.
    pub text: String,
}

/// Edit submitted by the host's edit pipeline for inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InspectEditPayload {
    /// Raw pad id the editing session is attached to.
    pub pad_id: String,
    /// Account name of the editing user.
    #[serde(default)]
    pub user: Option<String>,
    /// The user's authorization on the canonical pad.
    #[serde(default)]
    pub access: Option<PadAccess>,
    /// Packed changeset.
    pub changeset: String,
    /// Pool the changeset's attribute codes refer to.
    pub apool: JsonablePool,
}

/// Outcome of an edit inspection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditVerdict {
    /// The edit only toggles comment markers; apply it despite read-only access.
    AllowOverride,
    /// Leave the decision to the host's normal rules.
    Defer,
}

/// Comment with its assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentEntry {
    /// Assigned id.
    pub comment_id: String,
    /// Stored body.
    pub comment: Record,
}

/// Reply with its assigned id (the body also carries `replyId`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyEntry {
    /// Assigned id.
    pub reply_id: String,
    /// Stored body.
    pub reply: Record,
}

/// Success body of an ack, shaped per request kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// `list_comments`.
    Comments(RecordMap),
    /// `list_replies`.
    Replies(RecordMap),
    /// `add_comment`.
    CommentAdded(CommentEntry),
    /// `bulk_add_comments`.
    CommentsAdded(Vec<CommentEntry>),
    /// `add_reply`.
    ReplyAdded(ReplyEntry),
    /// `bulk_add_replies`.
    RepliesAdded(Vec<ReplyEntry>),
    /// delete/update/accept/revert.
    Done,
    /// `inspect_edit`.
    Verdict(EditVerdict),
}

/// Status enumeration for acks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AckStatus {
    /// Request succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// Request failed.
    #[serde(rename = "ERROR")]
    Error,
}

/// Acknowledgement of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckPayload {
    /// Outcome.
    pub status: AckStatus,
    /// Success body (status == Ok).
    pub reply: Option<Reply>,
    /// Error body (status == Error).
    pub error: Option<ErrorPayload>,
}

impl AckPayload {
    /// Successful ack.
    pub fn ok(reply: Reply) -> Self {
        Self {
            status: AckStatus::Ok,
            reply: Some(reply),
            error: None,
        }
    }

    /// Failed ack.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            reply: None,
            error: Some(ErrorPayload {
                name: name.into(),
                message: message.into(),
            }),
        }
    }
}

/// Room events delivered to members other than the requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A comment was created.
    CommentAdded(CommentEntry),
    /// A reply was created; the body carries `replyId`.
    ReplyAdded(ReplyEntry),
    /// A comment was deleted.
    CommentDeleted {
        /// Deleted id.
        comment_id: String,
    },
    /// A comment or reply text changed.
    CommentTextUpdated {
        /// Changed id.
        comment_id: String,
        /// New text.
        text: String,
    },
    /// A suggested change was accepted.
    ChangeAccepted {
        /// Comment or reply id.
        comment_id: String,
    },
    /// A suggested change was reverted.
    ChangeReverted {
        /// Comment or reply id.
        comment_id: String,
    },
}

impl Event {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::CommentAdded(_) => "comment_added",
            Event::ReplyAdded(_) => "reply_added",
            Event::CommentDeleted { .. } => "comment_deleted",
            Event::CommentTextUpdated { .. } => "comment_text_updated",
            Event::ChangeAccepted { .. } => "change_accepted",
            Event::ChangeReverted { .. } => "change_reverted",
        }
    }
}

/// Event frame: the canonical pad it happened on and its position in that
/// room's broadcast order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    /// Canonical pad id.
    pub pad_id: String,
    /// Per-room sequence number, starting at 1.
    pub seq: u64,
    /// What happened.
    pub event: Event,
}

/// Wire message kinds carried inside envelope payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    /// Identity announcement (op = "hello").
    Hello(HelloPayload),
    /// Hello acknowledgement (op = "hello_ack").
    HelloAck(HelloAckPayload),
    /// Join a pad's room and list its comments (op = "list_comments").
    ListComments(PadRef),
    /// Join a pad's room and list its replies (op = "list_replies").
    ListReplies(PadRef),
    /// Create a comment (op = "add_comment").
    AddComment(AddCommentPayload),
    /// Create comments in bulk (op = "bulk_add_comments").
    BulkAddComments(BulkAddCommentsPayload),
    /// Create a reply (op = "add_reply").
    AddReply(AddReplyPayload),
    /// Create replies in bulk (op = "bulk_add_replies").
    BulkAddReplies(BulkAddRepliesPayload),
    /// Delete a comment (op = "delete_comment").
    DeleteComment(CommentRef),
    /// Replace comment or reply text (op = "update_comment_text").
    UpdateCommentText(UpdateTextPayload),
    /// Accept a suggested change (op = "accept_change").
    AcceptChange(CommentRef),
    /// Revert a suggested change (op = "revert_change").
    RevertChange(CommentRef),
    /// Inspect an edit for the host pipeline (op = "inspect_edit").
    InspectEdit(InspectEditPayload),
    /// Request acknowledgement (op = "ack").
    Ack(AckPayload),
    /// Room event (op = "event").
    Event(EventPayload),
}

impl Message {
    /// Canonical op string for this message variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::HelloAck(_) => "hello_ack",
            Message::ListComments(_) => "list_comments",
            Message::ListReplies(_) => "list_replies",
            Message::AddComment(_) => "add_comment",
            Message::BulkAddComments(_) => "bulk_add_comments",
            Message::AddReply(_) => "add_reply",
            Message::BulkAddReplies(_) => "bulk_add_replies",
            Message::DeleteComment(_) => "delete_comment",
            Message::UpdateCommentText(_) => "update_comment_text",
            Message::AcceptChange(_) => "accept_change",
            Message::RevertChange(_) => "revert_change",
            Message::InspectEdit(_) => "inspect_edit",
            Message::Ack(_) => "ack",
            Message::Event(_) => "event",
        }
    }
}
