// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-pad rooms and the comment request pipeline.
//!
//! A request runs `resolve pad → authorize → persist → broadcast → ack`.
//! Persist and broadcast happen while holding the room's turn, so every
//! member of a room observes that room's events in one order (numbered by
//! `seq`). The ack is sent after the turn is released; a requester that
//! stops reading only stalls itself. Rooms for different pads never share a
//! turn.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use margin_access::{resolve, AccessQuery, CommentPermissions, PadAccess};
use margin_app_core::{CommentStore, PadResolver, Record, ResolvedPad, StoreError};
use margin_changeset::CommentOnlyValidator;
use margin_session_proto::{
    wire::encode_message, AckPayload, AckStatus, CommentEntry, ConnId, Event, EventPayload,
    HelloAckPayload, HelloPayload, Message, Reply, ReplyEntry,
};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::edit_gate::{EditContext, EditGate};
use crate::error::{HubError, RequestError};

/// Hub implementation version reported in hello acks.
pub const SERVER_VERSION: u32 = 1;

/// Body field that carries an author id.
const AUTHOR_FIELD: &str = "author";
/// Body field a delivered reply carries its own id in.
const REPLY_ID_FIELD: &str = "replyId";

/// Identity announced in `hello`.
#[derive(Debug, Clone)]
struct Identity {
    author_id: String,
    user: Option<String>,
    authorizations: BTreeMap<String, PadAccess>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinMode {
    ReadWrite,
    ReadOnly,
}

struct ConnState {
    tx: mpsc::Sender<Vec<u8>>,
    identity: Option<Identity>,
    joined: HashMap<String, JoinMode>,
}

#[derive(Default)]
struct RoomState {
    members: HashSet<ConnId>,
    turn: Arc<Mutex<()>>,
    next_seq: u64,
}

#[derive(Default)]
struct HubState {
    next_conn_id: ConnId,
    next_ts: u64,
    conns: HashMap<ConnId, ConnState>,
    rooms: HashMap<String, RoomState>,
}

impl HubState {
    fn alloc_ts(&mut self) -> u64 {
        let t = self.next_ts;
        self.next_ts += 1;
        t
    }

    fn turn(&mut self, pad: &str) -> Arc<Mutex<()>> {
        self.rooms.entry(pad.to_owned()).or_default().turn.clone()
    }

    fn prune(&mut self, pad: &str) {
        let idle = self
            .rooms
            .get(pad)
            .is_some_and(|room| room.members.is_empty() && Arc::strong_count(&room.turn) == 1);
        if idle {
            self.rooms.remove(pad);
            debug!(pad, "room closed");
        }
    }
}

/// Snapshot of what a connection may do on one pad.
struct Caller {
    identity: Option<Identity>,
    mode: Option<JoinMode>,
}

impl Caller {
    fn access(&self, pad: &ResolvedPad) -> Option<PadAccess> {
        let access = self
            .identity
            .as_ref()
            .and_then(|id| id.authorizations.get(&pad.canonical).copied());
        if pad.read_only || self.mode == Some(JoinMode::ReadOnly) {
            access.map(PadAccess::capped_read_only)
        } else {
            access
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Comments,
    Replies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Comment,
    Reply,
}

enum Amend {
    Delete,
    UpdateText(String),
    Accept,
    Revert,
}

/// The comment hub.
pub struct Hub<S> {
    state: Mutex<HubState>,
    store: Arc<S>,
    pads: Arc<dyn PadResolver>,
    permissions: Arc<CommentPermissions>,
    gate: EditGate,
}

impl<S: CommentStore> Hub<S> {
    /// Hub over the given collaborators.
    pub fn new(
        store: Arc<S>,
        pads: Arc<dyn PadResolver>,
        permissions: CommentPermissions,
        validator: CommentOnlyValidator,
    ) -> Self {
        let permissions = Arc::new(permissions);
        let gate = EditGate::new(pads.clone(), permissions.clone(), validator);
        Self {
            state: Mutex::new(HubState::default()),
            store,
            pads,
            permissions,
            gate,
        }
    }

    /// The edit gate sharing this hub's resolver and permissions.
    pub fn edit_gate(&self) -> &EditGate {
        &self.gate
    }

    /// Register a connection whose outbound packets go to `tx`.
    pub async fn connect(&self, tx: mpsc::Sender<Vec<u8>>) -> ConnId {
        let mut h = self.state.lock().await;
        let id = h.next_conn_id;
        h.next_conn_id += 1;
        h.conns.insert(
            id,
            ConnState {
                tx,
                identity: None,
                joined: HashMap::new(),
            },
        );
        id
    }

    /// Forget a connection and leave its rooms.
    pub async fn disconnect(&self, conn: ConnId) {
        let mut h = self.state.lock().await;
        let Some(state) = h.conns.remove(&conn) else {
            return;
        };
        for pad in state.joined.keys() {
            if let Some(room) = h.rooms.get_mut(pad) {
                room.members.remove(&conn);
            }
            h.prune(pad);
        }
        debug!(conn, "connection closed");
    }

    /// Number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    /// Members of the room for canonical `pad`.
    pub async fn room_members(&self, pad: &str) -> Vec<ConnId> {
        let h = self.state.lock().await;
        let mut members: Vec<_> = h
            .rooms
            .get(pad)
            .map(|room| room.members.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Handle one inbound message carrying correlation `id`.
    ///
    /// `Err` means the connection must be dropped.
    pub async fn handle_message(
        &self,
        conn: ConnId,
        id: u64,
        msg: Message,
    ) -> Result<(), HubError> {
        match msg {
            Message::Hello(hello) => self.hello(conn, id, hello).await,
            Message::ListComments(p) => self.list(conn, id, &p.pad_id, Listing::Comments).await,
            Message::ListReplies(p) => self.list(conn, id, &p.pad_id, Listing::Replies).await,
            Message::AddComment(p) => {
                self.create(conn, id, &p.pad_id, Kind::Comment, vec![p.comment], false)
                    .await
            }
            Message::BulkAddComments(p) => {
                self.create(conn, id, &p.pad_id, Kind::Comment, p.comments, true)
                    .await
            }
            Message::AddReply(p) => {
                self.create(conn, id, &p.pad_id, Kind::Reply, vec![p.reply], false)
                    .await
            }
            Message::BulkAddReplies(p) => {
                self.create(conn, id, &p.pad_id, Kind::Reply, p.replies, true)
                    .await
            }
            Message::DeleteComment(p) => {
                self.amend(conn, id, &p.pad_id, &p.comment_id, Amend::Delete)
                    .await
            }
            Message::UpdateCommentText(p) => {
                self.amend(conn, id, &p.pad_id, &p.comment_id, Amend::UpdateText(p.text))
                    .await
            }
            Message::AcceptChange(p) => {
                self.amend(conn, id, &p.pad_id, &p.comment_id, Amend::Accept)
                    .await
            }
            Message::RevertChange(p) => {
                self.amend(conn, id, &p.pad_id, &p.comment_id, Amend::Revert)
                    .await
            }
            Message::InspectEdit(p) => {
                let verdict = self.gate.inspect(
                    EditContext {
                        pad_id: &p.pad_id,
                        user: p.user.as_deref(),
                        access: p.access,
                    },
                    &p.changeset,
                    p.apool,
                );
                self.ack(conn, id, Ok(Reply::Verdict(verdict))).await
            }
            other @ (Message::HelloAck(_) | Message::Ack(_) | Message::Event(_)) => {
                // hub-originated; ignore
                debug!(conn, op = other.op_name(), "ignoring hub-originated message");
                Ok(())
            }
        }
    }

    /// Answer a well-framed request the wire layer could not decode.
    pub async fn reject(&self, conn: ConnId, id: u64, reason: String) -> Result<(), HubError> {
        self.ack(conn, id, Err(RequestError::BadInput(reason))).await
    }

    /// Drop every comment and reply of a deleted pad.
    pub async fn remove_pad(&self, pad: &str) -> Result<(), StoreError> {
        let turn = self.state.lock().await.turn(pad);
        let result = {
            let _turn = turn.lock().await;
            self.store.delete_all(pad)
        };
        drop(turn);
        self.state.lock().await.prune(pad);
        info!(pad, ok = result.is_ok(), "pad comments removed");
        result
    }

    /// Copy every comment and reply of `from` onto a duplicated pad `to`.
    pub async fn copy_pad(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let turn = self.state.lock().await.turn(from);
        let result = {
            let _turn = turn.lock().await;
            self.store.copy_all(from, to)
        };
        drop(turn);
        self.state.lock().await.prune(from);
        info!(from, to, ok = result.is_ok(), "pad comments copied");
        result
    }

    fn resolve_pad(&self, raw: &str) -> Result<ResolvedPad, RequestError> {
        self.pads
            .resolve(raw)
            .map_err(|err| RequestError::BadInput(err.to_string()))
    }

    async fn hello(&self, conn: ConnId, id: u64, hello: HelloPayload) -> Result<(), HubError> {
        let (tx, pkt) = {
            let mut h = self.state.lock().await;
            let ts = h.alloc_ts();
            let Some(state) = h.conns.get_mut(&conn) else {
                return Ok(());
            };
            info!(conn, author = %hello.author_id, pads = hello.authorizations.len(), "hello");
            state.identity = Some(Identity {
                author_id: hello.author_id,
                user: hello.user,
                authorizations: hello.authorizations,
            });
            let ack = Message::HelloAck(HelloAckPayload {
                status: AckStatus::Ok,
                server_version: SERVER_VERSION,
                conn_id: conn,
                error: None,
            });
            (state.tx.clone(), encode_message(&ack, id, ts)?)
        };
        if tx.send(pkt).await.is_err() {
            debug!(conn, "hello ack dropped; connection gone");
        }
        Ok(())
    }

    async fn list(
        &self,
        conn: ConnId,
        id: u64,
        raw_pad: &str,
        listing: Listing,
    ) -> Result<(), HubError> {
        let pad = match self.resolve_pad(raw_pad) {
            Ok(pad) => pad,
            Err(err) => return self.ack(conn, id, Err(err)).await,
        };
        let turn = match self.join(conn, &pad).await {
            Ok(turn) => turn,
            Err(err) => return self.ack(conn, id, Err(err)).await,
        };
        let listed = {
            let _turn = turn.lock().await;
            match listing {
                Listing::Comments => self.store.list_comments(&pad.canonical).map(Reply::Comments),
                Listing::Replies => self.store.list_replies(&pad.canonical).map(Reply::Replies),
            }
        };
        drop(turn);
        self.state.lock().await.prune(&pad.canonical);
        let result = listed.map_err(|err| RequestError::from_store(&pad.canonical, err));
        self.ack(conn, id, result).await
    }

    async fn join(&self, conn: ConnId, pad: &ResolvedPad) -> Result<Arc<Mutex<()>>, RequestError> {
        let mut h = self.state.lock().await;
        let Some(state) = h.conns.get_mut(&conn) else {
            return Err(RequestError::BadInput("connection closed".into()));
        };
        let Some(identity) = &state.identity else {
            return Err(RequestError::BadInput("hello required".into()));
        };
        let access = identity.authorizations.get(&pad.canonical).copied();
        if matches!(access, None | Some(PadAccess::None)) {
            return Err(RequestError::AuthorizationDenied(format!(
                "no access to pad {:?}",
                pad.canonical
            )));
        }
        let mode = if pad.read_only {
            JoinMode::ReadOnly
        } else {
            JoinMode::ReadWrite
        };
        let joined = state.joined.entry(pad.canonical.clone()).or_insert(mode);
        if mode == JoinMode::ReadOnly {
            *joined = JoinMode::ReadOnly;
        }
        let room = h.rooms.entry(pad.canonical.clone()).or_default();
        if room.members.insert(conn) {
            info!(conn, pad = %pad.canonical, read_only = pad.read_only, "joined room");
        }
        Ok(room.turn.clone())
    }

    async fn caller(&self, conn: ConnId, pad: &str) -> Caller {
        let h = self.state.lock().await;
        let state = h.conns.get(&conn);
        Caller {
            identity: state.and_then(|s| s.identity.clone()),
            mode: state.and_then(|s| s.joined.get(pad).copied()),
        }
    }

    async fn create(
        &self,
        conn: ConnId,
        id: u64,
        raw_pad: &str,
        kind: Kind,
        records: Vec<Record>,
        bulk: bool,
    ) -> Result<(), HubError> {
        let pad = match self.resolve_pad(raw_pad) {
            Ok(pad) => pad,
            Err(err) => return self.ack(conn, id, Err(err)).await,
        };
        let caller = self.caller(conn, &pad.canonical).await;
        let decision = resolve(
            &AccessQuery {
                user: caller.identity.as_ref().and_then(|i| i.user.as_deref()),
                pad: &pad.canonical,
                access: caller.access(&pad),
            },
            &self.permissions,
        );
        if !decision.allowed {
            warn!(conn, pad = %pad.canonical, source = ?decision.source, "comment creation denied");
            return Err(HubError::CommentDenied {
                conn,
                pad: pad.canonical,
            });
        }
        let author = caller
            .identity
            .as_ref()
            .map(|identity| Value::String(identity.author_id.clone()));
        let records = records
            .into_iter()
            .map(|mut record| {
                if let Some(author) = &author {
                    record.insert(AUTHOR_FIELD.to_owned(), author.clone());
                }
                record
            })
            .collect::<Vec<_>>();

        let turn = self.state.lock().await.turn(&pad.canonical);
        let outcome = {
            let _turn = turn.lock().await;
            let stored = match (kind, bulk) {
                (Kind::Comment, false) => self
                    .store
                    .add_comment(&pad.canonical, first(records))
                    .map(|added| vec![added]),
                (Kind::Comment, true) => self.store.add_comments(&pad.canonical, records),
                (Kind::Reply, false) => self
                    .store
                    .add_reply(&pad.canonical, first(records))
                    .map(|added| vec![added]),
                (Kind::Reply, true) => self.store.add_replies(&pad.canonical, records),
            };
            match stored {
                Ok(stored) => {
                    let (events, reply) = created(kind, bulk, stored);
                    self.broadcast(conn, &pad.canonical, events)
                        .await
                        .map(|()| Ok(reply))
                }
                Err(err) => Ok(Err(RequestError::from_store(&pad.canonical, err))),
            }
        };
        drop(turn);
        self.state.lock().await.prune(&pad.canonical);
        self.ack(conn, id, outcome?).await
    }

    async fn amend(
        &self,
        conn: ConnId,
        id: u64,
        raw_pad: &str,
        comment_id: &str,
        amend: Amend,
    ) -> Result<(), HubError> {
        let pad = match self.resolve_pad(raw_pad) {
            Ok(pad) => pad,
            Err(err) => return self.ack(conn, id, Err(err)).await,
        };
        let caller = self.caller(conn, &pad.canonical).await;
        let Some(identity) = caller.identity else {
            return self
                .ack(conn, id, Err(RequestError::BadInput("hello required".into())))
                .await;
        };
        if caller.mode.is_none() {
            return self
                .ack(
                    conn,
                    id,
                    Err(RequestError::AuthorizationDenied(format!(
                        "not a member of pad {:?}",
                        pad.canonical
                    ))),
                )
                .await;
        }
        if comment_id.is_empty() {
            return self
                .ack(conn, id, Err(RequestError::BadInput("missing comment id".into())))
                .await;
        }

        let turn = self.state.lock().await.turn(&pad.canonical);
        let outcome = {
            let _turn = turn.lock().await;
            let canonical = pad.canonical.as_str();
            let author = identity.author_id.as_str();
            let comment_id = comment_id.to_owned();
            let stored = match amend {
                Amend::Delete => self
                    .store
                    .delete_comment(canonical, &comment_id, author)
                    .map(|()| Event::CommentDeleted { comment_id }),
                Amend::UpdateText(text) => self
                    .store
                    .update_comment_text(canonical, &comment_id, &text, author)
                    .map(|()| Event::CommentTextUpdated { comment_id, text }),
                Amend::Accept => self
                    .store
                    .set_accepted_state(canonical, &comment_id, true)
                    .map(|()| Event::ChangeAccepted { comment_id }),
                Amend::Revert => self
                    .store
                    .set_accepted_state(canonical, &comment_id, false)
                    .map(|()| Event::ChangeReverted { comment_id }),
            };
            match stored {
                Ok(event) => self
                    .broadcast(conn, canonical, vec![event])
                    .await
                    .map(|()| Ok(Reply::Done)),
                Err(err) => Ok(Err(RequestError::from_store(canonical, err))),
            }
        };
        drop(turn);
        self.state.lock().await.prune(&pad.canonical);
        self.ack(conn, id, outcome?).await
    }

    /// Deliver `events` to every member of `pad` except `origin`.
    async fn broadcast(
        &self,
        origin: ConnId,
        pad: &str,
        events: Vec<Event>,
    ) -> Result<(), HubError> {
        let mut h = self.state.lock().await;
        let HubState {
            next_ts,
            conns,
            rooms,
            ..
        } = &mut *h;
        let Some(room) = rooms.get_mut(pad) else {
            return Ok(());
        };
        for event in events {
            room.next_seq += 1;
            let ts = *next_ts;
            *next_ts += 1;
            let name = event.name();
            let pkt = encode_message(
                &Message::Event(EventPayload {
                    pad_id: pad.to_owned(),
                    seq: room.next_seq,
                    event,
                }),
                0,
                ts,
            )?;
            for member in room.members.iter().filter(|m| **m != origin) {
                let Some(peer) = conns.get(member) else {
                    continue;
                };
                if let Err(err) = peer.tx.try_send(pkt.clone()) {
                    warn!(conn = member, pad, event = name, %err, "event dropped for peer");
                }
            }
            debug!(pad, seq = room.next_seq, event = name, "broadcast");
        }
        Ok(())
    }

    async fn ack(
        &self,
        conn: ConnId,
        id: u64,
        result: Result<Reply, RequestError>,
    ) -> Result<(), HubError> {
        let ack = match result {
            Ok(reply) => AckPayload::ok(reply),
            Err(err) => {
                debug!(conn, id, name = err.name(), %err, "request failed");
                err.to_ack()
            }
        };
        let (tx, pkt) = {
            let mut h = self.state.lock().await;
            let ts = h.alloc_ts();
            let Some(state) = h.conns.get(&conn) else {
                debug!(conn, id, "ack dropped; connection gone");
                return Ok(());
            };
            (state.tx.clone(), encode_message(&Message::Ack(ack), id, ts)?)
        };
        if tx.send(pkt).await.is_err() {
            debug!(conn, id, "ack dropped; connection gone");
        }
        Ok(())
    }
}

fn first(records: Vec<Record>) -> Record {
    records.into_iter().next().unwrap_or_default()
}

fn created(kind: Kind, bulk: bool, stored: Vec<(String, Record)>) -> (Vec<Event>, Reply) {
    match kind {
        Kind::Comment => {
            let entries: Vec<_> = stored
                .into_iter()
                .map(|(comment_id, comment)| CommentEntry {
                    comment_id,
                    comment,
                })
                .collect();
            let events = entries.iter().cloned().map(Event::CommentAdded).collect();
            let reply = match (bulk, entries.first()) {
                (false, Some(entry)) => Reply::CommentAdded(entry.clone()),
                _ => Reply::CommentsAdded(entries),
            };
            (events, reply)
        }
        Kind::Reply => {
            let entries: Vec<_> = stored
                .into_iter()
                .map(|(reply_id, mut reply)| {
                    reply.insert(REPLY_ID_FIELD.to_owned(), Value::String(reply_id.clone()));
                    ReplyEntry { reply_id, reply }
                })
                .collect();
            let events = entries.iter().cloned().map(Event::ReplyAdded).collect();
            let reply = match (bulk, entries.first()) {
                (false, Some(entry)) => Reply::ReplyAdded(entry.clone()),
                _ => Reply::RepliesAdded(entries),
            };
            (events, reply)
        }
    }
}
