// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end: real Unix-socket server driven by the session client.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use margin_access::{CommentPermissions, PadAccess};
use margin_app_core::AliasTable;
use margin_changeset::CommentOnlyValidator;
use margin_dry_tests::{hello, record, RecordingCommentStore};
use margin_session_client::SessionClient;
use margin_session_proto::{
    wire::Packet, AckStatus, AddCommentPayload, CommentRef, Envelope, Event, Message, PadRef,
    Reply,
};
use margin_session_service::{serve, Hub};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::time::{timeout, Duration};

fn socket_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("margin-hub-{}-{name}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn start(name: &str, perms: CommentPermissions) -> (PathBuf, Arc<RecordingCommentStore>) {
    let path = socket_path(name);
    let store = Arc::new(RecordingCommentStore::new());
    let hub = Arc::new(Hub::new(
        store.clone(),
        Arc::new(AliasTable::new().with_alias("r.abc", "doc1")),
        perms,
        CommentOnlyValidator::default(),
    ));
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(serve(listener, hub));
    (path, store)
}

async fn joined(path: &Path, user: &str, access: PadAccess, pad: &str) -> SessionClient {
    let mut client = SessionClient::connect(path).await.unwrap();
    let ack = client.hello(hello(user, "doc1", access)).await.unwrap();
    assert_eq!(ack.status, AckStatus::Ok);
    let listed = client
        .call(Message::ListComments(PadRef { pad_id: pad.into() }))
        .await
        .unwrap()
        .expect("list ack");
    assert!(matches!(listed.reply, Some(Reply::Comments(_))));
    client
}

#[tokio::test]
async fn read_only_commenter_reaches_writer_through_the_socket() {
    let (path, _store) = start("live", CommentPermissions::default());
    let mut writer = joined(&path, "w", PadAccess::Modify, "doc1").await;
    let mut reader = joined(&path, "r", PadAccess::ReadOnly, "r.abc").await;

    let ack = reader
        .call(Message::AddComment(AddCommentPayload {
            pad_id: "r.abc".into(),
            comment: record(json!({"text": "hi"})),
        }))
        .await
        .unwrap()
        .expect("add ack");
    let Some(Reply::CommentAdded(entry)) = ack.reply else {
        panic!("expected comment_added ack, got {ack:?}");
    };
    assert_eq!(entry.comment_id, "c-1");

    let ev = timeout(Duration::from_secs(2), writer.next_event())
        .await
        .unwrap()
        .unwrap()
        .expect("event");
    assert_eq!(ev.pad_id, "doc1");
    assert_eq!(ev.event, Event::CommentAdded(entry.clone()));

    writer
        .call(Message::AcceptChange(CommentRef {
            pad_id: "doc1".into(),
            comment_id: entry.comment_id.clone(),
        }))
        .await
        .unwrap()
        .expect("accept ack");
    let ev = timeout(Duration::from_secs(2), reader.next_event())
        .await
        .unwrap()
        .unwrap()
        .expect("event");
    assert_eq!(
        ev.event,
        Event::ChangeAccepted {
            comment_id: entry.comment_id
        }
    );
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn denied_commenter_is_disconnected() {
    let perms = CommentPermissions::default().with_default(false);
    let (path, store) = start("denied", perms);
    let mut reader = joined(&path, "r", PadAccess::ReadOnly, "r.abc").await;

    let ack = timeout(
        Duration::from_secs(2),
        reader.call(Message::AddComment(AddCommentPayload {
            pad_id: "r.abc".into(),
            comment: record(json!({"text": "nope"})),
        })),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(ack.is_none(), "connection should close without an ack");
    assert_eq!(store.add_count(), 0);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn ill_formed_request_gets_bad_input_and_keeps_the_connection() {
    let (path, store) = start("malformed", CommentPermissions::default());
    let mut writer = joined(&path, "w", PadAccess::Modify, "doc1").await;

    let bytes = Packet::encode_envelope(&Envelope {
        op: "add_comment".to_owned(),
        id: 99,
        ts: 0,
        payload: json!({}),
    })
    .unwrap();
    writer.stream().write_all(&bytes).await.unwrap();

    let (msg, id) = timeout(Duration::from_secs(2), writer.poll_message())
        .await
        .unwrap()
        .unwrap()
        .expect("ack");
    assert_eq!(id, 99);
    let Message::Ack(ack) = msg else {
        panic!("expected ack, got {msg:?}");
    };
    assert_eq!(ack.status, AckStatus::Error);
    assert_eq!(ack.error.unwrap().name, "BadInput");
    assert_eq!(store.add_count(), 0);

    let listed = writer
        .call(Message::ListComments(PadRef {
            pad_id: "doc1".into(),
        }))
        .await
        .unwrap()
        .expect("connection stays open");
    assert_eq!(listed.status, AckStatus::Ok);
    let _ = std::fs::remove_file(&path);
}
