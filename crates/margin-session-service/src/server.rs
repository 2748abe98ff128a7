// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Unix-socket front end: framing, per-connection reader loop and writer task.

use std::sync::Arc;

use anyhow::Result;
use margin_app_core::CommentStore;
use margin_session_proto::wire::{decode_message, frame_len, MAX_PAYLOAD};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::Hub;

/// Outbound packets buffered per connection before events are dropped.
const OUTBOX: usize = 256;

/// Accept connections until the listener fails.
pub async fn serve<S>(listener: UnixListener, hub: Arc<Hub<S>>) -> Result<()>
where
    S: CommentStore + 'static,
{
    loop {
        let (stream, _) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, hub).await {
                warn!(?err, "client handler error");
            }
        });
    }
}

/// Serve one connection until it closes or violates the protocol.
pub async fn handle_client<S>(stream: UnixStream, hub: Arc<Hub<S>>) -> Result<()>
where
    S: CommentStore + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOX);
    let conn_id = hub.connect(tx).await;
    info!(conn = conn_id, "client connected");

    tokio::spawn(async move {
        let mut ws = writer;
        while let Some(buf) = rx.recv().await {
            if ws.write_all(&buf).await.is_err() {
                break;
            }
        }
        let _ = ws.shutdown().await;
    });

    let result = read_loop(reader, conn_id, &hub).await;
    hub.disconnect(conn_id).await;
    info!(conn = conn_id, "client disconnected");
    result
}

async fn read_loop<R, S>(mut reader: R, conn_id: u64, hub: &Hub<S>) -> Result<()>
where
    R: AsyncReadExt + Unpin,
    S: CommentStore,
{
    let mut read_buf: Vec<u8> = vec![0u8; 16 * 1024];
    let mut acc: Vec<u8> = Vec::with_capacity(32 * 1024);
    loop {
        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        acc.extend_from_slice(&read_buf[..n]);

        // process as many frames as available
        loop {
            let total = match frame_len(&acc, MAX_PAYLOAD) {
                Ok(Some(total)) if acc.len() >= total => total,
                Ok(_) => break,
                Err(err) => {
                    warn!(conn = conn_id, %err, "rejecting frame");
                    return Ok(());
                }
            };
            let packet: Vec<u8> = acc.drain(..total).collect();
            match decode_message(&packet) {
                Ok(decoded) => {
                    if let Err(err) = hub
                        .handle_message(conn_id, decoded.id, decoded.message)
                        .await
                    {
                        warn!(conn = conn_id, %err, "dropping connection");
                        return Ok(());
                    }
                }
                Err(err) => match err.request_id() {
                    Some(id) => {
                        debug!(conn = conn_id, id, %err, "malformed request");
                        if let Err(err) = hub.reject(conn_id, id, err.to_string()).await {
                            warn!(conn = conn_id, %err, "dropping connection");
                            return Ok(());
                        }
                    }
                    None => {
                        warn!(conn = conn_id, %err, "failed to decode packet");
                        return Ok(());
                    }
                },
            }
        }
    }
}
