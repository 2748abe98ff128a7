// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Async client helper for the Margin comment hub over Unix sockets
//! (CBOR-framed).

use std::collections::VecDeque;
use std::io;
use std::path::Path;

use anyhow::{bail, Result};
use margin_session_proto::{
    wire::{decode_message, encode_message, CHECKSUM_BYTES, HEADER_BYTES},
    AckPayload, EventPayload, HelloAckPayload, HelloPayload, Message,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Minimal async client over Unix sockets.
///
/// Requests get increasing correlation ids starting at 1. [`call`](Self::call)
/// waits for the matching ack and buffers the events that arrive meanwhile;
/// [`next_event`](Self::next_event) drains that buffer first.
pub struct SessionClient {
    stream: UnixStream,
    next_id: u64,
    pending: VecDeque<EventPayload>,
}

impl SessionClient {
    /// Connect to the hub at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            next_id: 1,
            pending: VecDeque::new(),
        }
    }

    /// Announce identity and wait for the hello ack.
    pub async fn hello(&mut self, payload: HelloPayload) -> Result<HelloAckPayload> {
        let id = self.send(Message::Hello(payload)).await?;
        loop {
            match self.poll_message().await? {
                Some((Message::HelloAck(ack), ack_id)) if ack_id == id => return Ok(ack),
                Some((Message::Event(ev), _)) => self.pending.push_back(ev),
                Some(_) => continue,
                None => bail!("hub closed the connection before hello ack"),
            }
        }
    }

    /// Send a request; returns its correlation id.
    pub async fn send(&mut self, msg: Message) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        let pkt = encode_message(&msg, id, 0)?;
        self.stream.write_all(&pkt).await?;
        Ok(id)
    }

    /// Send a request and wait for its ack. `Ok(None)` means the hub closed
    /// the connection instead of answering.
    pub async fn call(&mut self, msg: Message) -> Result<Option<AckPayload>> {
        let id = self.send(msg).await?;
        loop {
            match self.poll_message().await? {
                Some((Message::Ack(ack), ack_id)) if ack_id == id => return Ok(Some(ack)),
                Some((Message::Event(ev), _)) => self.pending.push_back(ev),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Next room event, or `None` once the hub closed the connection.
    pub async fn next_event(&mut self) -> Result<Option<EventPayload>> {
        if let Some(ev) = self.pending.pop_front() {
            return Ok(Some(ev));
        }
        loop {
            match self.poll_message().await? {
                Some((Message::Event(ev), _)) => return Ok(Some(ev)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Read one message and its correlation id. Returns Ok(None) when the stream is closed before any bytes are read.
    /// Reads until a full frame header is buffered so short reads cannot desynchronize framing.
    pub async fn poll_message(&mut self) -> Result<Option<(Message, u64)>> {
        let mut header = [0u8; HEADER_BYTES];
        let mut read = 0usize;
        while read < header.len() {
            let n = self.stream.read(&mut header[read..]).await?;
            if n == 0 {
                if read == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "truncated frame header: read {} of {} bytes",
                        read,
                        header.len()
                    ),
                )
                .into());
            }
            read += n;
        }
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut rest = vec![0u8; len + CHECKSUM_BYTES];
        self.stream.read_exact(&mut rest).await?;
        let mut packet = Vec::with_capacity(HEADER_BYTES + len + CHECKSUM_BYTES);
        packet.extend_from_slice(&header);
        packet.extend_from_slice(&rest);
        let decoded = decode_message(&packet)?;
        Ok(Some((decoded.message, decoded.id)))
    }

    /// Expose the underlying stream (e.g., for select!).
    pub fn stream(&mut self) -> &mut UnixStream {
        &mut self.stream
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use margin_session_proto::{Event, PadRef, Reply};
    use tokio::task;

    #[tokio::test]
    async fn poll_message_handles_partial_header_without_losing_bytes() {
        let (client_stream, mut server_stream) = UnixStream::pair().unwrap();

        let ack = Message::Ack(AckPayload::error("BadInput", "keep frame aligned"));
        let encoded = encode_message(&ack, 42, 3).unwrap();

        let client_task = task::spawn(async move {
            let mut client = SessionClient::from_stream(client_stream);
            client.poll_message().await
        });

        server_stream.write_all(&encoded[..5]).await.unwrap();
        task::yield_now().await;
        server_stream.write_all(&encoded[5..]).await.unwrap();

        match client_task.await.unwrap().unwrap() {
            Some((msg, id)) => {
                assert_eq!(msg, ack);
                assert_eq!(id, 42);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_buffers_events_until_its_ack() {
        let (client_stream, mut server_stream) = UnixStream::pair().unwrap();
        let mut client = SessionClient::from_stream(client_stream);

        let server = task::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let _ = server_stream.read(&mut buf).await.unwrap();
            let event = Message::Event(EventPayload {
                pad_id: "doc1".into(),
                seq: 1,
                event: Event::CommentDeleted {
                    comment_id: "c-1".into(),
                },
            });
            server_stream
                .write_all(&encode_message(&event, 0, 0).unwrap())
                .await
                .unwrap();
            let ack = Message::Ack(AckPayload::ok(Reply::Done));
            server_stream
                .write_all(&encode_message(&ack, 1, 1).unwrap())
                .await
                .unwrap();
            server_stream
        });

        let ack = client
            .call(Message::ListComments(PadRef {
                pad_id: "doc1".into(),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.reply, Some(Reply::Done));
        let held = server.await.unwrap();

        let ev = client.next_event().await.unwrap().unwrap();
        assert_eq!(ev.seq, 1);
        drop(held);
        assert!(client.next_event().await.unwrap().is_none());
    }
}
