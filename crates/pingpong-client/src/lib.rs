// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client for the pingpong daemon's control socket, async and blocking.

use anyhow::{anyhow, bail, Result};
use pingpong_proto::{
    wire::{decode_message, encode_message, Packet, HEADER_LEN},
    Message, ParticipantSummary, StatsPayload, TargetPayload,
};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream as AsyncUnixStream;

/// Async request/reply client over one socket connection.
pub struct ControlClient {
    stream: AsyncUnixStream,
    ts: u64,
}

impl ControlClient {
    /// Connect to the daemon at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = AsyncUnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: AsyncUnixStream) -> Self {
        Self { stream, ts: 0 }
    }

    /// Send one request without waiting for the reply.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        if !msg.is_request() {
            bail!("{} is not a request", msg.op_name());
        }
        self.ts += 1;
        let pkt = encode_message(msg, self.ts)?;
        self.stream.write_all(&pkt).await?;
        Ok(())
    }

    /// Send a request and wait for its reply.
    pub async fn request(&mut self, msg: &Message) -> Result<Message> {
        self.send(msg).await?;
        self.poll_reply()
            .await?
            .ok_or_else(|| anyhow!("daemon closed the connection before replying"))
    }

    /// Read one reply. `Ok(None)` when the stream closes before any bytes arrive.
    /// Buffers a full header first so short reads cannot desynchronize framing.
    pub async fn poll_reply(&mut self) -> Result<Option<Message>> {
        let mut header = [0u8; HEADER_LEN];
        let mut read = 0usize;
        while read < header.len() {
            let n = self.stream.read(&mut header[read..]).await?;
            if n == 0 {
                if read == 0 {
                    return Ok(None);
                }
                return Err(truncated(read).into());
            }
            read += n;
        }
        let total = Packet::frame_len(&header)?;
        let mut packet = vec![0u8; total];
        packet[..HEADER_LEN].copy_from_slice(&header);
        self.stream.read_exact(&mut packet[HEADER_LEN..]).await?;
        let (msg, _ts, _) = decode_message(&packet)?;
        Ok(Some(msg))
    }

    /// `InjectBall` on `participant`.
    pub async fn inject_ball(&mut self, participant: u32) -> Result<Message> {
        self.request(&Message::InjectBall(TargetPayload { participant })).await
    }

    /// `DumpStats` on `participant`.
    pub async fn dump_stats(&mut self, participant: u32) -> Result<StatsPayload> {
        match self.request(&Message::DumpStats(TargetPayload { participant })).await? {
            Message::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    /// Every participant, root first.
    pub async fn list_participants(&mut self) -> Result<Vec<ParticipantSummary>> {
        match self.request(&Message::ListParticipants).await? {
            Message::Participants(list) => Ok(list),
            other => Err(unexpected(other)),
        }
    }
}

fn truncated(read: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("truncated frame header: read {read} of {HEADER_LEN} bytes"),
    )
}

fn unexpected(msg: Message) -> anyhow::Error {
    match msg {
        Message::Error(err) => anyhow!("{} ({}): {}", err.name, err.code, err.message),
        other => anyhow!("unexpected reply {}", other.op_name()),
    }
}

/// Blocking one-shot: connect, send `msg`, return the reply.
pub fn request_blocking(path: impl AsRef<Path>, msg: &Message) -> Result<Message> {
    if !msg.is_request() {
        bail!("{} is not a request", msg.op_name());
    }
    let mut stream = UnixStream::connect(path)?;
    stream.write_all(&encode_message(msg, 1)?)?;
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header)?;
    let total = Packet::frame_len(&header)?;
    let mut packet = vec![0u8; total];
    packet[..HEADER_LEN].copy_from_slice(&header);
    stream.read_exact(&mut packet[HEADER_LEN..])?;
    let (reply, _, _) = decode_message(&packet)?;
    Ok(reply)
}
