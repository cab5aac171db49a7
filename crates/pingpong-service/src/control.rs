// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Control socket: per-participant `InjectBall` / `DumpStats` over CBOR frames.

use anyhow::Result;
use pingpong_core::{GameControls, GameError, InjectOutcome, ParticipantId};
use pingpong_proto::{
    codes,
    wire::{decode_message, encode_message, Packet, HEADER_LEN},
    ErrorPayload, IgnoredPayload, InjectedPayload, Message, ParticipantSummary, StatsPayload,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Connection bookkeeping shared by every client handler.
#[derive(Default)]
pub struct ServerState {
    next_conn_id: u64,
    next_ts: u64,
    conns: HashMap<u64, mpsc::Sender<Vec<u8>>>,
}

impl ServerState {
    fn alloc_ts(&mut self) -> u64 {
        let ts = self.next_ts;
        self.next_ts += 1;
        ts
    }

    /// Open connections.
    pub fn connections(&self) -> usize {
        self.conns.len()
    }
}

/// Accept clients until the listener fails.
pub async fn serve(listener: UnixListener, controls: GameControls) -> Result<()> {
    let state = Arc::new(Mutex::new(ServerState::default()));
    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        let controls = controls.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, state, controls).await {
                warn!(?err, "control client handler error");
            }
        });
    }
}

/// Serve one connection: decode requests, answer each through the outbox.
/// A malformed frame closes the connection.
pub async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<ServerState>>,
    controls: GameControls,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
    let conn_id = {
        let mut s = state.lock().await;
        let id = s.next_conn_id;
        s.next_conn_id += 1;
        s.conns.insert(id, tx.clone());
        debug!(conn = id, open = s.connections(), "control client connected");
        id
    };

    let writer_task = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if writer.write_all(&buf).await.is_err() {
                break;
            }
        }
    });

    let result = read_requests(&mut reader, conn_id, &state, &controls, &tx).await;

    state.lock().await.conns.remove(&conn_id);
    drop(tx);
    let _ = writer_task.await;
    debug!(conn = conn_id, "control client disconnected");
    result
}

async fn read_requests(
    reader: &mut tokio::net::unix::OwnedReadHalf,
    conn_id: u64,
    state: &Arc<Mutex<ServerState>>,
    controls: &GameControls,
    tx: &mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    let mut read_buf = vec![0u8; 4 * 1024];
    let mut acc: Vec<u8> = Vec::with_capacity(8 * 1024);
    loop {
        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        acc.extend_from_slice(&read_buf[..n]);

        while acc.len() >= HEADER_LEN {
            let frame_len = match Packet::frame_len(&acc) {
                Ok(len) => len,
                Err(err) => {
                    warn!(conn = conn_id, %err, "bad frame header, closing");
                    return Ok(());
                }
            };
            if acc.len() < frame_len {
                break;
            }
            let packet: Vec<u8> = acc.drain(..frame_len).collect();
            let request = match decode_message(&packet) {
                Ok((msg, _ts, _)) => msg,
                Err(err) => {
                    warn!(conn = conn_id, %err, "failed to decode frame, closing");
                    return Ok(());
                }
            };
            let reply = handle_request(request, controls);
            let ts = state.lock().await.alloc_ts();
            if tx.send(encode_message(&reply, ts)?).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Answer one request against the running game.
pub fn handle_request(msg: Message, controls: &GameControls) -> Message {
    match msg {
        Message::InjectBall(target) => {
            let id = ParticipantId::new(target.participant);
            match controls.inject_ball(id) {
                Ok(InjectOutcome::Injected { to, sent }) => {
                    info!(participant = %id, %to, sent, "inject via control socket");
                    Message::Injected(InjectedPayload { participant: target.participant, sent })
                }
                Ok(InjectOutcome::Ignored(reason)) => Message::Ignored(IgnoredPayload {
                    participant: target.participant,
                    reason: reason.to_string(),
                }),
                Err(err) => error_reply(&err),
            }
        }
        Message::DumpStats(target) => {
            let id = ParticipantId::new(target.participant);
            match controls.participant(id) {
                Ok(handle) => {
                    let counters = handle.dump_stats();
                    let status = handle.status();
                    Message::Stats(StatsPayload {
                        participant: target.participant,
                        role: status.role.to_string(),
                        state: status.state.to_string(),
                        round: status.round,
                        sent: counters.sent,
                        received: counters.received,
                    })
                }
                Err(err) => error_reply(&err),
            }
        }
        Message::ListParticipants => Message::Participants(
            controls
                .statuses()
                .into_iter()
                .map(|status| ParticipantSummary {
                    participant: status.id.get(),
                    role: status.role.to_string(),
                    state: status.state.to_string(),
                })
                .collect(),
        ),
        other => Message::Error(ErrorPayload::new(
            codes::INVALID_OP,
            "E_INVALID_OP",
            format!("{} is not a request", other.op_name()),
        )),
    }
}

fn error_reply(err: &GameError) -> Message {
    let payload = match err {
        GameError::UnknownParticipant(id) => ErrorPayload::new(
            codes::UNKNOWN_PARTICIPANT,
            "E_UNKNOWN_PARTICIPANT",
            format!("no participant {id} in this game"),
        ),
        GameError::Resource(inner) => {
            ErrorPayload::new(codes::STATS_UNAVAILABLE, "E_STATS_UNAVAILABLE", inner.to_string())
        }
        other => ErrorPayload::new(codes::INTERNAL, "E_CONTROL_FAILED", other.to_string()),
    };
    Message::Error(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_core::{ChannelRegistry, Game, GameConfig, InMemoryStatsStore};
    use pingpong_proto::TargetPayload;
    use std::time::Duration;
    use tokio::time::timeout;

    fn idle_game(players: u32) -> Game {
        let config = GameConfig::new(1, players)
            .with_seed(5)
            .with_poll_interval(Duration::from_millis(1))
            .with_serve_on_start(false);
        Game::launch(config, ChannelRegistry::new(8), Arc::new(InMemoryStatsStore::new())).unwrap()
    }

    fn target(participant: u32) -> TargetPayload {
        TargetPayload { participant }
    }

    #[tokio::test]
    async fn inject_is_root_only() {
        let game = idle_game(3);
        let controls = game.controls();

        let reply = handle_request(Message::InjectBall(target(3)), &controls);
        assert!(matches!(reply, Message::Ignored(ref p) if p.participant == 3));

        let reply = handle_request(Message::InjectBall(target(1)), &controls);
        assert_eq!(reply, Message::Injected(InjectedPayload { participant: 1, sent: 1 }));

        timeout(Duration::from_secs(10), game.wait()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dump_reports_role_state_and_counters() {
        let game = idle_game(2);
        let controls = game.controls();
        let reply = handle_request(Message::DumpStats(target(2)), &controls);
        assert_eq!(
            reply,
            Message::Stats(StatsPayload {
                participant: 2,
                role: "leaf".into(),
                state: "awaiting_forward".into(),
                round: 0,
                sent: 0,
                received: 0,
            })
        );
        controls.shutdown();
    }

    #[tokio::test]
    async fn unknown_participant_gets_stable_code() {
        let game = idle_game(2);
        let controls = game.controls();
        match handle_request(Message::DumpStats(target(42)), &controls) {
            Message::Error(err) => assert_eq!(err.code, codes::UNKNOWN_PARTICIPANT),
            other => panic!("expected error, got {other:?}"),
        }
        controls.shutdown();
    }

    #[tokio::test]
    async fn replies_are_rejected_as_requests() {
        let game = idle_game(1);
        let controls = game.controls();
        let reply = handle_request(Message::Participants(vec![]), &controls);
        assert!(matches!(reply, Message::Error(ref e) if e.code == codes::INVALID_OP));
        controls.shutdown();
    }

    #[tokio::test]
    async fn listing_is_root_first() {
        let game = idle_game(3);
        let controls = game.controls();
        match handle_request(Message::ListParticipants, &controls) {
            Message::Participants(list) => {
                let roles: Vec<_> = list.iter().map(|p| p.role.as_str()).collect();
                assert_eq!(roles, ["root", "middle", "leaf"]);
            }
            other => panic!("expected listing, got {other:?}"),
        }
        controls.shutdown();
    }

    #[tokio::test]
    async fn requests_on_one_connection_get_ordered_replies() {
        let game = idle_game(2);
        let controls = game.controls();
        let (client, server) = UnixStream::pair().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));
        let handler = tokio::spawn(handle_client(server, Arc::clone(&state), controls.clone()));

        let mut client = pingpong_client::ControlClient::from_stream(client);
        let listing = client.list_participants().await.unwrap();
        assert_eq!(listing.len(), 2);
        let stats = client.dump_stats(1).await.unwrap();
        assert_eq!(stats.role, "root");
        assert_eq!(state.lock().await.connections(), 1);

        drop(client);
        timeout(Duration::from_secs(5), handler).await.unwrap().unwrap().unwrap();
        assert_eq!(state.lock().await.connections(), 0);
        controls.shutdown();
    }

    #[tokio::test]
    async fn garbage_closes_the_connection() {
        let game = idle_game(1);
        let controls = game.controls();
        let (mut client, server) = UnixStream::pair().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));
        let handler = tokio::spawn(handle_client(server, state, controls.clone()));

        client.write_all(b"NOT A PONG FRAME").await.unwrap();
        timeout(Duration::from_secs(5), handler).await.unwrap().unwrap().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        controls.shutdown();
    }
}
