// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! pingpong CLI
//!
//! Sends control signals to participants of a running `pingpongd` and reads
//! Stats Blocks straight off disk.
// The CLI is expected to print to stdout.
#![allow(clippy::print_stdout)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use pingpong_client::ControlClient;
use pingpong_core::{stats::read_record, ParticipantId, StatsSnapshot};
use pingpong_proto::{default_socket_path, Message};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pingpong", author, version, about, long_about = None)]
struct Args {
    /// Control socket of the daemon.
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    /// Command to execute
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Ask a participant to feed a new ball into the game (Root only).
    Inject {
        /// Participant id.
        id: u32,
    },
    /// Print a participant's counters, role and state.
    Stats {
        /// Participant id.
        id: u32,
    },
    /// List every participant, Root first.
    List,
    /// Read a Stats Block file without contacting the daemon.
    Peek {
        /// Participant id.
        id: u32,
        /// Directory the daemon publishes records into.
        #[arg(long)]
        stats_dir: PathBuf,
    },
}

fn peek(dir: &Path, id: u32) -> Result<StatsSnapshot> {
    read_record(dir, ParticipantId::new(id))
        .with_context(|| format!("read stats of p{id} in {}", dir.display()))?
        .with_context(|| format!("p{id} has not published stats in {}", dir.display()))
}

fn describe(reply: &Message) -> Result<String> {
    Ok(match reply {
        Message::Injected(p) => format!("p{}: ball injected, sent ball: {}", p.participant, p.sent),
        Message::Ignored(p) => format!("p{}: ignored ({})", p.participant, p.reason),
        Message::Error(e) => bail!("{} ({}): {}", e.name, e.code, e.message),
        other => bail!("unexpected reply {}", other.op_name()),
    })
}

async fn connect(socket: &Path) -> Result<ControlClient> {
    ControlClient::connect(socket)
        .await
        .with_context(|| format!("connect to {}", socket.display()))
}

/// Execute `cmd`, returning the lines to print. Only daemon commands open the
/// control socket.
async fn execute(cmd: Command, socket: &Path) -> Result<Vec<String>> {
    match cmd {
        Command::Peek { id, stats_dir } => Ok(vec![format!("p{id}: {}", peek(&stats_dir, id)?)]),
        Command::Inject { id } => {
            let reply = connect(socket).await?.inject_ball(id).await?;
            Ok(vec![describe(&reply)?])
        }
        Command::Stats { id } => {
            let s = connect(socket).await?.dump_stats(id).await?;
            Ok(vec![format!(
                "p{} ({}, {}, round {}): sent ball: {}, received ball: {}",
                s.participant, s.role, s.state, s.round, s.sent, s.received
            )])
        }
        Command::List => Ok(connect(socket)
            .await?
            .list_participants()
            .await?
            .into_iter()
            .map(|p| format!("p{}\t{}\t{}", p.participant, p.role, p.state))
            .collect()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let socket = args.socket.unwrap_or_else(default_socket_path);
    for line in execute(args.cmd, &socket).await? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_core::{FsStatsStore, StatsStore};
    use pingpong_proto::{ErrorPayload, IgnoredPayload, InjectedPayload};

    #[test]
    fn peek_reads_published_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatsStore::new(dir.path()).unwrap();
        store.publish(ParticipantId::new(2), StatsSnapshot::new(4, 4)).unwrap();
        assert_eq!(peek(dir.path(), 2).unwrap(), StatsSnapshot::new(4, 4));
        assert!(peek(dir.path(), 3).is_err());
    }

    #[tokio::test]
    async fn peek_never_touches_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatsStore::new(dir.path()).unwrap();
        store.publish(ParticipantId::new(1), StatsSnapshot::new(2, 2)).unwrap();
        let socket = dir.path().join("absent.sock");

        let cmd = Command::Peek { id: 1, stats_dir: dir.path().to_path_buf() };
        let lines = execute(cmd, &socket).await.unwrap();
        assert_eq!(lines, ["p1: sent ball: 2, received ball: 2"]);

        let err = execute(Command::List, &socket).await.unwrap_err();
        assert!(err.to_string().starts_with("connect to"));
    }

    #[test]
    fn replies_render_for_operators() {
        let injected = Message::Injected(InjectedPayload { participant: 1, sent: 3 });
        assert_eq!(describe(&injected).unwrap(), "p1: ball injected, sent ball: 3");
        let ignored = Message::Ignored(IgnoredPayload { participant: 2, reason: "not root".into() });
        assert_eq!(describe(&ignored).unwrap(), "p2: ignored (not root)");
        let err = Message::Error(ErrorPayload::new(404, "E_UNKNOWN_PARTICIPANT", "no p9"));
        assert!(describe(&err).is_err());
    }

    #[test]
    fn subcommands_parse() {
        let args = Args::try_parse_from(["pingpong", "peek", "2", "--stats-dir", "/tmp/s"]).unwrap();
        assert!(matches!(args.cmd, Command::Peek { id: 2, .. }));
        let args = Args::try_parse_from(["pingpong", "--socket", "/tmp/p.sock", "inject", "1"]).unwrap();
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/p.sock")));
        assert!(Args::try_parse_from(["pingpong", "stats"]).is_err());
    }
}
