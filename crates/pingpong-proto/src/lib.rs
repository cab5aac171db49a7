// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Control-plane wire schema for the pingpong daemon.
//!
//! Operators inject balls and read Stats Blocks of running participants by
//! exchanging [`Message`]s over a Unix socket. Each message travels as a CBOR
//! [`OpEnvelope`] inside a checksummed [`wire::Packet`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod wire;

pub use wire::{decode_message, encode_message, WireError};

/// Default Unix socket path for the daemon's control server.
///
/// Prefers `XDG_RUNTIME_DIR` and falls back to `/tmp`.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    base.join("pingpong.sock")
}

/// Envelope carried as the payload of a packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name, see [`Message::op_name`].
    pub op: String,
    /// Logical timestamp assigned by the sender.
    pub ts: u64,
    /// Operation-specific body.
    pub payload: P,
}

/// Stable error codes carried in [`ErrorPayload::code`].
pub mod codes {
    /// Request named a participant id that is not in the chain.
    pub const UNKNOWN_PARTICIPANT: u32 = 404;
    /// Stats Block could not be read.
    pub const STATS_UNAVAILABLE: u32 = 503;
    /// Message kind is not a request the daemon handles.
    pub const INVALID_OP: u32 = 400;
    /// Control operation failed inside the game.
    pub const INTERNAL: u32 = 500;
}

/// Error reply body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Numeric code from [`codes`].
    pub code: u32,
    /// Stable identifier, e.g. `E_UNKNOWN_PARTICIPANT`.
    pub name: String,
    /// Human readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Build an error body.
    pub fn new(code: u32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, name: name.into(), message: message.into() }
    }
}

/// `InjectBall` / `DumpStats` request body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetPayload {
    /// Participant the control signal is addressed to.
    pub participant: u32,
}

/// Reply to a successful inject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjectedPayload {
    /// Participant that injected the ball.
    pub participant: u32,
    /// Its sent counter after the inject.
    pub sent: u32,
}

/// Reply when a control signal had no effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnoredPayload {
    /// Participant that ignored the signal.
    pub participant: u32,
    /// Why, e.g. `"not root"` or `"finished"`.
    pub reason: String,
}

/// Stats Block contents plus loop state of one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsPayload {
    /// Participant id.
    pub participant: u32,
    /// `root`, `middle` or `leaf`.
    pub role: String,
    /// State machine state name.
    pub state: String,
    /// Completed traversals.
    pub round: u32,
    /// Balls sent.
    pub sent: u32,
    /// Balls received.
    pub received: u32,
}

/// One line of a participant listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantSummary {
    /// Participant id.
    pub participant: u32,
    /// `root`, `middle` or `leaf`.
    pub role: String,
    /// State machine state name.
    pub state: String,
}

/// Every message the control socket carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ask a participant to inject a ball (op = "inject_ball").
    InjectBall(TargetPayload),
    /// Ask a participant for its counters (op = "dump_stats").
    DumpStats(TargetPayload),
    /// List the chain (op = "list_participants").
    ListParticipants,
    /// Inject took effect (op = "injected").
    Injected(InjectedPayload),
    /// Control signal was a no-op (op = "ignored").
    Ignored(IgnoredPayload),
    /// Counters of one participant (op = "stats").
    Stats(StatsPayload),
    /// Chain listing, root first (op = "participants").
    Participants(Vec<ParticipantSummary>),
    /// Request failed (op = "error").
    Error(ErrorPayload),
}

impl Message {
    /// Op string for this variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::InjectBall(_) => "inject_ball",
            Self::DumpStats(_) => "dump_stats",
            Self::ListParticipants => "list_participants",
            Self::Injected(_) => "injected",
            Self::Ignored(_) => "ignored",
            Self::Stats(_) => "stats",
            Self::Participants(_) => "participants",
            Self::Error(_) => "error",
        }
    }

    /// Whether this is a client-to-daemon request.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::InjectBall(_) | Self::DumpStats(_) | Self::ListParticipants)
    }
}
