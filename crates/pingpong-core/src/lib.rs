// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pingpong core: a ball passed down a chain of participants and back.
//!
//! Root serves a forward ball; every participant relays it to its child until
//! the last one turns it around, and the backward ball climbs back to Root,
//! completing a round. Each participant publishes its `(sent, received)` pair
//! to a Stats Block that outside tools can read while the game runs.
//!
//! # Modules
//!
//! - [`registry`] - deterministic edge addressing and get-or-create channels
//! - [`channel`] - direction-tagged ball queues
//! - [`stats`] - Stats Block records and stores
//! - [`participant`] - per-node state machine and control operations
//! - [`runtime`] - poll loop and shared participant handles
//! - [`topology`] - chain planning
//! - [`supervisor`] - launching, reaping and cleanup
#![forbid(unsafe_code)]

pub mod ball;
pub mod channel;
pub mod config;
pub mod error;
pub mod ident;
pub mod participant;
pub mod registry;
pub mod runtime;
pub mod stats;
pub mod supervisor;
pub mod topology;

pub use ball::{Ball, Direction};
pub use channel::BallChannel;
pub use config::GameConfig;
pub use error::{ChannelError, ConfigError, GameError, ProtocolViolation, ResourceError};
pub use ident::{ParticipantId, Role};
pub use participant::{
    IgnoreReason, InjectOutcome, Link, NodeState, Outcome, Participant, ParticipantConfig,
};
pub use registry::{resolve, ChannelAddress, ChannelKey, ChannelRegistry};
pub use runtime::{run_participant, ParticipantHandle, ParticipantStatus};
pub use stats::{FsStatsStore, InMemoryStatsStore, StatsBlock, StatsSnapshot, StatsStore};
pub use supervisor::{ChildTermination, Game, GameControls, GameReport, ParticipantExit};
pub use topology::{plan_chain, ChainPlan, TopologyBuilder, ROOT_DISCRIMINATOR};
