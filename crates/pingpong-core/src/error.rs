// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for the pingpong core.

use crate::ball::Direction;
use crate::ident::ParticipantId;
use crate::registry::ChannelAddress;
use thiserror::Error;

/// Invalid startup parameters. Raised before any participant exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `total_rounds` must be at least 1.
    #[error("total rounds must be a positive integer")]
    ZeroRounds,
    /// `participant_count` must be at least 1.
    #[error("participant count must be a positive integer")]
    ZeroParticipants,
    /// Channel addressing needs a non-empty path token.
    #[error("channel path token must not be empty")]
    EmptyPathToken,
    /// Channels need room for at least one ball.
    #[error("channel capacity must be at least 1")]
    ZeroCapacity,
    /// The idle backoff must be a positive duration.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    /// A raw argument could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// Offending raw value.
        value: String,
    },
}

/// Address resolution, open, send or receive failure. Fatal to the owning participant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The path token cannot be turned into an address.
    #[error("cannot resolve channel address from path token {0:?}")]
    Unresolvable(String),
    /// The registry refused to create another channel.
    #[error("channel registry is full ({limit} channels)")]
    RegistryFull {
        /// Configured channel limit.
        limit: usize,
    },
    /// The channel was released or closed.
    #[error("channel {0} is closed")]
    Closed(ChannelAddress),
    /// The channel queue is at capacity.
    #[error("channel {address} is full ({capacity} balls queued)")]
    Full {
        /// Channel that rejected the send.
        address: ChannelAddress,
        /// Queue capacity.
        capacity: usize,
    },
    /// Release of an address the registry does not hold.
    #[error("channel {0} is not registered")]
    Unknown(ChannelAddress),
}

/// A ball that the receiving participant must not act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The ball names another participant as its target.
    #[error("{receiver} dequeued a ball addressed to {target}")]
    Misaddressed {
        /// Participant that dequeued the ball.
        receiver: ParticipantId,
        /// Participant named by the ball.
        target: ParticipantId,
    },
    /// The ball's direction does not match what the current state expects.
    #[error("{receiver} expected a {expected} ball, got {actual}")]
    UnexpectedDirection {
        /// Participant that dequeued the ball.
        receiver: ParticipantId,
        /// Direction the state machine was waiting for.
        expected: Direction,
        /// Direction of the ball.
        actual: Direction,
    },
    /// The participant already reached `Done`.
    #[error("{receiver} already finished and accepts no more balls")]
    Finished {
        /// Participant that dequeued the ball.
        receiver: ParticipantId,
    },
}

/// Stats Block creation, attach, publish or removal failure.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Filesystem failure for a file-backed store.
    #[error("stats block io error for {id}: {source}")]
    Io {
        /// Participant whose record failed.
        id: ParticipantId,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A stored record could not be encoded or decoded.
    #[error("stats block for {id} is malformed: {source}")]
    Malformed {
        /// Participant whose record failed.
        id: ParticipantId,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Catch-all for store-specific failures.
    #[error("stats block unavailable for {id}: {reason}")]
    Unavailable {
        /// Participant whose record failed.
        id: ParticipantId,
        /// Human readable reason.
        reason: String,
    },
}

/// Umbrella error surfaced by the game runtime.
#[derive(Debug, Error)]
pub enum GameError {
    /// See [`ConfigError`].
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// See [`ChannelError`].
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    /// See [`ResourceError`].
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    /// The game was cancelled before Root finished.
    #[error("game cancelled before completion")]
    Cancelled,
    /// A participant task panicked or was aborted.
    #[error("participant {id} task failed: {reason}")]
    TaskFailed {
        /// Participant whose task failed.
        id: ParticipantId,
        /// Join failure description.
        reason: String,
    },
    /// Lookup of a participant id that is not part of the chain.
    #[error("no participant {0} in this game")]
    UnknownParticipant(ParticipantId),
}
