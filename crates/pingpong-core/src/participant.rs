// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant state machine.
//!
//! A participant alternates `AwaitingForward → AwaitingBackward → …` and
//! relays the ball along the chain until its own round counter reaches the
//! configured total. Every counter change is published to its Stats Block
//! before the step returns.

use crate::ball::{Ball, Direction};
use crate::channel::BallChannel;
use crate::error::{ChannelError, GameError, ProtocolViolation};
use crate::ident::{ParticipantId, Role};
use crate::registry::{ChannelAddress, ChannelKey, ChannelRegistry};
use crate::stats::{StatsBlock, StatsSnapshot, StatsStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The neighbour on one side of an edge and the key of the channel it reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Neighbour identity; becomes the `target` of balls sent across this edge.
    pub peer: ParticipantId,
    /// Key of the neighbour's inbox.
    pub channel: ChannelKey,
}

/// Immutable per-node configuration computed once by the topology builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// This participant.
    pub id: ParticipantId,
    /// Position in the chain.
    pub role: Role,
    /// Key of the channel this participant reads from.
    pub inbox: ChannelKey,
    /// Edge towards Root, absent on Root.
    pub parent: Option<Link>,
    /// Edge towards Leaf, absent on the last participant.
    pub child: Option<Link>,
    /// Rounds after which this participant is done.
    pub total_rounds: u32,
}

/// Where a participant is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Waiting for a forward ball.
    AwaitingForward,
    /// Waiting for the ball to come back.
    AwaitingBackward,
    /// Round counter reached the total; no more balls are handled.
    Done,
}

impl NodeState {
    /// Direction polled in this state, `None` once done.
    pub const fn expects(self) -> Option<Direction> {
        match self {
            NodeState::AwaitingForward => Some(Direction::Forward),
            NodeState::AwaitingBackward => Some(Direction::Backward),
            NodeState::Done => None,
        }
    }

    /// Short lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeState::AwaitingForward => "awaiting_forward",
            NodeState::AwaitingBackward => "awaiting_backward",
            NodeState::Done => "done",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one poll or one handled ball did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No ball with the expected tag was queued.
    Idle,
    /// Forward ball passed on to the child.
    Forwarded {
        /// Child the ball was sent to.
        to: ParticipantId,
    },
    /// Forward ball reversed because there is no child.
    TurnedAround {
        /// Recipient of the backward ball (the parent, or self on a lone Root).
        to: ParticipantId,
    },
    /// Backward ball passed on to the parent.
    Relayed {
        /// Parent the ball was sent to.
        to: ParticipantId,
    },
    /// Root completed a round and started the next one.
    NextRound {
        /// Child the new forward ball was sent to.
        to: ParticipantId,
    },
    /// Root completed its last round.
    Finished,
    /// The ball violated the protocol and was dropped.
    Dropped(ProtocolViolation),
    /// Participant is done; nothing was polled.
    Done,
}

/// Why an inject request had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// Only Root may inject balls.
    NotRoot,
    /// Root already finished the game.
    Finished,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NotRoot => f.write_str("inject is only meaningful on root"),
            IgnoreReason::Finished => f.write_str("root already finished"),
        }
    }
}

/// Result of an inject request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// A new forward ball was sent.
    Injected {
        /// Recipient of the ball.
        to: ParticipantId,
        /// Sent counter after the inject.
        sent: u32,
    },
    /// Nothing was sent and no state changed.
    Ignored(IgnoreReason),
}

#[derive(Debug)]
struct Peer {
    id: ParticipantId,
    channel: BallChannel,
}

/// One node of the chain with its channels, counters and Stats Block.
#[derive(Debug)]
pub struct Participant {
    config: ParticipantConfig,
    state: NodeState,
    round: u32,
    counters: StatsSnapshot,
    inbox: BallChannel,
    parent: Option<Peer>,
    child: Option<Peer>,
    stats: StatsBlock,
}

impl Participant {
    /// Resolve and open every channel named by `config`, attach the Stats Block
    /// and publish zeroed counters.
    pub fn start(
        config: ParticipantConfig,
        registry: &ChannelRegistry,
        store: Arc<dyn StatsStore>,
    ) -> Result<Self, GameError> {
        let inbox = registry.open_key(&config.inbox)?;
        let parent = open_peer(registry, config.parent.as_ref())?;
        let child = open_peer(registry, config.child.as_ref())?;
        let stats = StatsBlock::attach(store, config.id, StatsSnapshot::default())?;
        debug!(
            participant = %config.id,
            role = %config.role,
            inbox = %inbox.address(),
            "participant started"
        );
        Ok(Self {
            config,
            state: NodeState::AwaitingForward,
            round: 0,
            counters: StatsSnapshot::default(),
            inbox,
            parent,
            child,
            stats,
        })
    }

    /// This participant's identity.
    pub fn id(&self) -> ParticipantId {
        self.config.id
    }

    /// Position in the chain.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Rounds this participant has completed.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// In-memory counters.
    pub fn counters(&self) -> StatsSnapshot {
        self.counters
    }

    /// Whether the participant reached `Done`.
    pub fn is_done(&self) -> bool {
        self.state == NodeState::Done
    }

    /// Address of the channel this participant reads from.
    pub fn inbox_address(&self) -> ChannelAddress {
        self.inbox.address()
    }

    /// Static configuration.
    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    /// Child identity, if there is a child edge.
    pub fn child_id(&self) -> Option<ParticipantId> {
        self.child.as_ref().map(|peer| peer.id)
    }

    /// Parent identity, if there is a parent edge.
    pub fn parent_id(&self) -> Option<ParticipantId> {
        self.parent.as_ref().map(|peer| peer.id)
    }

    /// Place an uncounted forward ball addressed to this participant on its own
    /// inbox. This is how the game is started.
    pub fn serve(&self) -> Result<(), ChannelError> {
        self.inbox.send(Ball::forward(self.id()))?;
        debug!(participant = %self.id(), "ball served");
        Ok(())
    }

    /// Try to take one ball of the expected direction off the inbox and handle it.
    pub fn poll(&mut self) -> Result<Outcome, GameError> {
        let Some(direction) = self.state.expects() else {
            return Ok(Outcome::Done);
        };
        match self.inbox.try_receive(direction)? {
            Some(ball) => self.handle(ball),
            None => Ok(Outcome::Idle),
        }
    }

    /// Apply one dequeued ball to the state machine.
    ///
    /// Balls addressed elsewhere, of the wrong direction, or arriving after
    /// `Done` are dropped without touching counters or the round.
    pub fn handle(&mut self, ball: Ball) -> Result<Outcome, GameError> {
        if let Some(violation) = self.check(&ball) {
            warn!(participant = %self.id(), %violation, "dropping ball");
            return Ok(Outcome::Dropped(violation));
        }
        match ball.direction {
            Direction::Forward => self.on_forward(ball),
            Direction::Backward => self.on_backward(ball),
        }
    }

    fn check(&self, ball: &Ball) -> Option<ProtocolViolation> {
        let receiver = self.id();
        let Some(expected) = self.state.expects() else {
            return Some(ProtocolViolation::Finished { receiver });
        };
        if ball.target != receiver {
            return Some(ProtocolViolation::Misaddressed {
                receiver,
                target: ball.target,
            });
        }
        if ball.direction != expected {
            return Some(ProtocolViolation::UnexpectedDirection {
                receiver,
                expected,
                actual: ball.direction,
            });
        }
        None
    }

    fn on_forward(&mut self, ball: Ball) -> Result<Outcome, GameError> {
        let Some(child) = &self.child else {
            return self.turn_around(ball);
        };
        let to = child.id;
        child.channel.send(ball.readdress(to))?;
        self.count_exchange()?;
        self.state = NodeState::AwaitingBackward;
        info!(participant = %self.id(), %to, round = self.round, "forwarding ball to child");
        Ok(Outcome::Forwarded { to })
    }

    fn turn_around(&mut self, ball: Ball) -> Result<Outcome, GameError> {
        let to = match &self.parent {
            Some(parent) => {
                parent.channel.send(ball.turn_around(parent.id))?;
                parent.id
            }
            // A lone Root is its own parent: the backward ball is consumed in place.
            None => self.id(),
        };
        self.count_exchange()?;
        self.round += 1;
        info!(participant = %self.id(), %to, round = self.round, "no child, ball turned around");
        if self.round >= self.config.total_rounds {
            self.finish();
        } else {
            self.state = NodeState::AwaitingForward;
            if self.parent.is_none() {
                self.serve()?;
            }
        }
        Ok(Outcome::TurnedAround { to })
    }

    fn on_backward(&mut self, ball: Ball) -> Result<Outcome, GameError> {
        if self.config.role == Role::Root {
            return self.complete_round();
        }
        let Some(parent) = &self.parent else {
            return Ok(Outcome::Dropped(ProtocolViolation::UnexpectedDirection {
                receiver: self.id(),
                expected: Direction::Forward,
                actual: Direction::Backward,
            }));
        };
        let to = parent.id;
        parent.channel.send(ball.readdress(to))?;
        self.count_exchange()?;
        self.round += 1;
        info!(participant = %self.id(), %to, round = self.round, "relaying ball to parent");
        if self.round >= self.config.total_rounds {
            self.finish();
        } else {
            self.state = NodeState::AwaitingForward;
        }
        Ok(Outcome::Relayed { to })
    }

    fn complete_round(&mut self) -> Result<Outcome, GameError> {
        self.round += 1;
        self.stats.publish(self.counters)?;
        info!(participant = %self.id(), round = self.round, "round complete");
        if self.round >= self.config.total_rounds {
            self.finish();
            return Ok(Outcome::Finished);
        }
        let Some(child) = &self.child else {
            self.state = NodeState::AwaitingForward;
            self.serve()?;
            return Ok(Outcome::NextRound { to: self.id() });
        };
        let to = child.id;
        child.channel.send(Ball::forward(to))?;
        self.count_exchange()?;
        self.state = NodeState::AwaitingBackward;
        info!(participant = %self.id(), %to, round = self.round, "root forwarding ball");
        Ok(Outcome::NextRound { to })
    }

    fn count_exchange(&mut self) -> Result<(), GameError> {
        self.counters.sent += 1;
        self.counters.received += 1;
        self.stats.publish(self.counters)?;
        Ok(())
    }

    fn finish(&mut self) {
        self.state = NodeState::Done;
        info!(participant = %self.id(), round = self.round, "participant done");
    }

    /// Feed a fresh forward ball into the game. Only meaningful on Root.
    pub fn inject_ball(&mut self) -> Result<InjectOutcome, GameError> {
        if self.config.role != Role::Root {
            info!(participant = %self.id(), role = %self.role(), "inject ignored on non-root participant");
            return Ok(InjectOutcome::Ignored(IgnoreReason::NotRoot));
        }
        if self.is_done() {
            info!(participant = %self.id(), "inject ignored, root already finished");
            return Ok(InjectOutcome::Ignored(IgnoreReason::Finished));
        }
        let to = match &self.child {
            Some(child) => {
                child.channel.send(Ball::forward(child.id))?;
                if self.state == NodeState::AwaitingForward {
                    self.state = NodeState::AwaitingBackward;
                }
                child.id
            }
            None => {
                self.serve()?;
                self.id()
            }
        };
        self.counters.sent += 1;
        self.stats.publish(self.counters)?;
        info!(participant = %self.id(), %to, "ball fed into game");
        Ok(InjectOutcome::Injected {
            to,
            sent: self.counters.sent,
        })
    }

    /// Report the in-memory counters. No effect on protocol state.
    pub fn dump_stats(&self) -> StatsSnapshot {
        info!(
            participant = %self.id(),
            sent = self.counters.sent,
            received = self.counters.received,
            "stats dump"
        );
        self.counters
    }
}

fn open_peer(
    registry: &ChannelRegistry,
    link: Option<&Link>,
) -> Result<Option<Peer>, ChannelError> {
    link.map(|link| {
        registry.open_key(&link.channel).map(|channel| Peer {
            id: link.peer,
            channel,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::InMemoryStatsStore;

    fn key(disc: u32) -> ChannelKey {
        ChannelKey::new("./pingpong", disc)
    }

    fn pid(raw: u32) -> ParticipantId {
        ParticipantId::new(raw)
    }

    /// Root(1) -> Leaf(2) with separate inbox channels.
    fn pair(total_rounds: u32) -> (Participant, Participant, InMemoryStatsStore) {
        let registry = ChannelRegistry::new(8);
        let store = InMemoryStatsStore::new();
        let root = Participant::start(
            ParticipantConfig {
                id: pid(1),
                role: Role::Root,
                inbox: key(21),
                parent: None,
                child: Some(Link { peer: pid(2), channel: key(40) }),
                total_rounds,
            },
            &registry,
            Arc::new(store.clone()),
        )
        .unwrap();
        let leaf = Participant::start(
            ParticipantConfig {
                id: pid(2),
                role: Role::Leaf,
                inbox: key(40),
                parent: Some(Link { peer: pid(1), channel: key(21) }),
                child: None,
                total_rounds,
            },
            &registry,
            Arc::new(store.clone()),
        )
        .unwrap();
        (root, leaf, store)
    }

    #[test]
    fn start_publishes_zeroed_stats() {
        let (_root, _leaf, store) = pair(1);
        assert_eq!(store.read(pid(1)).unwrap(), Some(StatsSnapshot::default()));
        assert_eq!(store.read(pid(2)).unwrap(), Some(StatsSnapshot::default()));
    }

    #[test]
    fn idle_poll_changes_nothing() {
        let (mut root, _leaf, _store) = pair(1);
        assert_eq!(root.poll().unwrap(), Outcome::Idle);
        assert_eq!(root.state(), NodeState::AwaitingForward);
        assert_eq!(root.counters(), StatsSnapshot::default());
    }

    #[test]
    fn one_round_between_root_and_leaf() {
        let (mut root, mut leaf, store) = pair(1);
        root.serve().unwrap();
        assert_eq!(root.poll().unwrap(), Outcome::Forwarded { to: pid(2) });
        assert_eq!(root.state(), NodeState::AwaitingBackward);

        assert_eq!(leaf.poll().unwrap(), Outcome::TurnedAround { to: pid(1) });
        assert!(leaf.is_done());

        assert_eq!(root.poll().unwrap(), Outcome::Finished);
        assert!(root.is_done());
        assert_eq!(root.poll().unwrap(), Outcome::Done);

        assert_eq!(store.read(pid(1)).unwrap(), Some(StatsSnapshot::new(1, 1)));
        assert_eq!(store.read(pid(2)).unwrap(), Some(StatsSnapshot::new(1, 1)));
    }

    #[test]
    fn misaddressed_ball_is_dropped_without_side_effects() {
        let (_root, mut leaf, store) = pair(1);
        let outcome = leaf.handle(Ball::forward(pid(9))).unwrap();
        assert_eq!(
            outcome,
            Outcome::Dropped(ProtocolViolation::Misaddressed {
                receiver: pid(2),
                target: pid(9)
            })
        );
        assert_eq!(leaf.round(), 0);
        assert_eq!(leaf.counters(), StatsSnapshot::default());
        assert_eq!(store.read(pid(2)).unwrap(), Some(StatsSnapshot::default()));
        assert_eq!(leaf.state(), NodeState::AwaitingForward);
    }

    #[test]
    fn wrong_direction_is_dropped() {
        let (_root, mut leaf, _store) = pair(1);
        let outcome = leaf.handle(Ball::backward(pid(2))).unwrap();
        assert!(matches!(
            outcome,
            Outcome::Dropped(ProtocolViolation::UnexpectedDirection { .. })
        ));
        assert_eq!(leaf.counters(), StatsSnapshot::default());
    }

    #[test]
    fn inject_on_non_root_is_a_no_op() {
        let (_root, mut leaf, _store) = pair(1);
        assert_eq!(
            leaf.inject_ball().unwrap(),
            InjectOutcome::Ignored(IgnoreReason::NotRoot)
        );
        assert_eq!(leaf.counters(), StatsSnapshot::default());
        assert_eq!(leaf.state(), NodeState::AwaitingForward);
    }

    #[test]
    fn inject_on_root_sends_to_child_and_awaits_return() {
        let (mut root, mut leaf, _store) = pair(1);
        assert_eq!(
            root.inject_ball().unwrap(),
            InjectOutcome::Injected { to: pid(2), sent: 1 }
        );
        assert_eq!(root.state(), NodeState::AwaitingBackward);
        assert_eq!(root.counters(), StatsSnapshot::new(1, 0));
        assert_eq!(leaf.poll().unwrap(), Outcome::TurnedAround { to: pid(1) });
        assert_eq!(root.poll().unwrap(), Outcome::Finished);
    }

    #[test]
    fn lone_root_turns_ball_around_in_place() {
        let registry = ChannelRegistry::new(4);
        let store = InMemoryStatsStore::new();
        let mut solo = Participant::start(
            ParticipantConfig {
                id: pid(1),
                role: Role::Root,
                inbox: key(21),
                parent: None,
                child: None,
                total_rounds: 2,
            },
            &registry,
            Arc::new(store),
        )
        .unwrap();
        solo.serve().unwrap();
        assert_eq!(solo.poll().unwrap(), Outcome::TurnedAround { to: pid(1) });
        assert_eq!(solo.state(), NodeState::AwaitingForward);
        assert_eq!(solo.poll().unwrap(), Outcome::TurnedAround { to: pid(1) });
        assert!(solo.is_done());
        assert_eq!(solo.counters(), StatsSnapshot::new(2, 2));
        assert_eq!(solo.round(), 2);
    }
}
