// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The traveling ball and its direction tag.

use crate::ident::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trace marker carried by forward balls.
pub const FORWARD_PAYLOAD: &str = "my forward message";
/// Trace marker carried by backward balls.
pub const BACKWARD_PAYLOAD: &str = "my backward message";

/// Direction tag; selects which logical queue of a shared channel a ball sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Root towards leaf.
    Forward,
    /// Leaf towards root.
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub const fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// The message passed along the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    /// Forward or backward.
    pub direction: Direction,
    /// Descriptive trace marker; not protocol-relevant.
    pub payload: String,
    /// Participant expected to consume this ball next.
    pub target: ParticipantId,
}

impl Ball {
    /// A forward ball addressed to `target`.
    pub fn forward(target: ParticipantId) -> Self {
        Self {
            direction: Direction::Forward,
            payload: FORWARD_PAYLOAD.to_owned(),
            target,
        }
    }

    /// A backward ball addressed to `target`.
    pub fn backward(target: ParticipantId) -> Self {
        Self {
            direction: Direction::Backward,
            payload: BACKWARD_PAYLOAD.to_owned(),
            target,
        }
    }

    /// Re-address the ball in the same direction.
    pub fn readdress(mut self, target: ParticipantId) -> Self {
        self.target = target;
        self
    }

    /// Reverse the ball and address it to `target`; the payload follows the new direction.
    pub fn turn_around(self, target: ParticipantId) -> Self {
        match self.direction.flip() {
            Direction::Forward => Ball::forward(target),
            Direction::Backward => Ball::backward(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_around_flips_direction_and_payload() {
        let ball = Ball::forward(ParticipantId::new(3)).turn_around(ParticipantId::new(2));
        assert_eq!(ball.direction, Direction::Backward);
        assert_eq!(ball.payload, BACKWARD_PAYLOAD);
        assert_eq!(ball.target, ParticipantId::new(2));
    }

    #[test]
    fn readdress_keeps_direction() {
        let ball = Ball::backward(ParticipantId::new(3)).readdress(ParticipantId::new(1));
        assert_eq!(ball.direction, Direction::Backward);
        assert_eq!(ball.target, ParticipantId::new(1));
    }
}
