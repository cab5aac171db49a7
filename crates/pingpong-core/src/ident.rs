// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant identities and chain roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one participant, assigned when the chain is planned.
///
/// Identities are independent of any OS process id so the same addressing works
/// for in-process tasks and for external tools reading the Stats Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(u32);

impl ParticipantId {
    /// Wrap a raw identity value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identity value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ParticipantId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Position of a participant in the chain.
///
/// A single-participant chain has one `Root` with no child edge; the leaf
/// turnaround applies to it because it has no child, not because of its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// First participant; no parent edge.
    Root,
    /// Has both a parent and a child edge.
    Middle,
    /// Last participant of a chain of two or more; no child edge.
    Leaf,
}

impl Role {
    /// Derive the role from which edges exist.
    pub const fn from_edges(has_parent: bool, has_child: bool) -> Self {
        match (has_parent, has_child) {
            (false, _) => Role::Root,
            (true, true) => Role::Middle,
            (true, false) => Role::Leaf,
        }
    }

    /// Short lowercase label used in logs and replies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Middle => "middle",
            Role::Leaf => "leaf",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_follows_edges() {
        assert_eq!(Role::from_edges(false, true), Role::Root);
        assert_eq!(Role::from_edges(false, false), Role::Root);
        assert_eq!(Role::from_edges(true, true), Role::Middle);
        assert_eq!(Role::from_edges(true, false), Role::Leaf);
    }

    #[test]
    fn participant_id_displays_with_prefix() {
        assert_eq!(ParticipantId::new(7).to_string(), "p7");
    }
}
