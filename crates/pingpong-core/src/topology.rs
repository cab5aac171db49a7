// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Chain planning: identities, roles and edge keys for every participant.
//!
//! The whole plan is computed before any participant starts, so each edge's
//! discriminator is known to both ends before either resolves it.

use crate::config::GameConfig;
use crate::error::ConfigError;
use crate::ident::{ParticipantId, Role};
use crate::participant::{Link, ParticipantConfig};
use crate::registry::ChannelKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Discriminator of Root's own inbox.
pub const ROOT_DISCRIMINATOR: u32 = 21;
/// Smallest span random child discriminators are drawn from.
const MIN_DISCRIMINATOR_SPAN: u32 = 100;

/// A planned chain, Root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    nodes: Vec<ParticipantConfig>,
}

impl ChainPlan {
    /// Per-node configurations in chain order.
    pub fn nodes(&self) -> &[ParticipantConfig] {
        &self.nodes
    }

    /// Consume the plan.
    pub fn into_nodes(self) -> Vec<ParticipantConfig> {
        self.nodes
    }

    /// Root's configuration.
    pub fn root(&self) -> Option<&ParticipantConfig> {
        self.nodes.first()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan is empty (never true for a validated config).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds a linear chain: the first node is Root, each later node becomes the
/// current tail's child, the last one has no child.
#[derive(Debug)]
pub struct TopologyBuilder {
    config: GameConfig,
    rng: StdRng,
    used: HashSet<u32>,
}

impl TopologyBuilder {
    /// Validate `config` and prepare a builder.
    pub fn new(config: GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            rng,
            used: HashSet::from([ROOT_DISCRIMINATOR]),
        })
    }

    /// Discriminator for a new child edge, unique within this chain.
    fn next_discriminator(&mut self) -> u32 {
        let count = self.config.participant_count;
        let span = MIN_DISCRIMINATOR_SPAN.max(count.saturating_mul(4));
        loop {
            let candidate = count.saturating_add(self.rng.gen_range(0..span));
            if self.used.insert(candidate) {
                return candidate;
            }
        }
    }

    /// Produce the plan.
    pub fn build(mut self) -> ChainPlan {
        let count = self.config.participant_count;
        let token = self.config.path_token.clone();
        let total_rounds = self.config.total_rounds;

        let mut inboxes = Vec::with_capacity(count as usize);
        inboxes.push(ChannelKey::new(token.clone(), ROOT_DISCRIMINATOR));
        for _ in 1..count {
            let disc = self.next_discriminator();
            inboxes.push(ChannelKey::new(token.clone(), disc));
        }

        let ids: Vec<ParticipantId> = (1..=count).map(ParticipantId::new).collect();
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(idx, &id)| {
                let parent = idx.checked_sub(1).map(|p| Link {
                    peer: ids[p],
                    channel: inboxes[p].clone(),
                });
                let child = ids.get(idx + 1).map(|&peer| Link {
                    peer,
                    channel: inboxes[idx + 1].clone(),
                });
                ParticipantConfig {
                    id,
                    role: Role::from_edges(parent.is_some(), child.is_some()),
                    inbox: inboxes[idx].clone(),
                    parent,
                    child,
                    total_rounds,
                }
            })
            .collect();
        ChainPlan { nodes }
    }
}

/// Plan the chain described by `config`.
pub fn plan_chain(config: GameConfig) -> Result<ChainPlan, ConfigError> {
    Ok(TopologyBuilder::new(config)?.build())
}
