// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A planned chain of started participants polled in a fixed order.
//!
//! No tasks and no sleeps: each sweep polls Root first, then every node down
//! to the Leaf, so a test can reason about exact interleavings.

use pingpong_core::{
    plan_chain, ChannelRegistry, GameConfig, GameError, InMemoryStatsStore, Outcome, Participant,
    ParticipantId, StatsSnapshot, StatsStore,
};
use std::sync::Arc;

/// Started participants sharing one registry and one stats store.
#[derive(Debug)]
pub struct ChainFixture {
    participants: Vec<Participant>,
    registry: ChannelRegistry,
    store: InMemoryStatsStore,
    log: Vec<(ParticipantId, Outcome)>,
}

impl ChainFixture {
    /// Plan and start a chain of `players` participants playing `rounds`
    /// rounds, with a fixed discriminator seed. Nothing is served yet.
    pub fn new(rounds: u32, players: u32) -> Result<Self, GameError> {
        Self::from_config(GameConfig::new(rounds, players).with_seed(7))
    }

    /// Plan and start the chain described by `config`.
    pub fn from_config(config: GameConfig) -> Result<Self, GameError> {
        let registry = ChannelRegistry::new(config.channel_capacity);
        let store = InMemoryStatsStore::new();
        let shared: Arc<dyn StatsStore> = Arc::new(store.clone());
        let participants = plan_chain(config)?
            .into_nodes()
            .into_iter()
            .map(|node| Participant::start(node, &registry, Arc::clone(&shared)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { participants, registry, store, log: Vec::new() })
    }

    /// Serve the opening ball to Root.
    pub fn serve(&self) -> Result<(), GameError> {
        if let Some(root) = self.participants.first() {
            root.serve()?;
        }
        Ok(())
    }

    /// Poll every participant once, Root first. Returns how many did something.
    pub fn sweep(&mut self) -> Result<usize, GameError> {
        let mut active = 0;
        for participant in &mut self.participants {
            let outcome = participant.poll()?;
            if !matches!(outcome, Outcome::Idle | Outcome::Done) {
                active += 1;
                self.log.push((participant.id(), outcome));
            }
        }
        Ok(active)
    }

    /// Sweep until every participant is done or `max_sweeps` pass.
    /// Returns the number of sweeps taken, or `None` if the bound was hit.
    pub fn run_until_done(&mut self, max_sweeps: usize) -> Result<Option<usize>, GameError> {
        for sweeps in 0..max_sweeps {
            if self.all_done() {
                return Ok(Some(sweeps));
            }
            self.sweep()?;
        }
        Ok(self.all_done().then_some(max_sweeps))
    }

    /// Whether every participant reached `Done`.
    pub fn all_done(&self) -> bool {
        self.participants.iter().all(Participant::is_done)
    }

    /// Participants, Root first.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Mutable access to one participant, by chain position.
    pub fn participant_mut(&mut self, index: usize) -> Option<&mut Participant> {
        self.participants.get_mut(index)
    }

    /// Root.
    pub fn root(&self) -> Option<&Participant> {
        self.participants.first()
    }

    /// Published Stats Block of every participant, chain order.
    pub fn published(&self) -> Vec<Option<StatsSnapshot>> {
        self.participants
            .iter()
            .map(|p| self.store.read(p.id()).ok().flatten())
            .collect()
    }

    /// Every non-idle outcome so far, in the order it happened.
    pub fn log(&self) -> &[(ParticipantId, Outcome)] {
        &self.log
    }

    /// Shared registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Shared stats store.
    pub fn store(&self) -> &InMemoryStatsStore {
        &self.store
    }
}
