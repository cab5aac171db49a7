// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Game supervisor: starts the planned chain, spawns one task per participant,
//! reaps children and cleans up Root's channel.

use crate::config::GameConfig;
use crate::error::GameError;
use crate::ident::{ParticipantId, Role};
use crate::participant::{InjectOutcome, Participant};
use crate::registry::{ChannelAddress, ChannelRegistry};
use crate::runtime::{run_participant, ParticipantHandle, ParticipantStatus};
use crate::stats::{StatsSnapshot, StatsStore};
use crate::topology::plan_chain;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type ParticipantTask = JoinHandle<Result<ParticipantExit, GameError>>;

/// How a reaped child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildTermination {
    /// The child reached `Done`.
    Clean(ParticipantId),
    /// The child ended with an error or its task failed.
    Failed {
        /// Child identity.
        id: ParticipantId,
        /// Failure description.
        reason: String,
    },
}

impl ChildTermination {
    /// Whether the child ended cleanly.
    pub fn is_clean(&self) -> bool {
        matches!(self, ChildTermination::Clean(_))
    }
}

/// What a participant task returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantExit {
    /// Final status.
    pub status: ParticipantStatus,
    /// Outcome of reaping the child, if there was one.
    pub child: Option<ChildTermination>,
}

/// Summary returned once Root finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    /// Rounds Root completed.
    pub rounds: u32,
    /// How Root's immediate child ended.
    pub child: Option<ChildTermination>,
    /// Published Stats Block of every participant, chain order.
    pub stats: Vec<(ParticipantId, Option<StatsSnapshot>)>,
}

/// Cloneable control surface of a running game.
#[derive(Debug, Clone)]
pub struct GameControls {
    handles: Arc<[ParticipantHandle]>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl GameControls {
    /// Every participant, Root first.
    pub fn participants(&self) -> &[ParticipantHandle] {
        &self.handles
    }

    /// Root's handle.
    pub fn root(&self) -> Option<&ParticipantHandle> {
        self.handles.first()
    }

    /// Handle of participant `id`.
    pub fn participant(&self, id: ParticipantId) -> Result<&ParticipantHandle, GameError> {
        self.handles
            .iter()
            .find(|handle| handle.id() == id)
            .ok_or(GameError::UnknownParticipant(id))
    }

    /// InjectBall on participant `id`.
    pub fn inject_ball(&self, id: ParticipantId) -> Result<InjectOutcome, GameError> {
        self.participant(id)?.inject_ball()
    }

    /// DumpStats on participant `id`.
    pub fn dump_stats(&self, id: ParticipantId) -> Result<StatsSnapshot, GameError> {
        Ok(self.participant(id)?.dump_stats())
    }

    /// Status of every participant.
    pub fn statuses(&self) -> Vec<ParticipantStatus> {
        self.handles.iter().map(ParticipantHandle::status).collect()
    }

    /// Ask every participant loop to stop at its next poll.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// A launched game.
pub struct Game {
    controls: GameControls,
    stats: Arc<dyn StatsStore>,
    root_task: ParticipantTask,
}

impl Game {
    /// Plan the chain, start every participant (resolving and opening all
    /// channels), serve the first ball if configured, then spawn the tasks.
    ///
    /// Must be called from within a tokio runtime. Fails before spawning
    /// anything if the configuration is invalid or any participant cannot
    /// open its channels or Stats Block.
    pub fn launch(
        config: GameConfig,
        registry: ChannelRegistry,
        stats: Arc<dyn StatsStore>,
    ) -> Result<Self, GameError> {
        let plan = plan_chain(config.clone())?;
        let participants = plan
            .into_nodes()
            .into_iter()
            .map(|node| Participant::start(node, &registry, Arc::clone(&stats)))
            .collect::<Result<Vec<_>, _>>()?;
        let root_inbox = participants
            .first()
            .map(Participant::inbox_address)
            .ok_or(GameError::Config(crate::error::ConfigError::ZeroParticipants))?;
        let handles: Vec<ParticipantHandle> =
            participants.into_iter().map(ParticipantHandle::new).collect();

        info!(
            participants = handles.len(),
            rounds = config.total_rounds,
            "chain started"
        );
        if config.serve_on_start {
            if let Some(root) = handles.first() {
                root.serve()?;
            }
        }

        let (shutdown_tx, _) = watch::channel(false);
        let mut below: Option<(ParticipantId, ParticipantTask)> = None;
        for handle in handles.iter().rev() {
            let task = spawn_participant(
                handle.clone(),
                config.poll_interval,
                shutdown_tx.subscribe(),
                below.take(),
                (handle.role() == Role::Root).then(|| (registry.clone(), root_inbox)),
            );
            below = Some((handle.id(), task));
        }
        let Some((_, root_task)) = below else {
            return Err(GameError::Config(crate::error::ConfigError::ZeroParticipants));
        };

        Ok(Self {
            controls: GameControls {
                handles: handles.into(),
                shutdown: Arc::new(shutdown_tx),
            },
            stats,
            root_task,
        })
    }

    /// Cloneable control surface.
    pub fn controls(&self) -> GameControls {
        self.controls.clone()
    }

    /// Wait for Root to finish and collect every Stats Block.
    pub async fn wait(self) -> Result<GameReport, GameError> {
        let root_id = self
            .controls
            .root()
            .map_or(ParticipantId::new(0), ParticipantHandle::id);
        let exit = self
            .root_task
            .await
            .map_err(|err| GameError::TaskFailed {
                id: root_id,
                reason: err.to_string(),
            })??;
        let stats = self
            .controls
            .participants()
            .iter()
            .map(|handle| {
                let id = handle.id();
                self.stats.read(id).map(|snapshot| (id, snapshot))
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(rounds = exit.status.round, "game finished");
        Ok(GameReport {
            rounds: exit.status.round,
            child: exit.child,
            stats,
        })
    }

    /// Like [`Game::wait`] but cancels the game if it runs longer than `limit`.
    pub async fn wait_for(self, limit: Duration) -> Result<GameReport, GameError> {
        let controls = self.controls();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!(?limit, "game deadline reached, cancelling");
            controls.shutdown();
        });
        let result = self.wait().await;
        canceller.abort();
        result
    }
}

fn spawn_participant(
    handle: ParticipantHandle,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
    child: Option<(ParticipantId, ParticipantTask)>,
    owned_channel: Option<(ChannelRegistry, ChannelAddress)>,
) -> ParticipantTask {
    tokio::spawn(async move {
        let id = handle.id();
        let result = run_participant(handle, poll_interval, shutdown).await;
        let child = match child {
            Some((child_id, task)) => {
                if result.is_err() {
                    task.abort();
                }
                info!(participant = %id, child = %child_id, "waiting for child termination");
                Some(reap(child_id, task).await)
            }
            None => None,
        };
        match &child {
            Some(ChildTermination::Clean(child_id)) => {
                info!(participant = %id, child = %child_id, "child terminated without error");
            }
            Some(ChildTermination::Failed { id: child_id, reason }) => {
                warn!(participant = %id, child = %child_id, %reason, "child terminated with error");
            }
            None => {}
        }
        if let Some((registry, address)) = owned_channel {
            if let Err(err) = registry.release(address) {
                error!(participant = %id, %address, %err, "failed to release channel");
            }
        }
        result.map(|status| ParticipantExit { status, child })
    })
}

async fn reap(id: ParticipantId, task: ParticipantTask) -> ChildTermination {
    match task.await {
        Ok(Ok(_)) => ChildTermination::Clean(id),
        Ok(Err(err)) => ChildTermination::Failed {
            id,
            reason: err.to_string(),
        },
        Err(err) => ChildTermination::Failed {
            id,
            reason: err.to_string(),
        },
    }
}
