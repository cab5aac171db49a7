// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant poll loop and the shared handle used by control operations.
//!
//! The loop and the control operations (`inject_ball`, `dump_stats`) reach
//! the participant through one mutex, so their effects on counters and
//! channels are serialized. The lock is never held across an `.await`.

use crate::error::GameError;
use crate::ident::{ParticipantId, Role};
use crate::participant::{InjectOutcome, NodeState, Outcome, Participant};
use crate::stats::StatsSnapshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Point-in-time view of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantStatus {
    /// Participant identity.
    pub id: ParticipantId,
    /// Position in the chain.
    pub role: Role,
    /// Current state.
    pub state: NodeState,
    /// Completed rounds.
    pub round: u32,
    /// In-memory counters.
    pub stats: StatsSnapshot,
}

/// Cloneable handle to a running participant.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    id: ParticipantId,
    role: Role,
    inner: Arc<Mutex<Participant>>,
}

impl ParticipantHandle {
    /// Wrap a started participant.
    pub fn new(participant: Participant) -> Self {
        Self {
            id: participant.id(),
            role: participant.role(),
            inner: Arc::new(Mutex::new(participant)),
        }
    }

    /// Participant identity.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Position in the chain.
    pub fn role(&self) -> Role {
        self.role
    }

    fn lock(&self) -> MutexGuard<'_, Participant> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one poll step under the participant lock.
    pub fn poll(&self) -> Result<Outcome, GameError> {
        self.lock().poll()
    }

    /// Control operation: feed a new ball (Root only).
    pub fn inject_ball(&self) -> Result<InjectOutcome, GameError> {
        self.lock().inject_ball()
    }

    /// Control operation: report the counters.
    pub fn dump_stats(&self) -> StatsSnapshot {
        self.lock().dump_stats()
    }

    /// Place the opening ball on this participant's inbox.
    pub fn serve(&self) -> Result<(), GameError> {
        Ok(self.lock().serve()?)
    }

    /// Current status without side effects.
    pub fn status(&self) -> ParticipantStatus {
        let participant = self.lock();
        ParticipantStatus {
            id: participant.id(),
            role: participant.role(),
            state: participant.state(),
            round: participant.round(),
            stats: participant.counters(),
        }
    }

    /// Whether the participant reached `Done`.
    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }
}

/// Poll `handle` until it is done, backing off `poll_interval` whenever the
/// inbox has nothing of the expected direction.
///
/// Returns [`GameError::Cancelled`] once `shutdown` flips to `true`.
#[instrument(skip(handle, shutdown), fields(participant = %handle.id()))]
pub async fn run_participant(
    handle: ParticipantHandle,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ParticipantStatus, GameError> {
    let mut shutdown_open = true;
    loop {
        if *shutdown.borrow() {
            debug!("participant cancelled");
            return Err(GameError::Cancelled);
        }
        match handle.poll()? {
            Outcome::Done | Outcome::Finished => break,
            Outcome::Idle => {
                tokio::select! {
                    () = tokio::time::sleep(poll_interval) => {}
                    changed = shutdown.changed(), if shutdown_open => {
                        shutdown_open = changed.is_ok();
                    }
                }
            }
            _ if handle.is_done() => break,
            _ => tokio::task::yield_now().await,
        }
    }
    Ok(handle.status())
}
