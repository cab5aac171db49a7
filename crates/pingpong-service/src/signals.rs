// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! POSIX signal bridge: `SIGUSR1` injects on Root, `SIGUSR2` dumps Root's
//! stats, Ctrl-C cancels the game.

use anyhow::{Context, Result};
use pingpong_core::{
    GameControls, GameError, InjectOutcome, ParticipantHandle, ParticipantId, StatsSnapshot,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Operator signal, decoupled from the OS delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// `SIGUSR1`.
    Inject,
    /// `SIGUSR2`.
    Dump,
    /// `SIGINT`.
    Interrupt,
}

/// What applying a signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEffect {
    /// Root handled an inject.
    Injected(InjectOutcome),
    /// Root's counters.
    Dumped(StatsSnapshot),
    /// Every loop was asked to stop.
    ShutdownRequested,
}

/// Apply `sig` to Root.
pub fn apply(sig: ControlSignal, controls: &GameControls) -> Result<SignalEffect, GameError> {
    match sig {
        ControlSignal::Inject => {
            let root = root_of(controls)?;
            Ok(SignalEffect::Injected(root.inject_ball()?))
        }
        ControlSignal::Dump => {
            let root = root_of(controls)?;
            let stats = root.dump_stats();
            info!(participant = %root.id(), "{stats}");
            Ok(SignalEffect::Dumped(stats))
        }
        ControlSignal::Interrupt => {
            info!("interrupt received, cancelling game");
            controls.shutdown();
            Ok(SignalEffect::ShutdownRequested)
        }
    }
}

fn root_of(controls: &GameControls) -> Result<&ParticipantHandle, GameError> {
    controls
        .root()
        .ok_or_else(|| GameError::UnknownParticipant(ParticipantId::new(1)))
}

/// Translate delivered signals into [`apply`] calls until Ctrl-C.
pub async fn bridge(controls: GameControls) -> Result<()> {
    let mut usr1 = signal(SignalKind::user_defined1()).context("install SIGUSR1 handler")?;
    let mut usr2 = signal(SignalKind::user_defined2()).context("install SIGUSR2 handler")?;
    loop {
        let sig = tokio::select! {
            _ = usr1.recv() => ControlSignal::Inject,
            _ = usr2.recv() => ControlSignal::Dump,
            res = tokio::signal::ctrl_c() => {
                res.context("listen for ctrl-c")?;
                ControlSignal::Interrupt
            }
        };
        match apply(sig, &controls) {
            Ok(SignalEffect::ShutdownRequested) => return Ok(()),
            Ok(effect) => info!(?sig, ?effect, "signal handled"),
            Err(err) => warn!(?sig, %err, "signal failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_core::{ChannelRegistry, Game, GameConfig, IgnoreReason, InMemoryStatsStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn launch(players: u32, serve: bool) -> Game {
        let config = GameConfig::new(1, players)
            .with_seed(1)
            .with_poll_interval(Duration::from_millis(1))
            .with_serve_on_start(serve);
        Game::launch(config, ChannelRegistry::new(8), Arc::new(InMemoryStatsStore::new())).unwrap()
    }

    #[tokio::test]
    async fn usr1_injects_on_root() {
        let game = launch(2, false);
        let controls = game.controls();
        let effect = apply(ControlSignal::Inject, &controls).unwrap();
        assert!(matches!(effect, SignalEffect::Injected(InjectOutcome::Injected { sent: 1, .. })));
        tokio::time::timeout(Duration::from_secs(10), game.wait()).await.unwrap().unwrap();

        let effect = apply(ControlSignal::Inject, &controls).unwrap();
        assert_eq!(effect, SignalEffect::Injected(InjectOutcome::Ignored(IgnoreReason::Finished)));
    }

    #[tokio::test]
    async fn usr2_reads_root_counters_after_the_game() {
        let game = launch(3, true);
        let controls = game.controls();
        tokio::time::timeout(Duration::from_secs(10), game.wait()).await.unwrap().unwrap();
        assert_eq!(
            apply(ControlSignal::Dump, &controls).unwrap(),
            SignalEffect::Dumped(StatsSnapshot::new(1, 1))
        );
    }

    #[tokio::test]
    async fn interrupt_cancels() {
        let game = launch(2, false);
        let controls = game.controls();
        assert_eq!(
            apply(ControlSignal::Interrupt, &controls).unwrap(),
            SignalEffect::ShutdownRequested
        );
        let result = tokio::time::timeout(Duration::from_secs(10), game.wait()).await.unwrap();
        assert!(matches!(result, Err(GameError::Cancelled)));
    }
}
