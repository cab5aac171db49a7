// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Validated startup configuration handed to the topology builder.

use crate::error::ConfigError;
use std::time::Duration;

/// Default path token shared by every edge of a chain.
pub const DEFAULT_PATH_TOKEN: &str = "./pingpong";
/// Default idle backoff between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default per-channel queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Startup parameters for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Round trips Root waits for before ending the game.
    pub total_rounds: u32,
    /// Number of participants in the chain, Root included.
    pub participant_count: u32,
    /// Sleep between empty polls.
    pub poll_interval: Duration,
    /// Balls a channel holds before sends fail.
    pub channel_capacity: usize,
    /// Shared token combined with each edge discriminator.
    pub path_token: String,
    /// Place the first ball on Root's inbox when the game launches.
    pub serve_on_start: bool,
    /// Seed for discriminator selection; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl GameConfig {
    /// Configuration with defaults for everything but the two required counts.
    pub fn new(total_rounds: u32, participant_count: u32) -> Self {
        Self {
            total_rounds,
            participant_count,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            path_token: DEFAULT_PATH_TOKEN.to_owned(),
            serve_on_start: true,
            seed: None,
        }
    }

    /// Parse the two required counts from raw command-line strings.
    pub fn from_args(rounds: &str, players: &str) -> Result<Self, ConfigError> {
        let total_rounds = parse_count("rounds", rounds)?;
        let participant_count = parse_count("players", players)?;
        let config = Self::new(total_rounds, participant_count);
        config.validate()?;
        Ok(config)
    }

    /// Override the idle backoff.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Override the path token.
    pub fn with_path_token(mut self, token: impl Into<String>) -> Self {
        self.path_token = token.into();
        self
    }

    /// Fix the discriminator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Toggle the automatic first serve.
    pub fn with_serve_on_start(mut self, serve: bool) -> Self {
        self.serve_on_start = serve;
        self
    }

    /// Check every invariant; the first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.participant_count == 0 {
            return Err(ConfigError::ZeroParticipants);
        }
        if self.path_token.trim().is_empty() {
            return Err(ConfigError::EmptyPathToken);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

fn parse_count(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim().parse::<u32>().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(GameConfig::new(2, 3).validate(), Ok(()));
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert_eq!(GameConfig::new(0, 3).validate(), Err(ConfigError::ZeroRounds));
        assert_eq!(
            GameConfig::new(1, 0).validate(),
            Err(ConfigError::ZeroParticipants)
        );
    }

    #[test]
    fn from_args_rejects_garbage_and_zero() {
        assert!(matches!(
            GameConfig::from_args("two", "3"),
            Err(ConfigError::Invalid { name: "rounds", .. })
        ));
        assert!(matches!(
            GameConfig::from_args("2", "-1"),
            Err(ConfigError::Invalid { name: "players", .. })
        ));
        assert_eq!(
            GameConfig::from_args("2", "0"),
            Err(ConfigError::ZeroParticipants)
        );
        let ok = GameConfig::from_args(" 4 ", "5").unwrap();
        assert_eq!((ok.total_rounds, ok.participant_count), (4, 5));
    }

    #[test]
    fn ambient_fields_are_checked() {
        let base = GameConfig::new(1, 1);
        assert_eq!(
            base.clone().with_path_token("  ").validate(),
            Err(ConfigError::EmptyPathToken)
        );
        assert_eq!(
            base.clone().with_channel_capacity(0).validate(),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            base.with_poll_interval(Duration::ZERO).validate(),
            Err(ConfigError::ZeroPollInterval)
        );
    }
}
