// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operator preferences for the pingpong daemon.

use pingpong_proto::default_socket_path;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Config key the daemon stores its preferences under.
pub const HOST_PREFS_KEY: &str = "pingpongd";

/// Settings that outlive a single game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPrefs {
    /// Unix socket the control server listens on.
    pub socket_path: String,
    /// Directory holding one Stats Block file per participant.
    pub stats_dir: String,
    /// Idle backoff between polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Balls a channel holds before sends fail.
    pub channel_capacity: usize,
    /// Token shared by every edge of the chain.
    pub path_token: String,
}

impl Default for HostPrefs {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path().display().to_string(),
            stats_dir: default_stats_dir().display().to_string(),
            poll_interval_ms: 50,
            channel_capacity: 64,
            path_token: "./pingpong".to_owned(),
        }
    }
}

/// Default Stats Block directory, next to the control socket.
pub fn default_stats_dir() -> PathBuf {
    default_socket_path()
        .parent()
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join("pingpong-stats")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let prefs: HostPrefs = serde_json::from_str(r#"{"poll_interval_ms": 5}"#).unwrap();
        assert_eq!(prefs.poll_interval_ms, 5);
        assert_eq!(prefs.channel_capacity, HostPrefs::default().channel_capacity);
    }

    #[test]
    fn stats_dir_sits_beside_socket() {
        let socket = default_socket_path();
        assert_eq!(default_stats_dir().parent(), socket.parent());
    }
}
