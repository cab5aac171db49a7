// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for pingpong crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - in-memory config store with call counters and failure toggles
//! - [`stats`] - a Stats Block store that fails on demand
//! - [`chain`] - a planned chain driven step by step without tasks

pub mod chain;
pub mod config;
pub mod stats;

pub use chain::ChainFixture;
pub use config::InMemoryConfigStore;
pub use stats::FlakyStatsStore;
