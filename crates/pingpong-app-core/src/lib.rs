// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Application services shared by pingpong binaries: a storage port for
//! config blobs and the operator preferences stored through it.

pub mod config;
pub mod prefs;

pub use config::{ConfigService, ConfigStore, PrefsError};
pub use prefs::HostPrefs;
