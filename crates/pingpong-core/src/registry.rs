// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Channel registry: deterministic edge addressing plus get-or-create channels.
//!
//! An edge is named by a shared path token and a numeric discriminator. Both
//! ends hash the pair to the same [`ChannelAddress`] without talking to each
//! other, then [`ChannelRegistry::open`] hands out the one channel living at
//! that address.

use crate::channel::BallChannel;
use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Address of one communication edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelAddress(u64);

impl ChannelAddress {
    /// Raw address value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Path token + discriminator pair naming an edge; what gets handed to both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    /// Token shared by every edge of one chain.
    pub path_token: String,
    /// Per-edge value chosen when the child end is created.
    pub discriminator: u32,
}

impl ChannelKey {
    /// Build a key.
    pub fn new(path_token: impl Into<String>, discriminator: u32) -> Self {
        Self {
            path_token: path_token.into(),
            discriminator,
        }
    }

    /// Resolve this key to its address.
    pub fn resolve(&self) -> Result<ChannelAddress, ChannelError> {
        resolve(&self.path_token, self.discriminator)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path_token, self.discriminator)
    }
}

/// Pure, deterministic mapping from `(path_token, discriminator)` to an address.
pub fn resolve(path_token: &str, discriminator: u32) -> Result<ChannelAddress, ChannelError> {
    if path_token.trim().is_empty() {
        return Err(ChannelError::Unresolvable(path_token.to_owned()));
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"pingpong:edge:");
    hasher.update(&(path_token.len() as u64).to_le_bytes());
    hasher.update(path_token.as_bytes());
    hasher.update(&discriminator.to_le_bytes());
    let digest = hasher.finalize();
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest.as_bytes()[..8]);
    Ok(ChannelAddress(u64::from_le_bytes(raw)))
}

struct RegistryInner {
    channels: HashMap<ChannelAddress, BallChannel>,
    limit: usize,
    capacity: usize,
}

/// Shared map from addresses to live channels. Cloning shares the map.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ChannelRegistry {
    /// Registry whose channels each hold up to `capacity` balls. The number
    /// of live channels is unbounded.
    pub fn new(capacity: usize) -> Self {
        Self::with_limit(capacity, usize::MAX)
    }

    /// Registry that refuses to hold more than `limit` channels. A game needs
    /// one channel per participant.
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                channels: HashMap::new(),
                limit,
                capacity,
            })),
        }
    }

    /// Attach to the channel at `address`, creating it if absent.
    pub fn open(&self, address: ChannelAddress) -> Result<BallChannel, ChannelError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inner.channels.get(&address) {
            return Ok(existing.clone());
        }
        if inner.channels.len() >= inner.limit {
            return Err(ChannelError::RegistryFull { limit: inner.limit });
        }
        let channel = BallChannel::new(address, inner.capacity);
        inner.channels.insert(address, channel.clone());
        debug!(%address, "channel created");
        Ok(channel)
    }

    /// Resolve `key` and open the channel behind it.
    pub fn open_key(&self, key: &ChannelKey) -> Result<BallChannel, ChannelError> {
        self.open(key.resolve()?)
    }

    /// Close the channel at `address` and forget it. Handles still held by
    /// participants observe [`ChannelError::Closed`] afterwards.
    pub fn release(&self, address: ChannelAddress) -> Result<(), ChannelError> {
        let removed = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .remove(&address);
        match removed {
            Some(channel) => {
                channel.close();
                debug!(%address, "channel released");
                Ok(())
            }
            None => Err(ChannelError::Unknown(address)),
        }
    }

    /// Whether a channel lives at `address`.
    pub fn contains(&self, address: ChannelAddress) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .contains_key(&address)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .len()
    }

    /// Whether the registry holds no channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ball::{Ball, Direction};
    use crate::ident::ParticipantId;

    #[test]
    fn resolve_is_deterministic_and_discriminating() {
        let a = resolve("./pingpong", 21).unwrap();
        assert_eq!(a, resolve("./pingpong", 21).unwrap());
        assert_ne!(a, resolve("./pingpong", 22).unwrap());
        assert_ne!(a, resolve("./other", 21).unwrap());
        assert_eq!(a, ChannelKey::new("./pingpong", 21).resolve().unwrap());
    }

    #[test]
    fn resolve_rejects_empty_token() {
        assert_eq!(
            resolve("", 1),
            Err(ChannelError::Unresolvable(String::new()))
        );
    }

    #[test]
    fn open_attaches_to_existing_channel() {
        let registry = ChannelRegistry::new(8);
        let addr = resolve("./pingpong", 5).unwrap();
        let first = registry.open(addr).unwrap();
        let second = registry.open(addr).unwrap();
        first.send(Ball::forward(ParticipantId::new(2))).unwrap();
        let got = second.try_receive(Direction::Forward).unwrap();
        assert_eq!(got.map(|b| b.target), Some(ParticipantId::new(2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn open_fails_when_registry_is_full() {
        let registry = ChannelRegistry::with_limit(4, 1);
        registry.open(resolve("./pingpong", 1).unwrap()).unwrap();
        assert_eq!(
            registry.open(resolve("./pingpong", 2).unwrap()).err(),
            Some(ChannelError::RegistryFull { limit: 1 })
        );
    }

    #[test]
    fn default_registry_has_no_channel_cap() {
        let registry = ChannelRegistry::new(1);
        for discriminator in 1..=5000 {
            registry.open(resolve("./pingpong", discriminator).unwrap()).unwrap();
        }
        assert_eq!(registry.len(), 5000);
    }

    #[test]
    fn release_closes_outstanding_handles() {
        let registry = ChannelRegistry::new(4);
        let addr = resolve("./pingpong", 9).unwrap();
        let handle = registry.open(addr).unwrap();
        registry.release(addr).unwrap();
        assert!(!registry.contains(addr));
        assert_eq!(
            handle.send(Ball::forward(ParticipantId::new(1))),
            Err(ChannelError::Closed(addr))
        );
        assert_eq!(registry.release(addr), Err(ChannelError::Unknown(addr)));
    }
}
