// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stats Block store that can be told to fail.

use pingpong_core::{InMemoryStatsStore, ParticipantId, ResourceError, StatsSnapshot, StatsStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps an [`InMemoryStatsStore`]; publishes fail while the toggle is set.
#[derive(Clone, Default)]
pub struct FlakyStatsStore {
    inner: InMemoryStatsStore,
    failing: Arc<AtomicBool>,
    publishes: Arc<AtomicUsize>,
}

impl FlakyStatsStore {
    /// Store that succeeds until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish from now on (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Publish attempts, failed ones included.
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    /// The backing store.
    pub fn inner(&self) -> &InMemoryStatsStore {
        &self.inner
    }
}

impl StatsStore for FlakyStatsStore {
    fn publish(&self, id: ParticipantId, snapshot: StatsSnapshot) -> Result<(), ResourceError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResourceError::Unavailable {
                id,
                reason: "simulated publish failure".into(),
            });
        }
        self.inner.publish(id, snapshot)
    }

    fn read(&self, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
        self.inner.read(id)
    }
}
