// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stats Block: externally readable `(sent, received)` records per participant.
//!
//! A publish always replaces both counters together. [`InMemoryStatsStore`]
//! packs the pair into one `AtomicU64`; [`FsStatsStore`] writes a temp file
//! and renames it over the record. Readers therefore never see a torn pair.

use crate::error::ResourceError;
use crate::ident::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Counters as of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Balls this participant has sent.
    pub sent: u32,
    /// Balls this participant has received.
    pub received: u32,
}

impl StatsSnapshot {
    /// Build a snapshot.
    pub const fn new(sent: u32, received: u32) -> Self {
        Self { sent, received }
    }

    const fn pack(self) -> u64 {
        ((self.sent as u64) << 32) | self.received as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn unpack(raw: u64) -> Self {
        Self {
            sent: (raw >> 32) as u32,
            received: raw as u32,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sent ball: {}, received ball: {}", self.sent, self.received)
    }
}

/// Storage port for Stats Block records.
pub trait StatsStore: Send + Sync {
    /// Replace the record for `id` (creating it if absent).
    fn publish(&self, id: ParticipantId, snapshot: StatsSnapshot) -> Result<(), ResourceError>;
    /// Current record for `id`, or `None` if never published.
    fn read(&self, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError>;
}

impl<S: StatsStore + ?Sized> StatsStore for Arc<S> {
    fn publish(&self, id: ParticipantId, snapshot: StatsSnapshot) -> Result<(), ResourceError> {
        (**self).publish(id, snapshot)
    }

    fn read(&self, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
        (**self).read(id)
    }
}

/// Process-local store. Cloning shares the records.
#[derive(Clone, Default)]
pub struct InMemoryStatsStore {
    cells: Arc<Mutex<HashMap<ParticipantId, Arc<AtomicU64>>>>,
}

impl InMemoryStatsStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: ParticipantId, create: bool) -> Option<Arc<AtomicU64>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        if create {
            Some(Arc::clone(
                cells.entry(id).or_insert_with(|| Arc::new(AtomicU64::new(0))),
            ))
        } else {
            cells.get(&id).cloned()
        }
    }

    /// Ids with a record, ascending.
    pub fn ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self
            .cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl StatsStore for InMemoryStatsStore {
    fn publish(&self, id: ParticipantId, snapshot: StatsSnapshot) -> Result<(), ResourceError> {
        if let Some(cell) = self.cell(id, true) {
            cell.store(snapshot.pack(), Ordering::Release);
        }
        Ok(())
    }

    fn read(&self, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
        Ok(self
            .cell(id, false)
            .map(|cell| StatsSnapshot::unpack(cell.load(Ordering::Acquire))))
    }
}

impl fmt::Debug for InMemoryStatsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStatsStore")
            .field("ids", &self.ids())
            .finish()
    }
}

/// One JSON file per participant (`shared_<id>.json`) in a directory any tool can read.
#[derive(Debug, Clone)]
pub struct FsStatsStore {
    dir: PathBuf,
}

impl FsStatsStore {
    /// Store rooted at `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`.
    pub fn path_for(&self, id: ParticipantId) -> PathBuf {
        self.dir.join(record_file_name(id))
    }
}

/// File name of the record for `id`.
pub fn record_file_name(id: ParticipantId) -> String {
    format!("shared_{}.json", id.get())
}

/// Read one record straight from a stats directory without constructing a store.
pub fn read_record(dir: &Path, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
    read_file(&dir.join(record_file_name(id)), id)
}

fn read_file(path: &Path, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ResourceError::Malformed { id, source }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ResourceError::Io { id, source }),
    }
}

impl StatsStore for FsStatsStore {
    fn publish(&self, id: ParticipantId, snapshot: StatsSnapshot) -> Result<(), ResourceError> {
        let data =
            serde_json::to_vec(&snapshot).map_err(|source| ResourceError::Malformed { id, source })?;
        let tmp = self.dir.join(format!(".{}.tmp", record_file_name(id)));
        fs::write(&tmp, data).map_err(|source| ResourceError::Io { id, source })?;
        fs::rename(&tmp, self.path_for(id)).map_err(|source| ResourceError::Io { id, source })
    }

    fn read(&self, id: ParticipantId) -> Result<Option<StatsSnapshot>, ResourceError> {
        read_file(&self.path_for(id), id)
    }
}

/// A participant's attachment to its own record.
#[derive(Clone)]
pub struct StatsBlock {
    id: ParticipantId,
    store: Arc<dyn StatsStore>,
}

impl StatsBlock {
    /// Create or re-open the record for `id` and publish `initial` into it.
    pub fn attach(
        store: Arc<dyn StatsStore>,
        id: ParticipantId,
        initial: StatsSnapshot,
    ) -> Result<Self, ResourceError> {
        store.publish(id, initial)?;
        Ok(Self { id, store })
    }

    /// Owner of the record.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Overwrite the record.
    pub fn publish(&self, snapshot: StatsSnapshot) -> Result<(), ResourceError> {
        self.store.publish(self.id, snapshot)
    }

    /// Read the record back as an external observer would.
    pub fn read(&self) -> Result<Option<StatsSnapshot>, ResourceError> {
        self.store.read(self.id)
    }
}

impl fmt::Debug for StatsBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsBlock").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pack_round_trips_extremes() {
        let snap = StatsSnapshot::new(u32::MAX, 7);
        assert_eq!(StatsSnapshot::unpack(snap.pack()), snap);
    }

    #[test]
    fn in_memory_read_of_unknown_id_is_none() {
        let store = InMemoryStatsStore::new();
        assert_eq!(store.read(ParticipantId::new(1)).unwrap(), None);
    }

    #[test]
    fn concurrent_reader_never_sees_a_torn_pair() {
        let store = InMemoryStatsStore::new();
        let id = ParticipantId::new(1);
        store.publish(id, StatsSnapshot::default()).unwrap();

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for n in 1..=20_000u32 {
                    store.publish(id, StatsSnapshot::new(n, n)).unwrap();
                }
            })
        };
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..20_000 {
                    let snap = store.read(id).unwrap().unwrap();
                    assert_eq!(snap.sent, snap.received, "torn read: {snap:?}");
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.read(id).unwrap(), Some(StatsSnapshot::new(20_000, 20_000)));
    }

    #[test]
    fn fs_store_publishes_and_replaces_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatsStore::new(dir.path().join("stats")).unwrap();
        let id = ParticipantId::new(4);

        assert_eq!(store.read(id).unwrap(), None);
        store.publish(id, StatsSnapshot::new(3, 2)).unwrap();
        assert_eq!(store.read(id).unwrap(), Some(StatsSnapshot::new(3, 2)));
        assert_eq!(
            read_record(store.dir(), id).unwrap(),
            Some(StatsSnapshot::new(3, 2))
        );
        assert!(store.path_for(id).ends_with("shared_4.json"));

        store.publish(id, StatsSnapshot::new(4, 3)).unwrap();
        assert_eq!(store.read(id).unwrap(), Some(StatsSnapshot::new(4, 3)));
    }

    #[test]
    fn fs_store_reports_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatsStore::new(dir.path()).unwrap();
        let id = ParticipantId::new(9);
        fs::write(store.path_for(id), b"not json").unwrap();
        assert!(matches!(
            store.read(id),
            Err(ResourceError::Malformed { .. })
        ));
    }

    #[test]
    fn attach_publishes_initial_record() {
        let store = Arc::new(InMemoryStatsStore::new());
        let block = StatsBlock::attach(store.clone(), ParticipantId::new(2), StatsSnapshot::default())
            .unwrap();
        assert_eq!(block.read().unwrap(), Some(StatsSnapshot::default()));
        block.publish(StatsSnapshot::new(1, 1)).unwrap();
        assert_eq!(
            store.read(ParticipantId::new(2)).unwrap(),
            Some(StatsSnapshot::new(1, 1))
        );
    }
}
