use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::{RoadSink, SinkError};
use crate::domain::{ImportedRecord, SurfaceCandidate, SurfaceUpdate};

#[derive(Debug, Clone)]
pub struct StoredRoad {
    pub id: i64,
    pub record: ImportedRecord,
}

#[derive(Debug, Default)]
struct MemoryState {
    roads: Vec<StoredRoad>,
    ids: HashSet<String>,
    indexes_ready: bool,
    insert_calls: Vec<usize>,
    fail_inserts: bool,
    closed: bool,
}

/// In-process road store used for dry runs and tests.
///
/// Mirrors the Postgres store's semantics: unique `osm_id`, conflicting
/// rows dropped individually, keyset scans ordered by id.
#[derive(Debug, Default)]
pub struct MemoryRoadStore {
    state: Mutex<MemoryState>,
}

impl MemoryRoadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose bulk inserts fail as if the connection dropped.
    pub fn failing_inserts() -> Self {
        let store = Self::default();
        store.lock().fail_inserts = true;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().roads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, osm_id: &str) -> bool {
        self.lock().ids.contains(osm_id)
    }

    pub fn get(&self, osm_id: &str) -> Option<StoredRoad> {
        self.lock()
            .roads
            .iter()
            .find(|road| road.record.osm_id == osm_id)
            .cloned()
    }

    /// Sizes of every bulk insert call, in call order.
    pub fn insert_calls(&self) -> Vec<usize> {
        self.lock().insert_calls.clone()
    }

    pub fn indexes_ready(&self) -> bool {
        self.lock().indexes_ready
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Store records directly, bypassing the bulk-insert bookkeeping.
    pub fn seed(&self, records: impl IntoIterator<Item = ImportedRecord>) {
        let mut state = self.lock();
        for record in records {
            insert_one(&mut state, record);
        }
    }
}

fn insert_one(state: &mut MemoryState, record: ImportedRecord) -> bool {
    if !state.ids.insert(record.osm_id.clone()) {
        return false;
    }
    let id = state.roads.len() as i64 + 1;
    state.roads.push(StoredRoad { id, record });
    true
}

impl RoadSink for MemoryRoadStore {
    async fn ensure_indexes(&self) -> Result<(), SinkError> {
        self.lock().indexes_ready = true;
        Ok(())
    }

    async fn exists(&self, osm_id: &str) -> Result<bool, SinkError> {
        Ok(self.contains(osm_id))
    }

    async fn insert_unordered(&self, records: &[ImportedRecord]) -> Result<u64, SinkError> {
        let mut state = self.lock();
        if state.fail_inserts {
            return Err(SinkError::Unavailable("connection reset during bulk insert".to_string()));
        }

        state.insert_calls.push(records.len());
        let inserted = records
            .iter()
            .filter(|record| insert_one(&mut state, (*record).clone()))
            .count();

        Ok(inserted as u64)
    }

    async fn scan_missing_surface(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<SurfaceCandidate>, SinkError> {
        let state = self.lock();
        let page = state
            .roads
            .iter()
            .filter(|road| road.id > after_id && road.record.surface.is_none())
            .filter_map(|road| {
                road.record.other_tags.as_ref().map(|tags| SurfaceCandidate {
                    id: road.id,
                    osm_id: road.record.osm_id.clone(),
                    other_tags: tags.clone(),
                })
            })
            .take(limit.max(0) as usize)
            .collect();

        Ok(page)
    }

    async fn update_surfaces(&self, updates: &[SurfaceUpdate]) -> Result<u64, SinkError> {
        let mut state = self.lock();
        let mut updated = 0;

        for update in updates {
            if let Some(road) = state.roads.iter_mut().find(|road| road.id == update.id) {
                road.record.surface = Some(update.surface.clone());
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}
