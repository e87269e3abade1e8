use std::collections::HashSet;

use super::RunCounters;
use crate::db::{RoadSink, SinkError};
use crate::domain::ImportedRecord;

pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    Duplicate,
}

/// Dedup-aware batching writer in front of a [`RoadSink`].
///
/// Every candidate is checked against the sink by `osm_id` before it is
/// queued, and ids already waiting in the unflushed batch are rejected too, so
/// the first occurrence of an id always wins.
pub struct BatchLoader<'a, S> {
    sink: &'a S,
    capacity: usize,
    batch: Vec<ImportedRecord>,
    pending_ids: HashSet<String>,
}

impl<'a, S: RoadSink> BatchLoader<'a, S> {
    pub fn new(sink: &'a S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            capacity,
            batch: Vec::with_capacity(capacity),
            pending_ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub async fn submit(
        &mut self,
        record: ImportedRecord,
        counters: &mut RunCounters,
    ) -> Result<Admission, SinkError> {
        if self.pending_ids.contains(&record.osm_id) || self.sink.exists(&record.osm_id).await? {
            counters.duplicates += 1;
            return Ok(Admission::Duplicate);
        }

        self.pending_ids.insert(record.osm_id.clone());
        self.batch.push(record);

        if self.batch.len() >= self.capacity {
            self.flush(counters).await?;
        }

        Ok(Admission::Queued)
    }

    /// Write the pending batch with one unordered bulk insert.
    pub async fn flush(&mut self, counters: &mut RunCounters) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let submitted = self.batch.len() as u64;
        let inserted = self.sink.insert_unordered(&self.batch).await?;

        counters.imported += inserted;
        counters.duplicates += submitted.saturating_sub(inserted);
        counters.batches_flushed += 1;

        tracing::debug!(
            "Flushed batch {}: {}/{} rows written",
            counters.batches_flushed,
            inserted,
            submitted
        );

        self.batch.clear();
        self.pending_ids.clear();
        Ok(())
    }
}
