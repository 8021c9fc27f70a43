//! Sync-slot persistence
//!
//! A slot is a named, ordered sequence of persisted records backed by one
//! JSON file under the state directory (`<state-dir>/<slot>.json`). Slots
//! double as the pending work queue (`subjects`) and the completed-results
//! journal (`books`): loaded once at phase start, mutated in memory during
//! the run, rewritten in full when the phase flushes.

use crate::item::RawRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during slot persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on slot `{slot}`: {source}")]
    Io {
        slot: String,
        source: std::io::Error,
    },

    #[error("slot `{slot}` is not a valid record list: {source}")]
    Decode {
        slot: String,
        source: serde_json::Error,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// On-disk store of named record slots.
///
/// Single crawl process, single writer per slot; no locking discipline beyond
/// "flush before the reading phase starts" is required.
#[derive(Debug)]
pub struct SyncStore {
    dir: PathBuf,
    slots: HashMap<String, Vec<RawRecord>>,
}

impl SyncStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: HashMap::new(),
        }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }

    /// Loads a slot into memory and returns its records in persisted order.
    ///
    /// An absent backing file is an empty slot, never an error. Loading an
    /// already-loaded slot returns the in-memory state unchanged.
    pub fn load(&mut self, slot: &str) -> StoreResult<&[RawRecord]> {
        if !self.slots.contains_key(slot) {
            let records = read_slot_file(&self.slot_path(slot), slot)?;
            self.slots.insert(slot.to_string(), records);
        }
        Ok(self.slots.get(slot).map(Vec::as_slice).unwrap_or_default())
    }

    /// Appends a record to a slot's in-memory sequence.
    pub fn append(&mut self, slot: &str, record: RawRecord) {
        self.slots.entry(slot.to_string()).or_default().push(record);
    }

    /// Pops the most recently appended record (LIFO), used for queue slots.
    pub fn pop(&mut self, slot: &str) -> Option<RawRecord> {
        self.slots.get_mut(slot)?.pop()
    }

    pub fn len(&self, slot: &str) -> usize {
        self.slots.get(slot).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, slot: &str) -> bool {
        self.len(slot) == 0
    }

    /// Rewrites the slot's backing file from the in-memory sequence.
    ///
    /// Creates the state directory if needed. Idempotent: flushing an
    /// unchanged slot rewrites the same content.
    pub fn flush(&mut self, slot: &str) -> StoreResult<()> {
        let records = self.slots.entry(slot.to_string()).or_default();
        let count = records.len();
        let encoded =
            serde_json::to_string_pretty(&*records).map_err(|source| StoreError::Decode {
                slot: slot.to_string(),
                source,
            })?;

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            slot: slot.to_string(),
            source,
        })?;
        std::fs::write(self.slot_path(slot), encoded).map_err(|source| StoreError::Io {
            slot: slot.to_string(),
            source,
        })?;

        tracing::debug!(slot, records = count, "slot flushed");
        Ok(())
    }
}

fn read_slot_file(path: &Path, slot: &str) -> StoreResult<Vec<RawRecord>> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Decode {
            slot: slot.to_string(),
            source,
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            slot: slot.to_string(),
            source,
        }),
    }
}
