// src/store/memory.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{fingerprint, Clock, RecordKind, RecordMeta, RetentionRecord, RetentionStore, SystemClock};
use crate::error::StoreError;

/// Process-local store. Used for dry runs and tests; nothing survives a restart.
pub struct MemoryStore {
    records: Mutex<HashMap<(RecordKind, String), RetentionRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Raw record for `url`, ignoring expiry.
    pub fn get(&self, kind: RecordKind, url: &str) -> Option<RetentionRecord> {
        let g = self.records.lock().ok()?;
        g.get(&(kind, fingerprint(url))).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RetentionStore for MemoryStore {
    async fn exists(&self, kind: RecordKind, url: &str) -> Result<bool, StoreError> {
        let g = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(g
            .get(&(kind, fingerprint(url)))
            .is_some_and(|rec| rec.is_live(self.clock.now())))
    }

    async fn save(&self, url: &str, meta: RecordMeta) -> Result<(), StoreError> {
        let record = RetentionRecord {
            timestamp: self.clock.now(),
            meta,
        };
        let mut g = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        g.insert((record.meta.kind(), fingerprint(url)), record);
        Ok(())
    }
}
