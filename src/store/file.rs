// src/store/file.rs
//! JSON-file backend: one file per record at `<root>/<kind>/<fingerprint>.json`.
//! Writes go to a temp file first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use super::{fingerprint, Clock, RecordKind, RecordMeta, RetentionRecord, RetentionStore, SystemClock};
use crate::error::StoreError;

pub struct FileStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn with_system_clock(root: impl Into<PathBuf>) -> Self {
        Self::new(root, Arc::new(SystemClock))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: RecordKind, url: &str) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(format!("{}.json", fingerprint(url)))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<RetentionRecord>, StoreError> {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let record: RetentionRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(record))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl RetentionStore for FileStore {
    async fn exists(&self, kind: RecordKind, url: &str) -> Result<bool, StoreError> {
        let path = self.record_path(kind, url);
        let Some(record) = self.read_record(&path).await? else {
            return Ok(false);
        };
        if record.meta.kind() != kind {
            return Err(StoreError::Corrupt {
                key: path.display().to_string(),
                reason: format!("expected {} record", kind.as_str()),
            });
        }
        Ok(record.is_live(self.clock.now()))
    }

    async fn save(&self, url: &str, meta: RecordMeta) -> Result<(), StoreError> {
        let path = self.record_path(meta.kind(), url);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
        }
        let record = RetentionRecord {
            timestamp: self.clock.now(),
            meta,
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| StoreError::Corrupt {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{retention_window, ManualClock, RejectReason};
    use chrono::{Duration, TimeZone, Utc};

    fn notified() -> RecordMeta {
        RecordMeta::Notified {
            delivery_id: "1234".into(),
            title: "Hello".into(),
            score: 77,
        }
    }

    #[tokio::test]
    async fn save_then_exists_and_expire() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let store = FileStore::new(dir.path(), Arc::new(clock.clone()));
        let url = "https://blog.test/post?utm_source=x&lang=ja";

        assert!(!store.exists(RecordKind::Notified, url).await.unwrap());
        store.save(url, notified()).await.unwrap();
        assert!(store.exists(RecordKind::Notified, url).await.unwrap());
        assert!(!store.exists(RecordKind::Rejected, url).await.unwrap());

        clock.advance(retention_window() + Duration::hours(1));
        assert!(!store.exists(RecordKind::Notified, url).await.unwrap());
    }

    #[tokio::test]
    async fn record_lands_under_fingerprint_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::with_system_clock(dir.path());
        let url = "https://blog.test/a b/ü";
        store
            .save(
                url,
                RecordMeta::Rejected {
                    reason: RejectReason::LowRelevance,
                    score: Some(20),
                },
            )
            .await
            .unwrap();
        let expected = dir
            .path()
            .join("rejected")
            .join(format!("{}.json", fingerprint(url)));
        assert!(expected.exists());
        let raw = std::fs::read_to_string(expected).unwrap();
        assert!(raw.contains("\"low_relevance\""));
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::with_system_clock(dir.path());
        let url = "https://blog.test/broken";
        let path = dir
            .path()
            .join("notified")
            .join(format!("{}.json", fingerprint(url)));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = store.exists(RecordKind::Notified, url).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
