//! In-memory progress records, one per batch.
//!
//! Entries live from batch creation until [`StatusStore::remove`]; nothing
//! expires on its own.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Identifier of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Usable as a file stem: non-empty, ASCII letters, digits, `-` and `_` only.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh batch identifiers.
pub trait BatchIdGenerator: Send + Sync {
    fn next_id(&self) -> BatchId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidBatchIds;

impl BatchIdGenerator for UuidBatchIds {
    fn next_id(&self) -> BatchId {
        BatchId(Uuid::new_v4().to_string())
    }
}

/// A per-file failure as reported to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    pub total: usize,
    pub processed: usize,
    pub completed: bool,
    pub errors: Vec<FileError>,
    /// Set when the batch as a whole failed; `completed` then stays false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl BatchStatus {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Files that made it into the archive so far.
    pub fn succeeded(&self) -> usize {
        self.processed - self.errors.len()
    }
}

/// Answer to a status query; unknown ids are not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusLookup {
    Found(BatchStatus),
    Missing { error: String },
}

impl StatusLookup {
    pub fn missing() -> Self {
        StatusLookup::Missing {
            error: "Upload not found".to_string(),
        }
    }

    pub fn status(&self) -> Option<&BatchStatus> {
        match self {
            StatusLookup::Found(status) => Some(status),
            StatusLookup::Missing { .. } => None,
        }
    }
}

pub struct StatusStore {
    entries: Mutex<HashMap<BatchId, BatchStatus>>,
    ids: Box<dyn BatchIdGenerator>,
}

impl StatusStore {
    pub fn new(ids: Box<dyn BatchIdGenerator>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ids,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<BatchId, BatchStatus>> {
        // 计数器在任何时刻都是自洽的，锁中毒后继续使用
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: &BatchId, apply: impl FnOnce(&mut BatchStatus)) {
        if let Some(status) = self.entries().get_mut(id) {
            apply(status);
        }
    }

    /// Allocate an id and register `{total, processed: 0, completed: false}` under it.
    pub fn create(&self, total: usize) -> BatchId {
        let id = self.ids.next_id();
        self.entries().insert(id.clone(), BatchStatus::new(total));
        id
    }

    pub fn record_success(&self, id: &BatchId) {
        self.update(id, |status| {
            if status.processed < status.total {
                status.processed += 1;
            }
        });
    }

    pub fn record_failure(&self, id: &BatchId, file: &str, error: &str) {
        self.update(id, |status| {
            if status.processed < status.total {
                status.processed += 1;
                status.errors.push(FileError {
                    file: file.to_string(),
                    error: error.to_string(),
                });
            }
        });
    }

    pub fn mark_completed(&self, id: &BatchId) {
        self.update(id, |status| {
            status.completed = status.processed == status.total;
        });
    }

    pub fn mark_failed(&self, id: &BatchId, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(id, |status| status.failure = Some(reason));
    }

    pub fn lookup(&self, id: &BatchId) -> StatusLookup {
        self.entries()
            .get(id)
            .cloned()
            .map_or_else(StatusLookup::missing, StatusLookup::Found)
    }

    pub fn contains(&self, id: &BatchId) -> bool {
        self.entries().contains_key(id)
    }

    pub fn remove(&self, id: &BatchId) -> Option<BatchStatus> {
        self.entries().remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Sequential(AtomicUsize);

    impl BatchIdGenerator for Sequential {
        fn next_id(&self) -> BatchId {
            BatchId::new(format!("batch-{}", self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    fn store() -> StatusStore {
        StatusStore::new(Box::new(Sequential(AtomicUsize::new(1))))
    }

    #[test]
    fn lifecycle() {
        let store = store();
        let id = store.create(3);
        assert_eq!(id.as_str(), "batch-1");
        assert_eq!(store.lookup(&id), StatusLookup::Found(BatchStatus::new(3)));

        store.record_success(&id);
        store.record_failure(&id, "notes.txt", "Unsupported file format: .txt");
        store.record_success(&id);
        store.mark_completed(&id);

        let status = store.lookup(&id).status().cloned().unwrap();
        assert_eq!(status.processed, 3);
        assert!(status.completed);
        assert_eq!(status.succeeded(), 2);
        assert_eq!(
            status.errors,
            vec![FileError {
                file: "notes.txt".into(),
                error: "Unsupported file format: .txt".into()
            }]
        );

        assert!(store.remove(&id).is_some());
        assert_eq!(store.lookup(&id), StatusLookup::missing());
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_batch_serializes_as_error_object() {
        let store = store();
        let json = serde_json::to_value(store.lookup(&BatchId::new("nope"))).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Upload not found" }));
    }

    #[test]
    fn status_serializes_flat() {
        let store = store();
        let id = store.create(1);
        store.record_failure(&id, "a.mp4", "No video stream found");
        store.mark_completed(&id);

        let json = serde_json::to_value(store.lookup(&id)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total": 1,
                "processed": 1,
                "completed": true,
                "errors": [{ "file": "a.mp4", "error": "No video stream found" }]
            })
        );
    }

    #[test]
    fn processed_never_exceeds_total() {
        let store = store();
        let id = store.create(1);
        store.record_success(&id);
        store.record_success(&id);
        store.record_failure(&id, "x", "late");
        let status = store.lookup(&id).status().cloned().unwrap();
        assert_eq!(status.processed, 1);
        assert!(status.errors.is_empty());
    }

    #[test]
    fn failure_is_reported_without_completion() {
        let store = store();
        let id = store.create(2);
        store.mark_failed(&id, "Failed to write archive: disk full");
        let status = store.lookup(&id).status().cloned().unwrap();
        assert!(!status.completed);
        assert_eq!(status.failure.as_deref(), Some("Failed to write archive: disk full"));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(store());
        let id = store.create(800);
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        if n % 10 == 0 {
                            store.record_failure(&id, &format!("{worker}-{n}"), "boom");
                        } else {
                            store.record_success(&id);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let status = store.lookup(&id).status().cloned().unwrap();
        assert_eq!(status.processed, 800);
        assert_eq!(status.errors.len(), 80);
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidBatchIds;
        let id = ids.next_id();
        assert_ne!(id, ids.next_id());
        assert!(id.is_path_safe());
    }

    #[test]
    fn ids_with_path_components_are_unsafe() {
        for id in ["../x", "a/b", "a\\b", "..", "", "x.zip", "/etc/passwd"] {
            assert!(!BatchId::new(id).is_path_safe(), "{id:?} accepted");
        }
        assert!(BatchId::new("batch-1").is_path_safe());
    }

    #[test]
    fn completion_before_all_files_resolve_is_ignored() {
        let store = store();
        let id = store.create(2);
        store.record_success(&id);
        store.mark_completed(&id);
        assert!(!store.lookup(&id).status().unwrap().completed);
    }

    #[test]
    fn contains_tracks_issued_ids() {
        let store = store();
        let id = store.create(1);
        assert!(store.contains(&id));
        assert!(!store.contains(&BatchId::new("batch-99")));
        store.remove(&id);
        assert!(!store.contains(&id));
    }
}
