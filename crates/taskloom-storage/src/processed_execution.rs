//! Processed-execution tracker - exactly-once claims for due task occurrences.
//!
//! Each claim is keyed by `(store_id, task_id, due timestamp)`. The key is a
//! composite string `"{store_id}\u{1f}{task_id}\u{1f}{due_ms:020}"` so that a
//! prefix scan on `"{store_id}\u{1f}"` lists one store's claims. The value is
//! the claim time in milliseconds.
//!
//! Claims are created by [`ProcessedExecutionTracker::try_claim`] and removed
//! only by [`ProcessedExecutionTracker::cleanup`]. Age-based cleanup can drop a
//! claim whose run is still in flight; if the store has not advanced the task's
//! next execution by then, the same occurrence may run again.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::time_utils::{days_to_ms, now_ms};

const PROCESSED_EXECUTIONS: TableDefinition<&str, i64> =
    TableDefinition::new("processed_executions");

const KEY_SEPARATOR: char = '\u{1f}';

/// A stored claim, decoded from its composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionClaim {
    pub store_id: String,
    pub task_id: String,
    pub due_at_ms: i64,
    pub processed_at_ms: i64,
}

fn claim_key(store_id: &str, task_id: &str, due_ms: i64) -> String {
    format!("{store_id}{KEY_SEPARATOR}{task_id}{KEY_SEPARATOR}{due_ms:020}")
}

/// Key range covering every claim of one store. `' '` sorts directly after the separator.
fn store_key_range(store_id: &str) -> (String, String) {
    (
        format!("{store_id}{KEY_SEPARATOR}"),
        format!("{store_id}\u{20}"),
    )
}

fn parse_claim_key(key: &str, processed_at_ms: i64) -> Result<ExecutionClaim> {
    let mut parts = key.rsplitn(3, KEY_SEPARATOR);
    let due = parts.next();
    let task_id = parts.next();
    let store_id = parts.next();
    match (store_id, task_id, due) {
        (Some(store_id), Some(task_id), Some(due)) => Ok(ExecutionClaim {
            store_id: store_id.to_string(),
            task_id: task_id.to_string(),
            due_at_ms: due
                .parse::<i64>()
                .map_err(|e| anyhow!("Invalid due timestamp in claim key {:?}: {}", key, e))?,
            processed_at_ms,
        }),
        _ => Err(anyhow!("Invalid claim key format: {:?}", key)),
    }
}

/// Durable ledger of processed task occurrences.
///
/// Cheap to share behind an `Arc`. The database handle is released by
/// [`close`](Self::close) or when the tracker is dropped; operations after
/// `close` return an error.
pub struct ProcessedExecutionTracker {
    db: RwLock<Option<Arc<Database>>>,
}

impl ProcessedExecutionTracker {
    /// Open (or create) the tracker database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::create(path)?);
        debug!(path = %path.display(), "Opened processed-execution tracker");
        Self::new(db)
    }

    /// Create a tracker on an already opened database.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PROCESSED_EXECUTIONS)?;
        write_txn.commit()?;

        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    /// Release the database handle. Idempotent.
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            debug!("Closed processed-execution tracker");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    fn db(&self) -> Result<Arc<Database>> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| anyhow!("Processed-execution tracker is closed"))
    }

    /// Atomically claim one due occurrence.
    ///
    /// Returns `true` only for the caller whose write transaction inserted
    /// the key. redb serializes write transactions, so among concurrent
    /// callers on the same key exactly one sees `true`.
    pub fn try_claim(&self, store_id: &str, task_id: &str, due: DateTime<Utc>) -> Result<bool> {
        let db = self.db()?;
        let key = claim_key(store_id, task_id, due.timestamp_millis());

        let write_txn = db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(PROCESSED_EXECUTIONS)?;
            if table.get(key.as_str())?.is_some() {
                false
            } else {
                table.insert(key.as_str(), now_ms())?;
                true
            }
        };

        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    /// Check whether an occurrence has already been claimed.
    pub fn is_claimed(&self, store_id: &str, task_id: &str, due: DateTime<Utc>) -> Result<bool> {
        let db = self.db()?;
        let key = claim_key(store_id, task_id, due.timestamp_millis());
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_EXECUTIONS)?;
        Ok(table.get(key.as_str())?.is_some())
    }

    /// Number of stored claims, optionally restricted to one store.
    pub fn count_for(&self, store_id: Option<&str>) -> Result<usize> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_EXECUTIONS)?;

        match store_id {
            None => Ok(table.len()? as usize),
            Some(store_id) => {
                let (start, end) = store_key_range(store_id);
                let mut count = 0;
                for entry in table.range(start.as_str()..end.as_str())? {
                    entry?;
                    count += 1;
                }
                Ok(count)
            }
        }
    }

    /// List stored claims, optionally restricted to one store.
    pub fn list(&self, store_id: Option<&str>) -> Result<Vec<ExecutionClaim>> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_EXECUTIONS)?;

        let mut claims = Vec::new();
        match store_id {
            None => {
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    claims.push(parse_claim_key(key.value(), value.value())?);
                }
            }
            Some(store_id) => {
                let (start, end) = store_key_range(store_id);
                for entry in table.range(start.as_str()..end.as_str())? {
                    let (key, value) = entry?;
                    claims.push(parse_claim_key(key.value(), value.value())?);
                }
            }
        }
        Ok(claims)
    }

    /// Delete claims older than `max_age_days`. `0` deletes every claim.
    ///
    /// Returns the number of claims removed.
    pub fn cleanup(&self, max_age_days: u32) -> Result<usize> {
        let db = self.db()?;
        let cutoff = (max_age_days > 0).then(|| now_ms() - days_to_ms(max_age_days));

        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(PROCESSED_EXECUTIONS)?;

            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let is_expired = cutoff.is_none_or(|cutoff| value.value() < cutoff);
                if is_expired {
                    expired.push(key.value().to_string());
                }
            }

            for key in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;

        debug!(removed, max_age_days, "Cleaned up processed-execution claims");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Barrier;
    use std::thread;
    use tempfile::tempdir;

    fn due(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn setup() -> (tempfile::TempDir, ProcessedExecutionTracker) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("tracker.redb");
        let tracker = ProcessedExecutionTracker::open(&db_path).unwrap();
        (temp_dir, tracker)
    }

    #[test]
    fn test_claim_once() {
        let (_dir, tracker) = setup();

        assert!(tracker.try_claim("store-a", "task-1", due(0)).unwrap());
        assert!(!tracker.try_claim("store-a", "task-1", due(0)).unwrap());
        assert!(tracker.is_claimed("store-a", "task-1", due(0)).unwrap());
    }

    #[test]
    fn test_distinct_keys_claim_independently() {
        let (_dir, tracker) = setup();

        assert!(tracker.try_claim("store-a", "task-1", due(0)).unwrap());
        // New due time for the same task
        assert!(tracker.try_claim("store-a", "task-1", due(3600)).unwrap());
        // Same task id in another store
        assert!(tracker.try_claim("store-b", "task-1", due(0)).unwrap());
        assert_eq!(tracker.count_for(None).unwrap(), 3);
    }

    #[test]
    fn test_concurrent_claims_yield_exactly_one_winner() {
        let (_dir, tracker) = setup();
        let tracker = Arc::new(tracker);
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let tracker = tracker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    tracker.try_claim("store-a", "task-1", due(0)).unwrap()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(tracker.count_for(Some("store-a")).unwrap(), 1);
    }

    #[test]
    fn test_count_for_store_does_not_leak_across_prefixes() {
        let (_dir, tracker) = setup();

        tracker.try_claim("store", "t1", due(0)).unwrap();
        tracker.try_claim("store-2", "t1", due(0)).unwrap();
        tracker.try_claim("store-2", "t2", due(0)).unwrap();

        assert_eq!(tracker.count_for(Some("store")).unwrap(), 1);
        assert_eq!(tracker.count_for(Some("store-2")).unwrap(), 2);
        assert_eq!(tracker.count_for(Some("missing")).unwrap(), 0);
    }

    #[test]
    fn test_list_decodes_keys() {
        let (_dir, tracker) = setup();
        tracker.try_claim("store-a", "task:with:colons", due(60)).unwrap();

        let claims = tracker.list(Some("store-a")).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].store_id, "store-a");
        assert_eq!(claims[0].task_id, "task:with:colons");
        assert_eq!(claims[0].due_at_ms, due(60).timestamp_millis());
        assert!(claims[0].processed_at_ms > 0);
    }

    #[test]
    fn test_cleanup_zero_removes_everything_once() {
        let (_dir, tracker) = setup();
        for i in 0..5 {
            tracker.try_claim("store-a", &format!("task-{i}"), due(0)).unwrap();
        }

        assert_eq!(tracker.cleanup(0).unwrap(), 5);
        assert_eq!(tracker.count_for(None).unwrap(), 0);
        assert_eq!(tracker.cleanup(0).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_claims() {
        let (_dir, tracker) = setup();
        tracker.try_claim("store-a", "task-1", due(0)).unwrap();

        assert_eq!(tracker.cleanup(30).unwrap(), 0);
        assert_eq!(tracker.count_for(None).unwrap(), 1);
    }

    #[test]
    fn test_reclaim_after_cleanup() {
        let (_dir, tracker) = setup();
        assert!(tracker.try_claim("store-a", "task-1", due(0)).unwrap());
        tracker.cleanup(0).unwrap();
        assert!(tracker.try_claim("store-a", "task-1", due(0)).unwrap());
    }

    #[test]
    fn test_operations_fail_after_close() {
        let (_dir, tracker) = setup();
        tracker.close();
        tracker.close();

        assert!(tracker.is_closed());
        assert!(tracker.try_claim("store-a", "task-1", due(0)).is_err());
        assert!(tracker.count_for(None).is_err());
    }

    #[test]
    fn test_claims_survive_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("tracker.redb");

        {
            let tracker = ProcessedExecutionTracker::open(&db_path).unwrap();
            assert!(tracker.try_claim("store-a", "task-1", due(0)).unwrap());
            tracker.close();
        }

        let tracker = ProcessedExecutionTracker::open(&db_path).unwrap();
        assert!(!tracker.try_claim("store-a", "task-1", due(0)).unwrap());
    }
}
