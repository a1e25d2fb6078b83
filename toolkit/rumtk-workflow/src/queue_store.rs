/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */

///
/// `rusqlite`-backed [QueueStore](rumtk_core::queue::queue::QueueStore), the production
/// counterpart to `rumtk_core::queue::queue::InMemoryQueueStore`, mirroring the trait-plus-two-
/// backends shape already used by `mwl::MwlStore` and `mpps::MppsStore`. Claim-by-update runs
/// inside one `rusqlite` transaction so at most one caller ever holds a given row in-flight, the
/// same invariant the in-memory store gets from its mutex.
///
pub mod queue_store {
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::queue::queue::{
        now_millis, EntryId, NewQueueEntry, QueueEntry, QueueEntryStatus, QueueStore, RetryPolicy,
    };
    use rumtk_core::strings::RUMString;
    use std::sync::Mutex;

    fn lock_poisoned() -> GatewayError {
        GatewayError::storage("queue database connection lock poisoned")
    }

    fn status_to_str(status: QueueEntryStatus) -> &'static str {
        match status {
            QueueEntryStatus::Pending => "PENDING",
            QueueEntryStatus::InFlight => "IN_FLIGHT",
            QueueEntryStatus::Succeeded => "SUCCEEDED",
            QueueEntryStatus::Failed => "FAILED",
            QueueEntryStatus::Dead => "DEAD",
        }
    }

    fn status_from_str(raw: &str) -> QueueEntryStatus {
        match raw {
            "IN_FLIGHT" => QueueEntryStatus::InFlight,
            "SUCCEEDED" => QueueEntryStatus::Succeeded,
            "FAILED" => QueueEntryStatus::Failed,
            "DEAD" => QueueEntryStatus::Dead,
            _ => QueueEntryStatus::Pending,
        }
    }

    pub struct SqliteQueueStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteQueueStore {
        pub fn open(path: &str) -> RUMResult<Self> {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| GatewayError::storage(format!("opening queue database: {}", e)))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| GatewayError::storage(format!("enabling WAL mode: {}", e)))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS queue_entry (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    destination_id TEXT NOT NULL,
                    payload BLOB NOT NULL,
                    priority INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    attempt_count INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    next_attempt_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    correlation_id TEXT NOT NULL,
                    trace_parent TEXT
                )",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating queue_entry table: {}", e)))?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_queue_claimable
                 ON queue_entry(status, next_attempt_at, priority)",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating queue_entry index: {}", e)))?;
            Ok(SqliteQueueStore {
                conn: Mutex::new(conn),
            })
        }

        fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
            let status: String = row.get("status")?;
            Ok(QueueEntry {
                id: row.get::<_, i64>("id")? as EntryId,
                destination_id: RUMString::from(row.get::<_, String>("destination_id")?.as_str()),
                payload: row.get("payload")?,
                priority: row.get("priority")?,
                status: status_from_str(&status),
                attempt_count: row.get::<_, i64>("attempt_count")? as u32,
                last_error: row
                    .get::<_, Option<String>>("last_error")?
                    .map(|s| RUMString::from(s.as_str())),
                next_attempt_at: row.get("next_attempt_at")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
                correlation_id: RUMString::from(row.get::<_, String>("correlation_id")?.as_str()),
                trace_parent: row
                    .get::<_, Option<String>>("trace_parent")?
                    .map(|s| RUMString::from(s.as_str())),
            })
        }
    }

    impl QueueStore for SqliteQueueStore {
        fn enqueue(&self, new_entry: NewQueueEntry) -> RUMResult<EntryId> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let now = now_millis();
            conn.execute(
                "INSERT INTO queue_entry (
                    destination_id, payload, priority, status, attempt_count, last_error,
                    next_attempt_at, created_at, updated_at, correlation_id, trace_parent
                ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?6, ?6, ?7, ?8)",
                rusqlite::params![
                    new_entry.destination_id.as_str(),
                    new_entry.payload,
                    new_entry.priority,
                    status_to_str(QueueEntryStatus::Pending),
                    now,
                    now,
                    new_entry.correlation_id.as_str(),
                    new_entry.trace_parent.as_ref().map(|s| s.as_str()),
                ],
            )
            .map_err(|e| GatewayError::storage(format!("enqueueing entry: {}", e)))?;
            Ok(conn.last_insert_rowid() as EntryId)
        }

        fn claim_next(&self, now: i64) -> RUMResult<Option<QueueEntry>> {
            let mut conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let tx = conn
                .transaction()
                .map_err(|e| GatewayError::storage(format!("starting claim transaction: {}", e)))?;
            let claimed: Option<(EntryId, i64)> = tx
                .query_row(
                    "SELECT id, attempt_count FROM queue_entry
                     WHERE status = ?1 AND next_attempt_at <= ?2
                     ORDER BY priority ASC, next_attempt_at ASC LIMIT 1",
                    rusqlite::params![status_to_str(QueueEntryStatus::Pending), now],
                    |row| Ok((row.get::<_, i64>(0)? as EntryId, row.get::<_, i64>(1)?)),
                )
                .ok();
            let Some((id, attempt_count)) = claimed else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE queue_entry SET status = ?1, attempt_count = ?2, updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![
                    status_to_str(QueueEntryStatus::InFlight),
                    attempt_count + 1,
                    now,
                    id as i64,
                ],
            )
            .map_err(|e| GatewayError::storage(format!("claiming entry: {}", e)))?;
            let entry = tx
                .query_row(
                    "SELECT * FROM queue_entry WHERE id = ?1",
                    [id as i64],
                    Self::row_to_entry,
                )
                .map_err(|e| GatewayError::storage(format!("reloading claimed entry: {}", e)))?;
            tx.commit()
                .map_err(|e| GatewayError::storage(format!("committing claim: {}", e)))?;
            Ok(Some(entry))
        }

        fn mark_succeeded(&self, id: EntryId) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.execute("DELETE FROM queue_entry WHERE id = ?1", [id as i64])
                .map_err(|e| GatewayError::storage(format!("removing succeeded entry: {}", e)))?;
            Ok(())
        }

        fn mark_failed(
            &self,
            id: EntryId,
            policy: &RetryPolicy,
            now: i64,
            error: RUMString,
        ) -> RUMResult<()> {
            let attempt_count: i64 = {
                let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
                conn.query_row(
                    "SELECT attempt_count FROM queue_entry WHERE id = ?1",
                    [id as i64],
                    |row| row.get(0),
                )
                .map_err(|e| GatewayError::storage(format!("reading entry before failing it: {}", e)))?
            };
            if policy.exhausted(attempt_count as u32) {
                return self.mark_dead(id, error);
            }
            let delay = policy.delay_for_attempt(attempt_count as u32);
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.execute(
                "UPDATE queue_entry SET status = ?1, last_error = ?2, next_attempt_at = ?3,
                    updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    status_to_str(QueueEntryStatus::Pending),
                    error.as_str(),
                    now + delay as i64,
                    now,
                    id as i64,
                ],
            )
            .map_err(|e| GatewayError::storage(format!("marking entry failed: {}", e)))?;
            Ok(())
        }

        fn mark_dead(&self, id: EntryId, error: RUMString) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let now = now_millis();
            conn.execute(
                "UPDATE queue_entry SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![status_to_str(QueueEntryStatus::Dead), error.as_str(), now, id as i64],
            )
            .map_err(|e| GatewayError::storage(format!("marking entry dead: {}", e)))?;
            Ok(())
        }

        fn requeue_from_dlq(&self, id: EntryId) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let now = now_millis();
            let rows = conn
                .execute(
                    "UPDATE queue_entry SET status = ?1, attempt_count = 0, last_error = NULL,
                        next_attempt_at = ?2, updated_at = ?2
                     WHERE id = ?3 AND status = ?4",
                    rusqlite::params![
                        status_to_str(QueueEntryStatus::Pending),
                        now,
                        id as i64,
                        status_to_str(QueueEntryStatus::Dead),
                    ],
                )
                .map_err(|e| GatewayError::storage(format!("requeueing entry: {}", e)))?;
            if rows == 0 {
                return Err(GatewayError::validation(
                    "requeue-from-dlq called on a non-dead or unknown entry",
                ));
            }
            Ok(())
        }

        fn reap_stale(&self, now: i64, grace_period_ms: i64) -> RUMResult<usize> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let rows = conn
                .execute(
                    "UPDATE queue_entry SET status = ?1, next_attempt_at = ?2, updated_at = ?2
                     WHERE status = ?3 AND (?2 - updated_at) >= ?4",
                    rusqlite::params![
                        status_to_str(QueueEntryStatus::Pending),
                        now,
                        status_to_str(QueueEntryStatus::InFlight),
                        grace_period_ms,
                    ],
                )
                .map_err(|e| GatewayError::storage(format!("reaping stale entries: {}", e)))?;
            Ok(rows)
        }

        fn pending_count(&self) -> RUMResult<usize> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM queue_entry WHERE status = ?1",
                    [status_to_str(QueueEntryStatus::Pending)],
                    |row| row.get(0),
                )
                .map_err(|e| GatewayError::storage(format!("counting pending entries: {}", e)))?;
            Ok(count as usize)
        }

        fn dead_count(&self) -> RUMResult<usize> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM queue_entry WHERE status = ?1",
                    [status_to_str(QueueEntryStatus::Dead)],
                    |row| row.get(0),
                )
                .map_err(|e| GatewayError::storage(format!("counting dead entries: {}", e)))?;
            Ok(count as usize)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn entry(priority: i64) -> NewQueueEntry {
            NewQueueEntry {
                destination_id: RUMString::from("ris-1"),
                payload: b"MSH|...".to_vec(),
                priority,
                correlation_id: RUMString::from("corr-1"),
                trace_parent: None,
            }
        }

        #[test]
        fn test_enqueue_then_claim() {
            let store = SqliteQueueStore::open(":memory:").unwrap();
            let id = store.enqueue(entry(0)).unwrap();
            let claimed = store.claim_next(now_millis()).unwrap().unwrap();
            assert_eq!(claimed.id, id);
            assert_eq!(claimed.attempt_count, 1);
        }

        #[test]
        fn test_double_claim_returns_none() {
            let store = SqliteQueueStore::open(":memory:").unwrap();
            store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            assert!(store.claim_next(now).unwrap().is_some());
            assert!(store.claim_next(now).unwrap().is_none());
        }

        #[test]
        fn test_retry_then_dead_letter() {
            let store = SqliteQueueStore::open(":memory:").unwrap();
            let policy = RetryPolicy {
                base: 1,
                multiplier: 2.0,
                cap: 10,
                max_attempts: 2,
            };
            let id = store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            store.claim_next(now).unwrap();
            store
                .mark_failed(id, &policy, now, RUMString::from("destination refused"))
                .unwrap();
            assert_eq!(store.pending_count().unwrap(), 1);

            let later = now + 100;
            store.claim_next(later).unwrap();
            store
                .mark_failed(id, &policy, later, RUMString::from("destination refused again"))
                .unwrap();
            assert_eq!(store.dead_count().unwrap(), 1);
            assert_eq!(store.pending_count().unwrap(), 0);
        }

        #[test]
        fn test_reap_stale_in_flight() {
            let store = SqliteQueueStore::open(":memory:").unwrap();
            store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            store.claim_next(now).unwrap();
            assert_eq!(store.pending_count().unwrap(), 0);

            let reclaimed = store.reap_stale(now + 1000, 500).unwrap();
            assert_eq!(reclaimed, 1);
            assert_eq!(store.pending_count().unwrap(), 1);
        }

        #[test]
        fn test_requeue_from_dlq() {
            let store = SqliteQueueStore::open(":memory:").unwrap();
            let policy = RetryPolicy {
                base: 1,
                multiplier: 2.0,
                cap: 10,
                max_attempts: 1,
            };
            let id = store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            store.claim_next(now).unwrap();
            store.mark_failed(id, &policy, now, RUMString::from("gone")).unwrap();
            assert_eq!(store.dead_count().unwrap(), 1);

            store.requeue_from_dlq(id).unwrap();
            assert_eq!(store.dead_count().unwrap(), 0);
            assert_eq!(store.pending_count().unwrap(), 1);
        }
    }
}
