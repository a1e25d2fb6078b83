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
/// Durable queue engine: retry/backoff math, claim-by-update semantics, and crash-recovery
/// reaping, all expressed against a backend-agnostic [queue::QueueStore] trait. The in-memory
/// backend here is the reference implementation used by tests and standalone runs; a
/// `rusqlite`-backed store living in `rumtk-workflow` implements the same trait for the gateway
/// binary.
///
pub mod queue {
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};
    use rand::Rng;
    use crate::cache::RUMCache;
    use crate::core::{GatewayError, RUMResult};
    use crate::strings::RUMString;

    /**************************** Constants **************************************/

    /// Default exponential-backoff base delay, in milliseconds.
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;
    /// Default exponential-backoff multiplier.
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
    /// Default backoff cap, in milliseconds.
    pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;
    /// Default maximum delivery attempts before an entry is dead-lettered.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Default grace period before an in-flight entry with no heartbeat is reclaimed.
    pub const DEFAULT_CLAIM_GRACE_MS: i64 = 30_000;

    /**************************** Types *******************************************/

    pub type EntryId = u64;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum QueueEntryStatus {
        Pending,
        InFlight,
        Succeeded,
        Failed,
        Dead,
    }

    ///
    /// One row of the durable queue. `priority` is ascending (lower value drains first);
    /// `next_attempt_at` is a monotonic millisecond timestamp comparable with [now_millis].
    ///
    #[derive(Debug, Clone)]
    pub struct QueueEntry {
        pub id: EntryId,
        pub destination_id: RUMString,
        pub payload: Vec<u8>,
        pub priority: i64,
        pub status: QueueEntryStatus,
        pub attempt_count: u32,
        pub last_error: Option<RUMString>,
        pub next_attempt_at: i64,
        pub created_at: i64,
        pub updated_at: i64,
        pub correlation_id: RUMString,
        pub trace_parent: Option<RUMString>,
    }

    ///
    /// Caller-supplied fields for a fresh [QueueEntry]; the store assigns `id` and the
    /// timestamps.
    ///
    #[derive(Debug, Clone)]
    pub struct NewQueueEntry {
        pub destination_id: RUMString,
        pub payload: Vec<u8>,
        pub priority: i64,
        pub correlation_id: RUMString,
        pub trace_parent: Option<RUMString>,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct RetryPolicy {
        pub base: u64,
        pub multiplier: f64,
        pub cap: u64,
        pub max_attempts: u32,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            RetryPolicy {
                base: DEFAULT_BACKOFF_BASE_MS,
                multiplier: DEFAULT_BACKOFF_MULTIPLIER,
                cap: DEFAULT_BACKOFF_CAP_MS,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
            }
        }
    }

    impl RetryPolicy {
        ///
        /// Delay (in milliseconds) before attempt number `attempt` (1-indexed, the attempt that
        /// just failed), following `min(base * multiplier^(attempt-1), cap) + jitter`, with
        /// jitter drawn uniformly from `[0, base)`.
        ///
        pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
            let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
            let backoff = (self.base as f64 * exp).min(self.cap as f64) as u64;
            let jitter = if self.base == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..self.base)
            };
            backoff + jitter
        }

        pub fn exhausted(&self, attempt_count: u32) -> bool {
            attempt_count >= self.max_attempts
        }
    }

    ///
    /// Milliseconds since the Unix epoch. Every timestamp field on [QueueEntry] is expressed in
    /// this unit so stores can compare them without a clock abstraction.
    ///
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    ///
    /// Backend-agnostic contract for the durable queue. Implementors must make [claim_next]
    /// atomic with respect to concurrent callers (single-transaction claim-by-update) so that at
    /// most one worker ever holds a given entry in-flight at a time.
    ///
    pub trait QueueStore: Send + Sync {
        fn enqueue(&self, entry: NewQueueEntry) -> RUMResult<EntryId>;
        fn claim_next(&self, now: i64) -> RUMResult<Option<QueueEntry>>;
        fn mark_succeeded(&self, id: EntryId) -> RUMResult<()>;
        fn mark_failed(
            &self,
            id: EntryId,
            policy: &RetryPolicy,
            now: i64,
            error: RUMString,
        ) -> RUMResult<()>;
        fn mark_dead(&self, id: EntryId, error: RUMString) -> RUMResult<()>;
        fn requeue_from_dlq(&self, id: EntryId) -> RUMResult<()>;
        /// Resets in-flight entries whose `updated_at` is older than `grace_period_ms` back to
        /// pending. Returns the number of entries reclaimed. Intended to run once at startup and
        /// periodically thereafter.
        fn reap_stale(&self, now: i64, grace_period_ms: i64) -> RUMResult<usize>;
        fn pending_count(&self) -> RUMResult<usize>;
        fn dead_count(&self) -> RUMResult<usize>;
    }

    #[derive(Default)]
    struct InMemoryState {
        entries: RUMCache<EntryId, QueueEntry>,
        /// (priority, next_attempt_at, id) for every entry currently eligible to be claimed.
        pending_order: BTreeSet<(i64, i64, EntryId)>,
        next_id: EntryId,
    }

    ///
    /// `Mutex`-guarded `BTreeMap`-ordered in-memory backend, for tests and standalone runs
    /// without a SQL dependency. Claim is a single critical section under the mutex, which is
    /// sufficient to satisfy the "at most one in-flight holder" invariant for a single process.
    ///
    pub struct InMemoryQueueStore {
        state: Mutex<InMemoryState>,
    }

    impl InMemoryQueueStore {
        pub fn new() -> Self {
            InMemoryQueueStore {
                state: Mutex::new(InMemoryState::default()),
            }
        }
    }

    impl Default for InMemoryQueueStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl QueueStore for InMemoryQueueStore {
        fn enqueue(&self, new_entry: NewQueueEntry) -> RUMResult<EntryId> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            state.next_id += 1;
            let id = state.next_id;
            let now = now_millis();
            let entry = QueueEntry {
                id,
                destination_id: new_entry.destination_id,
                payload: new_entry.payload,
                priority: new_entry.priority,
                status: QueueEntryStatus::Pending,
                attempt_count: 0,
                last_error: None,
                next_attempt_at: now,
                created_at: now,
                updated_at: now,
                correlation_id: new_entry.correlation_id,
                trace_parent: new_entry.trace_parent,
            };
            state.pending_order.insert((entry.priority, entry.next_attempt_at, id));
            state.entries.insert(id, entry);
            Ok(id)
        }

        fn claim_next(&self, now: i64) -> RUMResult<Option<QueueEntry>> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            let due_key = state
                .pending_order
                .iter()
                .find(|(_, next_attempt_at, _)| *next_attempt_at <= now)
                .copied();
            let key = match due_key {
                Some(key) => key,
                None => return Ok(None),
            };
            state.pending_order.remove(&key);
            let (_, _, id) = key;
            let entry = state.entries.get_mut(&id).ok_or_else(|| GatewayError::Storage {
                context: RUMString::from("claimed entry vanished from store"),
            })?;
            entry.status = QueueEntryStatus::InFlight;
            entry.attempt_count += 1;
            entry.updated_at = now;
            Ok(Some(entry.clone()))
        }

        fn mark_succeeded(&self, id: EntryId) -> RUMResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            // A succeeded entry is removed outright; the queue only retains failed/dead rows.
            state.entries.remove(&id);
            Ok(())
        }

        fn mark_failed(
            &self,
            id: EntryId,
            policy: &RetryPolicy,
            now: i64,
            error: RUMString,
        ) -> RUMResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            let attempt_count = {
                let entry = state.entries.get(&id).ok_or_else(|| GatewayError::Storage {
                    context: RUMString::from("cannot mark unknown entry failed"),
                })?;
                entry.attempt_count
            };
            if policy.exhausted(attempt_count) {
                drop(state);
                return self.mark_dead(id, error);
            }
            let delay = policy.delay_for_attempt(attempt_count);
            let entry = state.entries.get_mut(&id).ok_or_else(|| GatewayError::Storage {
                context: RUMString::from("cannot mark unknown entry failed"),
            })?;
            entry.status = QueueEntryStatus::Pending;
            entry.last_error = Some(error);
            entry.next_attempt_at = now + delay as i64;
            entry.updated_at = now;
            state
                .pending_order
                .insert((entry.priority, entry.next_attempt_at, id));
            Ok(())
        }

        fn mark_dead(&self, id: EntryId, error: RUMString) -> RUMResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            let now = now_millis();
            let entry = state.entries.get_mut(&id).ok_or_else(|| GatewayError::Storage {
                context: RUMString::from("cannot mark unknown entry dead"),
            })?;
            entry.status = QueueEntryStatus::Dead;
            entry.last_error = Some(error);
            entry.updated_at = now;
            Ok(())
        }

        fn requeue_from_dlq(&self, id: EntryId) -> RUMResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            let now = now_millis();
            let entry = state.entries.get_mut(&id).ok_or_else(|| GatewayError::Storage {
                context: RUMString::from("cannot requeue unknown entry"),
            })?;
            if entry.status != QueueEntryStatus::Dead {
                return Err(GatewayError::Validation {
                    context: RUMString::from("requeue-from-dlq called on a non-dead entry"),
                });
            }
            entry.status = QueueEntryStatus::Pending;
            entry.attempt_count = 0;
            entry.last_error = None;
            entry.next_attempt_at = now;
            entry.updated_at = now;
            let key = (entry.priority, entry.next_attempt_at, id);
            state.pending_order.insert(key);
            Ok(())
        }

        fn reap_stale(&self, now: i64, grace_period_ms: i64) -> RUMResult<usize> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            let stale_ids: Vec<EntryId> = state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    entry.status == QueueEntryStatus::InFlight
                        && now - entry.updated_at >= grace_period_ms
                })
                .map(|(id, _)| *id)
                .collect();
            for id in &stale_ids {
                if let Some(entry) = state.entries.get_mut(id) {
                    entry.status = QueueEntryStatus::Pending;
                    entry.next_attempt_at = now;
                    entry.updated_at = now;
                    let key = (entry.priority, entry.next_attempt_at, *id);
                    state.pending_order.insert(key);
                }
            }
            Ok(stale_ids.len())
        }

        fn pending_count(&self) -> RUMResult<usize> {
            let state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            Ok(state.pending_order.len())
        }

        fn dead_count(&self) -> RUMResult<usize> {
            let state = self
                .state
                .lock()
                .map_err(|_| GatewayError::Storage {
                    context: RUMString::from("queue state mutex poisoned"),
                })?;
            Ok(state
                .entries
                .values()
                .filter(|e| e.status == QueueEntryStatus::Dead)
                .count())
        }
    }

    ///
    /// Small FIFO of claimed entries a worker is actively draining, kept separate from the store
    /// so a worker can batch a few claims before dispatching them to the async runtime.
    ///
    pub struct WorkerBatch {
        items: VecDeque<QueueEntry>,
    }

    impl WorkerBatch {
        pub fn new() -> Self {
            WorkerBatch {
                items: VecDeque::new(),
            }
        }

        pub fn fill<S: QueueStore + ?Sized>(&mut self, store: &S, max: usize) -> RUMResult<usize> {
            let now = now_millis();
            let mut filled = 0;
            while filled < max {
                match store.claim_next(now)? {
                    Some(entry) => {
                        self.items.push_back(entry);
                        filled += 1;
                    }
                    None => break,
                }
            }
            Ok(filled)
        }

        pub fn pop(&mut self) -> Option<QueueEntry> {
            self.items.pop_front()
        }

        pub fn is_empty(&self) -> bool {
            self.items.is_empty()
        }
    }

    impl Default for WorkerBatch {
        fn default() -> Self {
            Self::new()
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
            let store = InMemoryQueueStore::new();
            let id = store.enqueue(entry(0)).unwrap();
            let claimed = store.claim_next(now_millis()).unwrap().unwrap();
            assert_eq!(claimed.id, id);
            assert_eq!(claimed.attempt_count, 1);
            assert_eq!(claimed.status, QueueEntryStatus::InFlight);
        }

        #[test]
        fn test_double_claim_returns_none() {
            let store = InMemoryQueueStore::new();
            store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            assert!(store.claim_next(now).unwrap().is_some());
            assert!(store.claim_next(now).unwrap().is_none());
        }

        #[test]
        fn test_priority_ordering() {
            let store = InMemoryQueueStore::new();
            let low = store.enqueue(entry(10)).unwrap();
            let high = store.enqueue(entry(0)).unwrap();
            let now = now_millis();
            let first = store.claim_next(now).unwrap().unwrap();
            assert_eq!(first.id, high);
            let second = store.claim_next(now).unwrap().unwrap();
            assert_eq!(second.id, low);
        }

        #[test]
        fn test_retry_then_dead_letter() {
            let store = InMemoryQueueStore::new();
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
        fn test_succeeded_entry_is_removed() {
            let store = InMemoryQueueStore::new();
            let id = store.enqueue(entry(0)).unwrap();
            store.claim_next(now_millis()).unwrap();
            store.mark_succeeded(id).unwrap();
            assert_eq!(store.pending_count().unwrap(), 0);
            assert_eq!(store.dead_count().unwrap(), 0);
        }

        #[test]
        fn test_reap_stale_in_flight() {
            let store = InMemoryQueueStore::new();
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
            let store = InMemoryQueueStore::new();
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
