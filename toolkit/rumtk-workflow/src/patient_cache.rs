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
/// Patient demographics cache keyed by patient ID, mutated by ADT A01/A04/A08 and merged by
/// ADT A40 (§3's "Patient Cache Entry"). `rumtk_core::cache::RUMCache` has no notion of TTL or
/// recency, so this module builds a small LRU-with-expiry wrapper around it rather than reaching
/// for an external cache crate, in the spirit of the durable queue's hand-rolled claim/backoff
/// bookkeeping in `rumtk_core::queue`.
///
pub mod patient_cache {
    use crate::mwl::mwl::PatientName;
    use rumtk_core::cache::RUMCache;
    use rumtk_core::strings::RUMString;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    pub const DEFAULT_CAPACITY: usize = 10_000;
    pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PatientDemographics {
        pub patient_id: RUMString,
        pub name: PatientName,
        pub birth_date: RUMString,
        pub sex: RUMString,
    }

    struct Slot {
        demographics: PatientDemographics,
        inserted_at: Instant,
    }

    struct State {
        entries: RUMCache<RUMString, Slot>,
        /// Least-recently-used ordering, oldest at the front. Touching a key removes and
        /// re-pushes it, which is O(n) in the deque but the cache's own size cap keeps n small
        /// relative to the gateway's message throughput.
        order: VecDeque<RUMString>,
    }

    impl State {
        fn touch(&mut self, key: &str) {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
            self.order.push_back(RUMString::from(key));
        }

        fn evict_one(&mut self) {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    ///
    /// `capacity` bounds entry count (LRU eviction beyond it); `ttl` bounds entry age (lazily
    /// checked on read, matching the teacher's "no background sweep" preference for simple
    /// owned structures over timer-driven cache cleaners).
    ///
    pub struct PatientCache {
        state: Mutex<State>,
        capacity: usize,
        ttl: Duration,
    }

    impl PatientCache {
        pub fn new(capacity: usize, ttl: Duration) -> Self {
            PatientCache {
                state: Mutex::new(State {
                    entries: RUMCache::default(),
                    order: VecDeque::new(),
                }),
                capacity,
                ttl,
            }
        }

        fn lock_poisoned_msg() -> &'static str {
            "patient cache mutex poisoned"
        }

        /// ADT A01/A04/A08: insert or overwrite the cached demographics for `entry.patient_id`.
        pub fn upsert(&self, entry: PatientDemographics) {
            let mut state = self.state.lock().expect(Self::lock_poisoned_msg());
            state.touch(&entry.patient_id);
            state.entries.insert(
                entry.patient_id.clone(),
                Slot {
                    demographics: entry,
                    inserted_at: Instant::now(),
                },
            );
            while state.entries.len() > self.capacity {
                state.evict_one();
            }
        }

        /// Returns the cached demographics for `patient_id`, refreshing its LRU position, or
        /// `None` if absent or expired (an expired hit is evicted on read).
        pub fn get(&self, patient_id: &str) -> Option<PatientDemographics> {
            let mut state = self.state.lock().expect(Self::lock_poisoned_msg());
            let expired = state
                .entries
                .get(patient_id)
                .map(|slot| slot.inserted_at.elapsed() > self.ttl)
                .unwrap_or(false);
            if expired {
                state.entries.remove(patient_id);
                if let Some(pos) = state.order.iter().position(|k| k == patient_id) {
                    state.order.remove(pos);
                }
                return None;
            }
            let found = state.entries.get(patient_id).map(|s| s.demographics.clone());
            if found.is_some() {
                state.touch(patient_id);
            }
            found
        }

        /// ADT A40: merges `old_patient_id`'s cache entry into `new_patient_id`. If both are
        /// cached, the surviving (`new`) demographics win and the old entry is dropped; if only
        /// the old one is cached, it is re-keyed under `new_patient_id`.
        pub fn merge(&self, old_patient_id: &str, new_patient_id: &str) {
            let mut state = self.state.lock().expect(Self::lock_poisoned_msg());
            let old_slot = state.entries.remove(old_patient_id);
            if let Some(pos) = state.order.iter().position(|k| k == old_patient_id) {
                state.order.remove(pos);
            }
            if state.entries.contains_key(new_patient_id) {
                state.touch(new_patient_id);
                return;
            }
            if let Some(mut slot) = old_slot {
                slot.demographics.patient_id = RUMString::from(new_patient_id);
                state.touch(new_patient_id);
                state.entries.insert(RUMString::from(new_patient_id), slot);
            }
        }

        pub fn len(&self) -> usize {
            self.state.lock().expect(Self::lock_poisoned_msg()).entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl Default for PatientCache {
        fn default() -> Self {
            PatientCache::new(DEFAULT_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn demographics(id: &str) -> PatientDemographics {
            PatientDemographics {
                patient_id: RUMString::from(id),
                name: PatientName {
                    family: RUMString::from("Smith"),
                    given: RUMString::from("John"),
                    ..Default::default()
                },
                birth_date: RUMString::from("19700101"),
                sex: RUMString::from("M"),
            }
        }

        #[test]
        fn test_upsert_then_get() {
            let cache = PatientCache::default();
            cache.upsert(demographics("P-1"));
            assert_eq!(cache.get("P-1").unwrap().name.family, "Smith");
        }

        #[test]
        fn test_capacity_evicts_least_recently_used() {
            let cache = PatientCache::new(2, Duration::from_secs(60));
            cache.upsert(demographics("P-1"));
            cache.upsert(demographics("P-2"));
            cache.get("P-1"); // touch P-1, making P-2 the LRU victim
            cache.upsert(demographics("P-3"));
            assert!(cache.get("P-1").is_some());
            assert!(cache.get("P-2").is_none());
            assert!(cache.get("P-3").is_some());
        }

        #[test]
        fn test_ttl_expiry_evicts_on_read() {
            let cache = PatientCache::new(10, Duration::from_millis(1));
            cache.upsert(demographics("P-1"));
            std::thread::sleep(Duration::from_millis(20));
            assert!(cache.get("P-1").is_none());
        }

        #[test]
        fn test_merge_moves_old_entry_to_new_id() {
            let cache = PatientCache::default();
            cache.upsert(demographics("P-OLD"));
            cache.merge("P-OLD", "P-NEW");
            assert!(cache.get("P-OLD").is_none());
            assert_eq!(cache.get("P-NEW").unwrap().patient_id, "P-NEW");
        }

        #[test]
        fn test_merge_prefers_surviving_entry_when_both_cached() {
            let cache = PatientCache::default();
            cache.upsert(demographics("P-OLD"));
            let mut survivor = demographics("P-NEW");
            survivor.name.family = RUMString::from("Jones");
            cache.upsert(survivor);
            cache.merge("P-OLD", "P-NEW");
            assert!(cache.get("P-OLD").is_none());
            assert_eq!(cache.get("P-NEW").unwrap().name.family, "Jones");
        }
    }
}
