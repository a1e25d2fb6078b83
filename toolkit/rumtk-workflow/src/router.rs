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
/// Outbound destination table with health tracking and failover-group selection. The router
/// decides *where* a message should go; it never sends anything itself (that is `sender`'s job),
/// which keeps the failover decision made once, at enqueue time, instead of being re-evaluated
/// by every retry.
///
pub mod router {
    use rumtk_core::cache::RUMCache;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::{Arc, RwLock};

    /// Consecutive failures at or beyond this count mark a destination degraded.
    pub const DEGRADED_AFTER_FAILURES: u32 = 3;
    /// Consecutive failures at or beyond this count mark a destination unhealthy.
    pub const UNHEALTHY_AFTER_FAILURES: u32 = 5;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TransportKind {
        Plain,
        Tls,
    }

    #[derive(Debug, Clone)]
    pub struct Destination {
        pub id: RUMString,
        pub host: RUMString,
        pub port: u16,
        pub transport: TransportKind,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Health {
        Healthy,
        Degraded,
        Unhealthy,
    }

    struct HealthCounters {
        consecutive_failures: AtomicU32,
        last_attempt_at_millis: AtomicI64,
    }

    impl HealthCounters {
        fn new() -> Self {
            HealthCounters {
                consecutive_failures: AtomicU32::new(0),
                last_attempt_at_millis: AtomicI64::new(0),
            }
        }

        fn health(&self) -> Health {
            let failures = self.consecutive_failures.load(Ordering::Relaxed);
            if failures >= UNHEALTHY_AFTER_FAILURES {
                Health::Unhealthy
            } else if failures >= DEGRADED_AFTER_FAILURES {
                Health::Degraded
            } else {
                Health::Healthy
            }
        }
    }

    fn lock_poisoned() -> GatewayError {
        GatewayError::storage("router state lock poisoned")
    }

    fn unknown_destination(id: &str) -> GatewayError {
        GatewayError::storage(format!("no destination registered with id \"{}\"", id))
    }

    fn unknown_group(name: &str) -> GatewayError {
        GatewayError::storage(format!("no failover group registered with name \"{}\"", name))
    }

    ///
    /// `destinations`/`health` are independent maps so health bookkeeping never needs a write
    /// lock on the destination table itself. `groups` holds destination ids in priority order
    /// (lowest-priority-value first), the order [select] walks on every call.
    ///
    pub struct OutboundRouter {
        destinations: RwLock<RUMCache<RUMString, Destination>>,
        health: RwLock<RUMCache<RUMString, Arc<HealthCounters>>>,
        groups: RwLock<RUMCache<RUMString, Vec<RUMString>>>,
    }

    impl OutboundRouter {
        pub fn new() -> Self {
            OutboundRouter {
                destinations: RwLock::new(RUMCache::default()),
                health: RwLock::new(RUMCache::default()),
                groups: RwLock::new(RUMCache::default()),
            }
        }

        pub fn register_destination(&self, destination: Destination) -> RUMResult<()> {
            let mut destinations = self.destinations.write().map_err(|_| lock_poisoned())?;
            let mut health = self.health.write().map_err(|_| lock_poisoned())?;
            health
                .entry(destination.id.clone())
                .or_insert_with(|| Arc::new(HealthCounters::new()));
            destinations.insert(destination.id.clone(), destination);
            Ok(())
        }

        /// Registers a failover group as an ordered list of destination ids, highest priority
        /// (tried first) to lowest.
        pub fn register_group(&self, name: &str, destination_ids: Vec<RUMString>) -> RUMResult<()> {
            let mut groups = self.groups.write().map_err(|_| lock_poisoned())?;
            groups.insert(RUMString::from(name), destination_ids);
            Ok(())
        }

        pub fn get(&self, destination_id: &str) -> RUMResult<Destination> {
            let destinations = self.destinations.read().map_err(|_| lock_poisoned())?;
            destinations
                .get(destination_id)
                .cloned()
                .ok_or_else(|| unknown_destination(destination_id))
        }

        pub fn health_of(&self, destination_id: &str) -> RUMResult<Health> {
            let health = self.health.read().map_err(|_| lock_poisoned())?;
            Ok(health
                .get(destination_id)
                .map(|c| c.health())
                .unwrap_or(Health::Healthy))
        }

        /// A successful delivery resets the destination's failure streak to healthy.
        pub fn record_success(&self, destination_id: &str, now_millis: i64) -> RUMResult<()> {
            let health = self.health.read().map_err(|_| lock_poisoned())?;
            if let Some(counters) = health.get(destination_id) {
                counters.consecutive_failures.store(0, Ordering::Relaxed);
                counters
                    .last_attempt_at_millis
                    .store(now_millis, Ordering::Relaxed);
            }
            Ok(())
        }

        pub fn record_failure(&self, destination_id: &str, now_millis: i64) -> RUMResult<()> {
            let health = self.health.read().map_err(|_| lock_poisoned())?;
            if let Some(counters) = health.get(destination_id) {
                counters.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                counters
                    .last_attempt_at_millis
                    .store(now_millis, Ordering::Relaxed);
            }
            Ok(())
        }

        /// Selects a destination from `group`: the first healthy member in priority order; if
        /// none is healthy, the first degraded member; if every member is unhealthy, the one
        /// least recently attempted (giving a long-failing peer the next try once its backoff
        /// has run longer than the others').
        pub fn select(&self, group: &str) -> RUMResult<Destination> {
            let groups = self.groups.read().map_err(|_| lock_poisoned())?;
            let ids = groups.get(group).ok_or_else(|| unknown_group(group))?;
            if ids.is_empty() {
                return Err(unknown_group(group));
            }

            let health = self.health.read().map_err(|_| lock_poisoned())?;
            let mut best_degraded: Option<&RUMString> = None;
            let mut least_recent: Option<(i64, &RUMString)> = None;

            for id in ids {
                let counters = health.get(id);
                let status = counters.map(|c| c.health()).unwrap_or(Health::Healthy);
                match status {
                    Health::Healthy => return self.get(id),
                    Health::Degraded => {
                        if best_degraded.is_none() {
                            best_degraded = Some(id);
                        }
                    }
                    Health::Unhealthy => {
                        let last = counters
                            .map(|c| c.last_attempt_at_millis.load(Ordering::Relaxed))
                            .unwrap_or(0);
                        if least_recent.map(|(l, _)| last < l).unwrap_or(true) {
                            least_recent = Some((last, id));
                        }
                    }
                }
            }

            if let Some(id) = best_degraded {
                return self.get(id);
            }
            match least_recent {
                Some((_, id)) => self.get(id),
                None => Err(unknown_group(group)),
            }
        }
    }

    impl Default for OutboundRouter {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn router_with_group() -> OutboundRouter {
            let router = OutboundRouter::new();
            router
                .register_destination(Destination {
                    id: RUMString::from("ris-a"),
                    host: RUMString::from("10.0.0.1"),
                    port: 2575,
                    transport: TransportKind::Plain,
                })
                .unwrap();
            router
                .register_destination(Destination {
                    id: RUMString::from("ris-b"),
                    host: RUMString::from("10.0.0.2"),
                    port: 2575,
                    transport: TransportKind::Plain,
                })
                .unwrap();
            router
                .register_group(
                    "ris",
                    vec![RUMString::from("ris-a"), RUMString::from("ris-b")],
                )
                .unwrap();
            router
        }

        #[test]
        fn test_select_prefers_healthy_first_priority() {
            let router = router_with_group();
            assert_eq!(router.select("ris").unwrap().id, "ris-a");
        }

        #[test]
        fn test_three_consecutive_failures_fail_over_to_next() {
            let router = router_with_group();
            router.record_failure("ris-a", 1).unwrap();
            router.record_failure("ris-a", 2).unwrap();
            router.record_failure("ris-a", 3).unwrap();
            assert_eq!(router.health_of("ris-a").unwrap(), Health::Degraded);
            assert_eq!(router.select("ris").unwrap().id, "ris-b");
        }

        #[test]
        fn test_success_restores_preference() {
            let router = router_with_group();
            router.record_failure("ris-a", 1).unwrap();
            router.record_failure("ris-a", 2).unwrap();
            router.record_failure("ris-a", 3).unwrap();
            assert_eq!(router.select("ris").unwrap().id, "ris-b");
            router.record_success("ris-a", 4).unwrap();
            assert_eq!(router.health_of("ris-a").unwrap(), Health::Healthy);
            assert_eq!(router.select("ris").unwrap().id, "ris-a");
        }

        #[test]
        fn test_all_unhealthy_picks_least_recently_attempted() {
            let router = router_with_group();
            for n in 1..=5 {
                router.record_failure("ris-a", n).unwrap();
            }
            for n in 1..=5 {
                router.record_failure("ris-b", n + 100).unwrap();
            }
            assert_eq!(router.health_of("ris-a").unwrap(), Health::Unhealthy);
            assert_eq!(router.health_of("ris-b").unwrap(), Health::Unhealthy);
            // ris-a's last attempt (5) is older than ris-b's (105), so it is retried first.
            assert_eq!(router.select("ris").unwrap().id, "ris-a");
        }

        #[test]
        fn test_select_unknown_group_errors() {
            let router = OutboundRouter::new();
            assert!(router.select("missing").is_err());
        }
    }
}
