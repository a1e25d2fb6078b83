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
/// Reliable delivery: try a direct MLLP round trip first, and fall back to the durable queue on
/// any failure. The router is consulted exactly once per send attempt, at the point a message is
/// either delivered or enqueued -- queue workers never re-run failover, they resolve the
/// `destination_id` already recorded on the queue entry. This keeps retried messages pinned to
/// whatever destination the original attempt picked, so a flapping destination cannot cause a
/// single message to bounce between peers indefinitely.
///
pub mod sender {
    use crate::router::router::OutboundRouter;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::queue::queue::{now_millis, NewQueueEntry, QueueStore, RetryPolicy};
    use rumtk_core::strings::RUMString;
    use rumtk_mllp::MllpClient;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    /// What happened to a message handed to [ReliableSender::send].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SendOutcome {
        /// Delivered directly and acknowledged (MSA-1 `AA`).
        Delivered,
        /// Direct delivery failed or was skipped; the message was queued for retry against
        /// `destination_id`.
        Queued { destination_id: RUMString },
    }

    ///
    /// Ties a [QueueStore] and an [OutboundRouter] together. `connect_timeout`/`send_timeout`
    /// bound a direct-delivery attempt so a hung peer never blocks the caller indefinitely.
    ///
    pub struct ReliableSender {
        router: Arc<OutboundRouter>,
        queue: Arc<dyn QueueStore>,
        retry_policy: RetryPolicy,
        send_timeout: Duration,
        /// When set, every send skips direct delivery and always goes straight to the queue.
        /// Used by destinations that are known write-behind-only, and by tests.
        always_enqueue: bool,
        high_water_mark: usize,
    }

    impl ReliableSender {
        pub fn new(router: Arc<OutboundRouter>, queue: Arc<dyn QueueStore>) -> Self {
            ReliableSender {
                router,
                queue,
                retry_policy: RetryPolicy::default(),
                send_timeout: Duration::from_secs(10),
                always_enqueue: false,
                high_water_mark: 100_000,
            }
        }

        pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
            self.retry_policy = policy;
            self
        }

        pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
            self.send_timeout = timeout;
            self
        }

        pub fn with_always_enqueue(mut self, always_enqueue: bool) -> Self {
            self.always_enqueue = always_enqueue;
            self
        }

        pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
            self.high_water_mark = high_water_mark;
            self
        }

        fn enqueue(
            &self,
            destination_id: &str,
            payload: Vec<u8>,
            correlation_id: &str,
        ) -> RUMResult<SendOutcome> {
            if self.queue.pending_count()? >= self.high_water_mark {
                return Err(GatewayError::Capacity {
                    context: RUMString::from("durable queue is at its configured high-water mark"),
                });
            }
            self.queue.enqueue(NewQueueEntry {
                destination_id: RUMString::from(destination_id),
                payload,
                priority: 0,
                correlation_id: RUMString::from(correlation_id),
                trace_parent: None,
            })?;
            Ok(SendOutcome::Queued {
                destination_id: RUMString::from(destination_id),
            })
        }

        /// Selects a destination from `group` and attempts delivery, enqueueing on any failure.
        pub async fn send(
            &self,
            group: &str,
            payload: Vec<u8>,
            correlation_id: &str,
        ) -> RUMResult<SendOutcome> {
            let destination = self.router.select(group)?;

            if self.always_enqueue {
                return self.enqueue(&destination.id, payload, correlation_id);
            }

            match attempt_delivery(&destination.host, destination.port, &payload, self.send_timeout).await
            {
                Ok(()) => {
                    self.router.record_success(&destination.id, now_millis())?;
                    Ok(SendOutcome::Delivered)
                }
                Err(e) => {
                    tracing::warn!(
                        destination = %destination.id,
                        error = %e,
                        "direct delivery failed, enqueueing for retry"
                    );
                    self.router.record_failure(&destination.id, now_millis())?;
                    self.enqueue(&destination.id, payload, correlation_id)
                }
            }
        }
    }

    async fn attempt_delivery(
        host: &str,
        port: u16,
        payload: &[u8],
        timeout: Duration,
    ) -> RUMResult<()> {
        let mut client = tokio::time::timeout(timeout, MllpClient::connect(host, port))
            .await
            .map_err(|_| {
                GatewayError::Timeout {
                    context: rumtk_core::strings::format_compact!(
                        "connecting to {}:{} took longer than {:?}",
                        host,
                        port,
                        timeout
                    ),
                }
            })??
            .with_response_timeout(timeout);
        let response = tokio::time::timeout(timeout, client.send_and_receive(payload))
            .await
            .map_err(|_| GatewayError::Timeout {
                context: rumtk_core::strings::format_compact!(
                    "no ack from {}:{} within {:?}",
                    host,
                    port,
                    timeout
                ),
            })??;
        match parse_ack_code(&response) {
            Some(code) if code.eq_ignore_ascii_case("AA") => Ok(()),
            Some(code) => Err(GatewayError::transport(
                rumtk_core::strings::format_compact!("peer returned ack code \"{}\"", code),
                rumtk_core::strings::format_compact!("{}:{}", host, port),
            )),
            None => Err(GatewayError::transport(
                "response did not contain a recognizable MSA segment",
                rumtk_core::strings::format_compact!("{}:{}", host, port),
            )),
        }
    }

    /// Extracts MSA-1 from a raw HL7 wire payload without going through the full parser: the
    /// sender only needs the ack code, not a structured message.
    fn parse_ack_code(raw: &[u8]) -> Option<&str> {
        let text = std::str::from_utf8(raw).ok()?;
        for segment in text.split(['\r', '\n']) {
            if let Some(rest) = segment.strip_prefix("MSA|") {
                return rest.split('|').next();
            }
        }
        None
    }

    ///
    /// Drains `queue`, resolving each entry's already-assigned `destination_id` through `router`
    /// and retrying delivery with the queue's own backoff/dead-letter bookkeeping. Also runs a
    /// periodic stale-entry reap so an in-flight entry from a crashed worker is eventually
    /// retried instead of stuck forever.
    ///
    pub struct QueueWorkerPool {
        shutdown_tx: watch::Sender<bool>,
        running: Arc<AtomicBool>,
        handle: Option<tokio::task::JoinHandle<()>>,
    }

    impl QueueWorkerPool {
        /// Spawns the worker loop. `poll_interval` bounds how long an idle worker sleeps between
        /// queue polls; `reap_interval`/`claim_grace_ms` govern the stale-entry reaper.
        pub fn spawn(
            router: Arc<OutboundRouter>,
            queue: Arc<dyn QueueStore>,
            retry_policy: RetryPolicy,
            send_timeout: Duration,
            poll_interval: Duration,
            reap_interval: Duration,
            claim_grace_ms: i64,
        ) -> Self {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let running = Arc::new(AtomicBool::new(true));
            let running_for_task = running.clone();
            let handle = tokio::spawn(worker_loop(
                router,
                queue,
                retry_policy,
                send_timeout,
                poll_interval,
                reap_interval,
                claim_grace_ms,
                shutdown_rx,
                running_for_task,
            ));
            QueueWorkerPool {
                shutdown_tx,
                running,
                handle: Some(handle),
            }
        }

        pub fn is_running(&self) -> bool {
            self.running.load(Ordering::Relaxed)
        }

        pub async fn shutdown(mut self) {
            let _ = self.shutdown_tx.send(true);
            if let Some(handle) = self.handle.take() {
                let _ = handle.await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn worker_loop(
        router: Arc<OutboundRouter>,
        queue: Arc<dyn QueueStore>,
        retry_policy: RetryPolicy,
        send_timeout: Duration,
        poll_interval: Duration,
        reap_interval: Duration,
        claim_grace_ms: i64,
        mut shutdown: watch::Receiver<bool>,
        running: Arc<AtomicBool>,
    ) {
        let mut reap_ticker = tokio::time::interval(reap_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = reap_ticker.tick() => {
                    match queue.reap_stale(now_millis(), claim_grace_ms) {
                        Ok(reclaimed) if reclaimed > 0 => {
                            tracing::info!(reclaimed, "reaped stale in-flight queue entries");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "queue reap failed"),
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {
                    if let Err(e) = drain_once(&router, &queue, &retry_policy, send_timeout).await {
                        tracing::warn!(error = %e, "queue worker iteration failed");
                    }
                }
            }
        }
        running.store(false, Ordering::Relaxed);
    }

    async fn drain_once(
        router: &Arc<OutboundRouter>,
        queue: &Arc<dyn QueueStore>,
        retry_policy: &RetryPolicy,
        send_timeout: Duration,
    ) -> RUMResult<()> {
        while let Some(entry) = queue.claim_next(now_millis())? {
            let destination = match router.get(&entry.destination_id) {
                Ok(d) => d,
                Err(e) => {
                    queue.mark_failed(
                        entry.id,
                        retry_policy,
                        now_millis(),
                        RUMString::from(format!("{}", e).as_str()),
                    )?;
                    continue;
                }
            };
            match attempt_delivery(&destination.host, destination.port, &entry.payload, send_timeout)
                .await
            {
                Ok(()) => {
                    router.record_success(&destination.id, now_millis())?;
                    queue.mark_succeeded(entry.id)?;
                }
                Err(e) => {
                    router.record_failure(&destination.id, now_millis())?;
                    queue.mark_failed(
                        entry.id,
                        retry_policy,
                        now_millis(),
                        RUMString::from(format!("{}", e).as_str()),
                    )?;
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::router::router::{Destination, TransportKind};
        use rumtk_core::queue::queue::InMemoryQueueStore;

        fn sender_with_unreachable_destination() -> (ReliableSender, Arc<InMemoryQueueStore>) {
            let router = Arc::new(OutboundRouter::new());
            router
                .register_destination(Destination {
                    id: RUMString::from("ris-1"),
                    host: RUMString::from("127.0.0.1"),
                    port: 1, // nothing listens on port 1
                    transport: TransportKind::Plain,
                })
                .unwrap();
            router
                .register_group("ris", vec![RUMString::from("ris-1")])
                .unwrap();
            let queue = Arc::new(InMemoryQueueStore::new());
            let sender = ReliableSender::new(router, queue.clone())
                .with_send_timeout(Duration::from_millis(200));
            (sender, queue)
        }

        #[tokio::test]
        async fn test_failed_direct_delivery_enqueues() {
            let (sender, queue) = sender_with_unreachable_destination();
            let outcome = sender
                .send("ris", b"MSH|test".to_vec(), "corr-1")
                .await
                .unwrap();
            match outcome {
                SendOutcome::Queued { destination_id } => assert_eq!(destination_id, "ris-1"),
                SendOutcome::Delivered => panic!("expected Queued outcome"),
            }
            assert_eq!(queue.pending_count().unwrap(), 1);
        }

        #[tokio::test]
        async fn test_always_enqueue_skips_direct_delivery() {
            let router = Arc::new(OutboundRouter::new());
            router
                .register_destination(Destination {
                    id: RUMString::from("ris-1"),
                    host: RUMString::from("127.0.0.1"),
                    port: 2575,
                    transport: TransportKind::Plain,
                })
                .unwrap();
            router
                .register_group("ris", vec![RUMString::from("ris-1")])
                .unwrap();
            let queue = Arc::new(InMemoryQueueStore::new());
            let sender = ReliableSender::new(router, queue.clone()).with_always_enqueue(true);
            sender.send("ris", b"MSH|test".to_vec(), "corr-1").await.unwrap();
            assert_eq!(queue.pending_count().unwrap(), 1);
        }

        #[tokio::test]
        async fn test_capacity_error_when_queue_full() {
            let router = Arc::new(OutboundRouter::new());
            router
                .register_destination(Destination {
                    id: RUMString::from("ris-1"),
                    host: RUMString::from("127.0.0.1"),
                    port: 2575,
                    transport: TransportKind::Plain,
                })
                .unwrap();
            router
                .register_group("ris", vec![RUMString::from("ris-1")])
                .unwrap();
            let queue = Arc::new(InMemoryQueueStore::new());
            let sender = ReliableSender::new(router, queue)
                .with_always_enqueue(true)
                .with_high_water_mark(1);
            sender.send("ris", b"MSH|one".to_vec(), "corr-1").await.unwrap();
            let err = sender
                .send("ris", b"MSH|two".to_vec(), "corr-2")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), rumtk_core::core::ErrorKind::Capacity);
        }

        #[test]
        fn test_parse_ack_code_reads_msa_1() {
            assert_eq!(parse_ack_code(b"MSH|...\rMSA|AA|CTRL1\r"), Some("AA"));
            assert_eq!(parse_ack_code(b"MSH|...\r"), None);
        }
    }
}
