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
/// Bridges MPPS publications to outbound HL7: every accepted N-CREATE/N-SET is mapped to an
/// ORM^O01 result notification and handed to the reliable sender, addressed to every failover
/// group subscribed for the record's accession (falling back to a default group list when no
/// accession-specific subscription exists).
///
pub mod workflow {
    use crate::mapper::mapper::build_orm_from_mpps;
    use crate::mpps::mpps::MppsPublication;
    use crate::sender::sender::ReliableSender;
    use chrono::Utc;
    use rumtk_core::cache::RUMCache;
    use rumtk_core::strings::RUMString;
    use rumtk_hl7_v2::hl7_v2_base_types::v2_base_types::V2DateTime;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};
    use tokio::sync::broadcast;

    ///
    /// Coordinates one MPPS handler's publications with outbound delivery. Owns the sending
    /// application/facility identity the gateway uses on every outbound ORM^O01.
    ///
    pub struct MppsWorkflow {
        sender: Arc<ReliableSender>,
        subscriptions: RwLock<RUMCache<RUMString, Vec<RUMString>>>,
        default_groups: Vec<RUMString>,
        sending_app: RUMString,
        sending_facility: RUMString,
        receiving_app: RUMString,
        receiving_facility: RUMString,
        control_id_counter: AtomicU64,
    }

    impl MppsWorkflow {
        pub fn new(
            sender: Arc<ReliableSender>,
            default_groups: Vec<RUMString>,
            sending_app: impl Into<RUMString>,
            sending_facility: impl Into<RUMString>,
            receiving_app: impl Into<RUMString>,
            receiving_facility: impl Into<RUMString>,
        ) -> Self {
            MppsWorkflow {
                sender,
                subscriptions: RwLock::new(RUMCache::default()),
                default_groups,
                sending_app: sending_app.into(),
                sending_facility: sending_facility.into(),
                receiving_app: receiving_app.into(),
                receiving_facility: receiving_facility.into(),
                control_id_counter: AtomicU64::new(0),
            }
        }

        /// Registers an extra failover group to notify for a given accession, in addition to the
        /// default groups (e.g. a RIS that asked to be notified about one specific order).
        pub fn subscribe_accession(&self, accession: &str, group: &str) {
            let mut subscriptions = self.subscriptions.write().expect("subscriptions lock poisoned");
            subscriptions
                .entry(RUMString::from(accession))
                .or_insert_with(Vec::new)
                .push(RUMString::from(group));
        }

        fn groups_for(&self, accession: &str) -> Vec<RUMString> {
            let subscriptions = self.subscriptions.read().expect("subscriptions lock poisoned");
            let mut groups = self.default_groups.clone();
            if let Some(extra) = subscriptions.get(accession) {
                groups.extend(extra.iter().cloned());
            }
            groups
        }

        fn next_control_id(&self) -> RUMString {
            let n = self.control_id_counter.fetch_add(1, Ordering::Relaxed);
            RUMString::from(format!("WF{:010}", n).as_str())
        }

        /// Maps one MPPS publication to an outbound ORM^O01 and hands it to the sender for every
        /// subscribed failover group. Mapping failures are logged and swallowed -- the MPPS
        /// record itself is already durably persisted by the time this runs, so a mapping defect
        /// must not be allowed to look like a lost procedure step.
        pub async fn handle_publication(&self, publication: MppsPublication) {
            let record = match publication {
                MppsPublication::Started(r) => r,
                MppsPublication::Closed(r) => r,
            };

            let timestamp = V2DateTime::from_utc_datetime(&Utc::now()).as_v2_date_time();
            let control_id = self.next_control_id();
            let built = build_orm_from_mpps(
                &record,
                &self.sending_app,
                &self.sending_facility,
                &self.receiving_app,
                &self.receiving_facility,
                &control_id,
                &timestamp,
            );
            let (_, raw) = match built {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(
                        sop_instance_uid = %record.sop_instance_uid,
                        error = %e,
                        "failed to map MPPS record to an outbound ORM^O01"
                    );
                    return;
                }
            };

            for group in self.groups_for(&record.accession) {
                let correlation_id = format!("mpps-{}-{}", record.sop_instance_uid, control_id);
                if let Err(e) = self
                    .sender
                    .send(&group, raw.as_bytes().to_vec(), &correlation_id)
                    .await
                {
                    tracing::warn!(
                        group = %group,
                        sop_instance_uid = %record.sop_instance_uid,
                        error = %e,
                        "failed to dispatch MPPS result notification"
                    );
                }
            }
        }

        /// Spawns a task that drains `mpps_rx` until the channel closes or the workflow is
        /// dropped, handing every publication to [MppsWorkflow::handle_publication].
        pub fn spawn(
            self: Arc<Self>,
            mut mpps_rx: broadcast::Receiver<MppsPublication>,
        ) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async move {
                loop {
                    match mpps_rx.recv().await {
                        Ok(publication) => self.handle_publication(publication).await,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "mpps workflow lagged behind publications");
                        }
                    }
                }
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::mpps::mpps::{MppsHandler, MppsStatus, NCreateEvent, NSetEvent};
        use crate::router::router::{Destination, OutboundRouter, TransportKind};
        use rumtk_core::queue::queue::InMemoryQueueStore;

        fn workflow_with_queueing_sender() -> (Arc<MppsWorkflow>, Arc<InMemoryQueueStore>) {
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
            let sender = Arc::new(
                ReliableSender::new(router, queue.clone()).with_always_enqueue(true),
            );
            let workflow = Arc::new(MppsWorkflow::new(
                sender,
                vec![RUMString::from("ris")],
                "BRIDGE",
                "HOSP",
                "HIS",
                "HOSP",
            ));
            (workflow, queue)
        }

        #[tokio::test]
        async fn test_closed_publication_enqueues_outbound_orm() {
            let (workflow, queue) = workflow_with_queueing_sender();
            let handler = MppsHandler::new();
            let mut rx = handler.subscribe();
            handler
                .n_create(NCreateEvent {
                    sop_instance_uid: RUMString::from("1.2.3.4"),
                    accession: RUMString::from("ORD-1"),
                    performing_station_ae: RUMString::from("CT1"),
                    study_instance_uid: RUMString::from("1.2.3"),
                    start_datetime: RUMString::from("20250101130000"),
                })
                .unwrap();
            handler
                .n_set(NSetEvent {
                    sop_instance_uid: RUMString::from("1.2.3.4"),
                    status: MppsStatus::Completed,
                    end_datetime: RUMString::from("20250101140000"),
                    referenced_series_uids: vec![],
                    discontinuation_reason: None,
                })
                .unwrap();

            // Started, then Closed.
            let started = rx.recv().await.unwrap();
            workflow.handle_publication(started).await;
            let closed = rx.recv().await.unwrap();
            workflow.handle_publication(closed).await;

            assert_eq!(queue.pending_count().unwrap(), 2);
        }

        #[test]
        fn test_subscribe_accession_adds_extra_group() {
            let (workflow, _queue) = workflow_with_queueing_sender();
            workflow.subscribe_accession("ORD-1", "audit");
            let groups = workflow.groups_for("ORD-1");
            assert!(groups.contains(&RUMString::from("ris")));
            assert!(groups.contains(&RUMString::from("audit")));
            assert_eq!(workflow.groups_for("ORD-2").len(), 1);
        }
    }
}
