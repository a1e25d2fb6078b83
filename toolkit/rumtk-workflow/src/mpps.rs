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
/// Modality Performed Procedure Step tracking: N-CREATE opens a record in-progress, N-SET closes
/// it to completed or discontinued. Records are keyed by SOP Instance UID and serialized per-UID
/// so that out-of-order or duplicate N-SETs for the same procedure step never race each other,
/// while unrelated procedure steps proceed fully in parallel. Persistence sits behind an
/// `MppsStore` trait, mirroring `mwl`'s in-memory/`rusqlite` backend pair.
///
pub mod mpps {
    use rumtk_core::cache::RUMCache;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use std::sync::{Arc, Mutex, RwLock};
    use tokio::sync::broadcast;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MppsStatus {
        InProgress,
        Completed,
        Discontinued,
    }

    impl MppsStatus {
        pub fn as_str(&self) -> &'static str {
            match self {
                MppsStatus::InProgress => "IN_PROGRESS",
                MppsStatus::Completed => "COMPLETED",
                MppsStatus::Discontinued => "DISCONTINUED",
            }
        }

        fn is_terminal(&self) -> bool {
            !matches!(self, MppsStatus::InProgress)
        }

        fn from_str(s: &str) -> Self {
            match s {
                "COMPLETED" => MppsStatus::Completed,
                "DISCONTINUED" => MppsStatus::Discontinued,
                _ => MppsStatus::InProgress,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct MppsRecord {
        pub sop_instance_uid: RUMString,
        pub accession: RUMString,
        pub performing_station_ae: RUMString,
        pub study_instance_uid: RUMString,
        pub referenced_series_uids: Vec<RUMString>,
        pub start_datetime: RUMString,
        pub end_datetime: RUMString,
        pub status: MppsStatus,
        pub discontinuation_reason: Option<RUMString>,
    }

    /// Arguments to an N-CREATE, the event that opens a procedure step.
    #[derive(Debug, Clone)]
    pub struct NCreateEvent {
        pub sop_instance_uid: RUMString,
        pub accession: RUMString,
        pub performing_station_ae: RUMString,
        pub study_instance_uid: RUMString,
        pub start_datetime: RUMString,
    }

    /// Arguments to an N-SET, the event that closes a procedure step to a terminal status.
    #[derive(Debug, Clone)]
    pub struct NSetEvent {
        pub sop_instance_uid: RUMString,
        pub status: MppsStatus,
        pub end_datetime: RUMString,
        pub referenced_series_uids: Vec<RUMString>,
        pub discontinuation_reason: Option<RUMString>,
    }

    /// Emitted on every accepted N-CREATE/N-SET so the HL7 side can react asynchronously
    /// without calling back into the handler synchronously (no lock is held across the hop).
    #[derive(Debug, Clone)]
    pub enum MppsPublication {
        Started(MppsRecord),
        Closed(MppsRecord),
    }

    struct ShardedLocks {
        shards: RwLock<RUMCache<RUMString, Arc<Mutex<()>>>>,
    }

    impl ShardedLocks {
        fn new() -> Self {
            ShardedLocks {
                shards: RwLock::new(RUMCache::default()),
            }
        }

        /// Returns the lock for `key`, creating it on first use. Existing entries are never
        /// removed proactively; the gateway's UID cardinality over a process lifetime is bounded
        /// by procedure volume, not unbounded churn, so this trades a little memory for never
        /// racing a lock's own removal against a concurrent lookup.
        fn get(&self, key: &str) -> Arc<Mutex<()>> {
            if let Some(lock) = self.shards.read().expect("shard map poisoned").get(key) {
                return lock.clone();
            }
            let mut shards = self.shards.write().expect("shard map poisoned");
            shards
                .entry(RUMString::from(key))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        }
    }

    fn lock_poisoned() -> GatewayError {
        GatewayError::storage("mpps record store lock poisoned")
    }

    fn not_found(sop_instance_uid: &str) -> GatewayError {
        GatewayError::storage(format!(
            "no MPPS record for SOP instance \"{}\"",
            sop_instance_uid
        ))
    }

    ///
    /// Backend-agnostic contract for MPPS persistence. `MppsHandler` is the only caller and
    /// always holds the relevant per-UID lock while calling these, so implementations need not
    /// re-derive atomicity across `insert`/`update` themselves.
    ///
    pub trait MppsStore: Send + Sync {
        fn insert(&self, record: MppsRecord) -> RUMResult<()>;
        fn get(&self, sop_instance_uid: &str) -> RUMResult<MppsRecord>;
        fn update(&self, record: MppsRecord) -> RUMResult<()>;
        fn list_in_progress(&self) -> RUMResult<Vec<MppsRecord>>;
        fn list_by_accession(&self, accession: &str) -> RUMResult<Vec<MppsRecord>>;
    }

    #[derive(Default)]
    struct InMemoryState {
        records: RUMCache<RUMString, MppsRecord>,
    }

    ///
    /// `RwLock`-guarded map backend for tests and standalone runs.
    ///
    pub struct InMemoryMppsStore {
        state: RwLock<InMemoryState>,
    }

    impl InMemoryMppsStore {
        pub fn new() -> Self {
            InMemoryMppsStore {
                state: RwLock::new(InMemoryState::default()),
            }
        }
    }

    impl Default for InMemoryMppsStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MppsStore for InMemoryMppsStore {
        fn insert(&self, record: MppsRecord) -> RUMResult<()> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            if state.records.contains_key(&record.sop_instance_uid) {
                return Err(GatewayError::storage(format!(
                    "MPPS record for SOP instance \"{}\" already exists",
                    record.sop_instance_uid
                )));
            }
            state.records.insert(record.sop_instance_uid.clone(), record);
            Ok(())
        }

        fn get(&self, sop_instance_uid: &str) -> RUMResult<MppsRecord> {
            let state = self.state.read().map_err(|_| lock_poisoned())?;
            state
                .records
                .get(sop_instance_uid)
                .cloned()
                .ok_or_else(|| not_found(sop_instance_uid))
        }

        fn update(&self, record: MppsRecord) -> RUMResult<()> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            if !state.records.contains_key(&record.sop_instance_uid) {
                return Err(not_found(&record.sop_instance_uid));
            }
            state.records.insert(record.sop_instance_uid.clone(), record);
            Ok(())
        }

        fn list_in_progress(&self) -> RUMResult<Vec<MppsRecord>> {
            let state = self.state.read().map_err(|_| lock_poisoned())?;
            Ok(state
                .records
                .values()
                .filter(|r| r.status == MppsStatus::InProgress)
                .cloned()
                .collect())
        }

        fn list_by_accession(&self, accession: &str) -> RUMResult<Vec<MppsRecord>> {
            let state = self.state.read().map_err(|_| lock_poisoned())?;
            Ok(state
                .records
                .values()
                .filter(|r| r.accession == accession)
                .cloned()
                .collect())
        }
    }

    ///
    /// `rusqlite`-backed store for production deployments, mirroring `mwl::SqliteMwlStore`.
    /// `referenced_series_uids` is flattened to a comma-joined column since no series UID can
    /// itself contain a comma.
    ///
    pub struct SqliteMppsStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteMppsStore {
        pub fn open(path: &str) -> RUMResult<Self> {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| GatewayError::storage(format!("opening MPPS database: {}", e)))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| GatewayError::storage(format!("enabling WAL mode: {}", e)))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS mpps_record (
                    sop_instance_uid TEXT PRIMARY KEY,
                    accession TEXT NOT NULL,
                    performing_station_ae TEXT NOT NULL DEFAULT '',
                    study_instance_uid TEXT NOT NULL DEFAULT '',
                    referenced_series_uids TEXT NOT NULL DEFAULT '',
                    start_datetime TEXT NOT NULL DEFAULT '',
                    end_datetime TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL,
                    discontinuation_reason TEXT
                )",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating mpps_record table: {}", e)))?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_mpps_accession ON mpps_record(accession)",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating mpps_record index: {}", e)))?;
            Ok(SqliteMppsStore {
                conn: Mutex::new(conn),
            })
        }

        fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MppsRecord> {
            let status: String = row.get("status")?;
            let series: String = row.get("referenced_series_uids")?;
            let referenced_series_uids = if series.is_empty() {
                Vec::new()
            } else {
                series.split(',').map(RUMString::from).collect()
            };
            Ok(MppsRecord {
                sop_instance_uid: RUMString::from(row.get::<_, String>("sop_instance_uid")?.as_str()),
                accession: RUMString::from(row.get::<_, String>("accession")?.as_str()),
                performing_station_ae: RUMString::from(
                    row.get::<_, String>("performing_station_ae")?.as_str(),
                ),
                study_instance_uid: RUMString::from(
                    row.get::<_, String>("study_instance_uid")?.as_str(),
                ),
                referenced_series_uids,
                start_datetime: RUMString::from(row.get::<_, String>("start_datetime")?.as_str()),
                end_datetime: RUMString::from(row.get::<_, String>("end_datetime")?.as_str()),
                status: MppsStatus::from_str(&status),
                discontinuation_reason: row
                    .get::<_, Option<String>>("discontinuation_reason")?
                    .map(|s| RUMString::from(s.as_str())),
            })
        }
    }

    impl MppsStore for SqliteMppsStore {
        fn insert(&self, record: MppsRecord) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let series = record
                .referenced_series_uids
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",");
            conn.execute(
                "INSERT INTO mpps_record (
                    sop_instance_uid, accession, performing_station_ae, study_instance_uid,
                    referenced_series_uids, start_datetime, end_datetime, status,
                    discontinuation_reason
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.sop_instance_uid.as_str(),
                    record.accession.as_str(),
                    record.performing_station_ae.as_str(),
                    record.study_instance_uid.as_str(),
                    series,
                    record.start_datetime.as_str(),
                    record.end_datetime.as_str(),
                    record.status.as_str(),
                    record.discontinuation_reason.as_ref().map(|s| s.as_str()),
                ],
            )
            .map_err(|e| GatewayError::storage(format!("inserting MPPS record: {}", e)))?;
            Ok(())
        }

        fn get(&self, sop_instance_uid: &str) -> RUMResult<MppsRecord> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.query_row(
                "SELECT * FROM mpps_record WHERE sop_instance_uid = ?1",
                [sop_instance_uid],
                Self::row_to_record,
            )
            .map_err(|_| not_found(sop_instance_uid))
        }

        fn update(&self, record: MppsRecord) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let series = record
                .referenced_series_uids
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let rows = conn
                .execute(
                    "UPDATE mpps_record SET
                        accession = ?2, performing_station_ae = ?3, study_instance_uid = ?4,
                        referenced_series_uids = ?5, start_datetime = ?6, end_datetime = ?7,
                        status = ?8, discontinuation_reason = ?9
                     WHERE sop_instance_uid = ?1",
                    rusqlite::params![
                        record.sop_instance_uid.as_str(),
                        record.accession.as_str(),
                        record.performing_station_ae.as_str(),
                        record.study_instance_uid.as_str(),
                        series,
                        record.start_datetime.as_str(),
                        record.end_datetime.as_str(),
                        record.status.as_str(),
                        record.discontinuation_reason.as_ref().map(|s| s.as_str()),
                    ],
                )
                .map_err(|e| GatewayError::storage(format!("updating MPPS record: {}", e)))?;
            if rows == 0 {
                return Err(not_found(&record.sop_instance_uid));
            }
            Ok(())
        }

        fn list_in_progress(&self) -> RUMResult<Vec<MppsRecord>> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let mut stmt = conn
                .prepare("SELECT * FROM mpps_record WHERE status = 'IN_PROGRESS'")
                .map_err(|e| GatewayError::storage(format!("preparing MPPS query: {}", e)))?;
            let rows = stmt
                .query_map([], Self::row_to_record)
                .map_err(|e| GatewayError::storage(format!("querying MPPS records: {}", e)))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| GatewayError::storage(format!("reading MPPS row: {}", e)))?);
            }
            Ok(out)
        }

        fn list_by_accession(&self, accession: &str) -> RUMResult<Vec<MppsRecord>> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let mut stmt = conn
                .prepare("SELECT * FROM mpps_record WHERE accession = ?1")
                .map_err(|e| GatewayError::storage(format!("preparing MPPS query: {}", e)))?;
            let rows = stmt
                .query_map([accession], Self::row_to_record)
                .map_err(|e| GatewayError::storage(format!("querying MPPS records: {}", e)))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| GatewayError::storage(format!("reading MPPS row: {}", e)))?);
            }
            Ok(out)
        }
    }

    ///
    /// Owns MPPS state behind a pluggable [MppsStore] and publishes every accepted transition on
    /// a broadcast channel. One handler instance is shared process-wide; `subscribe()` hands out
    /// independent receivers so the HL7 workflow coordinator (and anything else, e.g. metrics)
    /// can listen without competing for the same events.
    ///
    pub struct MppsHandler {
        store: Arc<dyn MppsStore>,
        locks: ShardedLocks,
        publisher: broadcast::Sender<MppsPublication>,
    }

    impl MppsHandler {
        pub fn new() -> Self {
            Self::with_store(Arc::new(InMemoryMppsStore::new()))
        }

        pub fn with_store(store: Arc<dyn MppsStore>) -> Self {
            let (publisher, _) = broadcast::channel(256);
            MppsHandler {
                store,
                locks: ShardedLocks::new(),
                publisher,
            }
        }

        pub fn subscribe(&self) -> broadcast::Receiver<MppsPublication> {
            self.publisher.subscribe()
        }

        pub fn n_create(&self, event: NCreateEvent) -> RUMResult<MppsRecord> {
            let uid_lock = self.locks.get(&event.sop_instance_uid);
            let _guard = uid_lock.lock().map_err(|_| lock_poisoned())?;

            if self.store.get(&event.sop_instance_uid).is_ok() {
                return Err(GatewayError::state_transition(
                    format!(
                        "N-CREATE received for SOP instance \"{}\" that already has a record",
                        event.sop_instance_uid
                    ),
                    "none",
                    "in-progress",
                ));
            }
            let record = MppsRecord {
                sop_instance_uid: event.sop_instance_uid.clone(),
                accession: event.accession,
                performing_station_ae: event.performing_station_ae,
                study_instance_uid: event.study_instance_uid,
                referenced_series_uids: Vec::new(),
                start_datetime: event.start_datetime,
                end_datetime: RUMString::new(),
                status: MppsStatus::InProgress,
                discontinuation_reason: None,
            };
            self.store.insert(record.clone())?;

            let _ = self.publisher.send(MppsPublication::Started(record.clone()));
            Ok(record)
        }

        pub fn n_set(&self, event: NSetEvent) -> RUMResult<MppsRecord> {
            if !event.status.is_terminal() {
                return Err(GatewayError::state_transition(
                    "N-SET must transition to a terminal status",
                    "in-progress",
                    event.status.as_str(),
                ));
            }

            let uid_lock = self.locks.get(&event.sop_instance_uid);
            let _guard = uid_lock.lock().map_err(|_| lock_poisoned())?;

            let mut record = self.store.get(&event.sop_instance_uid).map_err(|_| {
                GatewayError::storage(format!(
                    "N-SET received for unknown SOP instance \"{}\"",
                    event.sop_instance_uid
                ))
            })?;
            if record.status.is_terminal() {
                return Err(GatewayError::state_transition(
                    format!(
                        "SOP instance \"{}\" is already in a terminal state",
                        event.sop_instance_uid
                    ),
                    record.status.as_str(),
                    event.status.as_str(),
                ));
            }
            record.status = event.status;
            record.end_datetime = event.end_datetime;
            record.referenced_series_uids = event.referenced_series_uids;
            record.discontinuation_reason = event.discontinuation_reason;
            self.store.update(record.clone())?;

            let _ = self.publisher.send(MppsPublication::Closed(record.clone()));
            Ok(record)
        }

        pub fn get(&self, sop_instance_uid: &str) -> RUMResult<MppsRecord> {
            self.store.get(sop_instance_uid)
        }

        /// Every record still in-progress, for replaying on restart (§4.6's recovery query).
        pub fn recover_in_progress(&self) -> RUMResult<Vec<MppsRecord>> {
            self.store.list_in_progress()
        }

        pub fn find_by_accession(&self, accession: &str) -> RUMResult<Vec<MppsRecord>> {
            self.store.list_by_accession(accession)
        }
    }

    impl Default for MppsHandler {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn create_event(uid: &str) -> NCreateEvent {
            NCreateEvent {
                sop_instance_uid: RUMString::from(uid),
                accession: RUMString::from("ACC-1"),
                performing_station_ae: RUMString::from("CT1"),
                study_instance_uid: RUMString::from("1.2.3"),
                start_datetime: RUMString::from("20250101130000"),
            }
        }

        #[test]
        fn test_n_create_then_n_set_completed() {
            let handler = MppsHandler::new();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            let closed = handler
                .n_set(NSetEvent {
                    sop_instance_uid: RUMString::from("1.2.3.4"),
                    status: MppsStatus::Completed,
                    end_datetime: RUMString::from("20250101140000"),
                    referenced_series_uids: vec![RUMString::from("1.2.3.4.5")],
                    discontinuation_reason: None,
                })
                .unwrap();
            assert_eq!(closed.status, MppsStatus::Completed);
        }

        #[test]
        fn test_duplicate_n_create_rejected() {
            let handler = MppsHandler::new();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            assert!(handler.n_create(create_event("1.2.3.4")).is_err());
        }

        #[test]
        fn test_n_set_on_terminal_record_rejected() {
            let handler = MppsHandler::new();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            let close = NSetEvent {
                sop_instance_uid: RUMString::from("1.2.3.4"),
                status: MppsStatus::Completed,
                end_datetime: RUMString::from("20250101140000"),
                referenced_series_uids: vec![],
                discontinuation_reason: None,
            };
            handler.n_set(close.clone()).unwrap();
            assert!(handler.n_set(close).is_err());
        }

        #[test]
        fn test_n_set_requires_terminal_status() {
            let handler = MppsHandler::new();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            let bad = NSetEvent {
                sop_instance_uid: RUMString::from("1.2.3.4"),
                status: MppsStatus::InProgress,
                end_datetime: RUMString::new(),
                referenced_series_uids: vec![],
                discontinuation_reason: None,
            };
            assert!(handler.n_set(bad).is_err());
        }

        #[test]
        fn test_recover_in_progress_excludes_terminal_records() {
            let handler = MppsHandler::new();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            handler.n_create(create_event("1.2.3.5")).unwrap();
            handler
                .n_set(NSetEvent {
                    sop_instance_uid: RUMString::from("1.2.3.4"),
                    status: MppsStatus::Discontinued,
                    end_datetime: RUMString::from("20250101140000"),
                    referenced_series_uids: vec![],
                    discontinuation_reason: Some(RUMString::from("patient left")),
                })
                .unwrap();

            let pending = handler.recover_in_progress().unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].sop_instance_uid, "1.2.3.5");
        }

        #[tokio::test]
        async fn test_publication_is_broadcast_to_subscribers() {
            let handler = MppsHandler::new();
            let mut rx = handler.subscribe();
            handler.n_create(create_event("1.2.3.4")).unwrap();
            match rx.recv().await.unwrap() {
                MppsPublication::Started(record) => {
                    assert_eq!(record.sop_instance_uid, "1.2.3.4");
                }
                MppsPublication::Closed(_) => panic!("expected Started publication"),
            }
        }

        #[test]
        fn test_sqlite_backed_handler_round_trips() {
            let store = Arc::new(SqliteMppsStore::open(":memory:").unwrap());
            let handler = MppsHandler::with_store(store);
            handler.n_create(create_event("1.2.3.9")).unwrap();
            let closed = handler
                .n_set(NSetEvent {
                    sop_instance_uid: RUMString::from("1.2.3.9"),
                    status: MppsStatus::Completed,
                    end_datetime: RUMString::from("20250101140000"),
                    referenced_series_uids: vec![RUMString::from("1.2.3.9.1")],
                    discontinuation_reason: None,
                })
                .unwrap();
            assert_eq!(closed.status, MppsStatus::Completed);
            assert_eq!(handler.get("1.2.3.9").unwrap().referenced_series_uids.len(), 1);
        }
    }
}
