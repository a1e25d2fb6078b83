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
/// Modality Worklist entries keyed by accession number, behind one `MwlStore` trait with an
/// in-memory implementation (tests, standalone runs) and a `rusqlite`-backed one (production),
/// mirroring the durable queue's backend-agnostic shape in `rumtk_core::queue`.
///
pub mod mwl {
    use rumtk_core::cache::RUMCache;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use std::sync::RwLock;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MwlStatus {
        Scheduled,
        InProgress,
        Completed,
        Discontinued,
        Arrived,
        Ready,
    }

    impl MwlStatus {
        pub fn as_str(&self) -> &'static str {
            match self {
                MwlStatus::Scheduled => "SCHEDULED",
                MwlStatus::InProgress => "IN_PROGRESS",
                MwlStatus::Completed => "COMPLETED",
                MwlStatus::Discontinued => "DISCONTINUED",
                MwlStatus::Arrived => "ARRIVED",
                MwlStatus::Ready => "READY",
            }
        }
    }

    /// `Family^Given^Middle^Suffix^Prefix`, the HL7 XPN component order. The mapper is
    /// responsible for converting to/from DICOM PN's `Family^Given^Middle^Prefix^Suffix` order.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct PatientName {
        pub family: RUMString,
        pub given: RUMString,
        pub middle: RUMString,
        pub suffix: RUMString,
        pub prefix: RUMString,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MwlEntry {
        pub accession: RUMString,
        pub patient_id: RUMString,
        pub patient_name: PatientName,
        pub birth_date: RUMString,
        pub sex: RUMString,
        pub scheduled_station_ae: RUMString,
        pub scheduled_start: RUMString,
        pub modality: RUMString,
        pub requested_procedure: RUMString,
        pub requesting_physician: RUMString,
        pub status: MwlStatus,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MwlQueryFilter {
        pub patient_id: Option<RUMString>,
        pub accession: Option<RUMString>,
        pub modality: Option<RUMString>,
        pub scheduled_station_ae: Option<RUMString>,
        pub status: Option<MwlStatus>,
        /// Inclusive `YYYYMMDD`-or-finer bounds compared lexically, matching HL7 TS ordering.
        pub scheduled_after: Option<RUMString>,
        pub scheduled_before: Option<RUMString>,
    }

    impl MwlQueryFilter {
        fn matches(&self, entry: &MwlEntry) -> bool {
            if let Some(pid) = &self.patient_id {
                if &entry.patient_id != pid {
                    return false;
                }
            }
            if let Some(accession) = &self.accession {
                if &entry.accession != accession {
                    return false;
                }
            }
            if let Some(modality) = &self.modality {
                if &entry.modality != modality {
                    return false;
                }
            }
            if let Some(ae) = &self.scheduled_station_ae {
                if &entry.scheduled_station_ae != ae {
                    return false;
                }
            }
            if let Some(status) = &self.status {
                if entry.status != *status {
                    return false;
                }
            }
            if let Some(after) = &self.scheduled_after {
                if entry.scheduled_start.as_str() < after.as_str() {
                    return false;
                }
            }
            if let Some(before) = &self.scheduled_before {
                if entry.scheduled_start.as_str() > before.as_str() {
                    return false;
                }
            }
            true
        }
    }

    ///
    /// Backend-agnostic contract for MWL persistence. Every mutating call identifies the entry
    /// by accession number, its one durable key (§3's "Keyed by accession number (unique)").
    ///
    pub trait MwlStore: Send + Sync {
        fn add(&self, entry: MwlEntry) -> RUMResult<()>;
        fn update(&self, accession: &str, entry: MwlEntry) -> RUMResult<()>;
        fn cancel(&self, accession: &str) -> RUMResult<()>;
        fn get(&self, accession: &str) -> RUMResult<MwlEntry>;
        /// Rewrites `patient_id` on every entry currently keyed to `old_patient_id`, used by
        /// ADT^A40 merges (§4.4).
        fn reassign_patient(&self, old_patient_id: &str, new_patient_id: &str) -> RUMResult<usize>;
        /// Scheduled-start ascending, per §4.5's default ordering.
        fn query(&self, filter: &MwlQueryFilter) -> RUMResult<Vec<MwlEntry>>;
    }

    #[derive(Default)]
    struct InMemoryState {
        entries: RUMCache<RUMString, MwlEntry>,
    }

    ///
    /// `RwLock`-guarded map backend for tests and standalone runs, matching the single-writer/
    /// multi-reader policy of §5.
    ///
    pub struct InMemoryMwlStore {
        state: RwLock<InMemoryState>,
    }

    impl InMemoryMwlStore {
        pub fn new() -> Self {
            InMemoryMwlStore {
                state: RwLock::new(InMemoryState::default()),
            }
        }
    }

    impl Default for InMemoryMwlStore {
        fn default() -> Self {
            Self::new()
        }
    }

    fn lock_poisoned() -> GatewayError {
        GatewayError::storage("mwl store lock poisoned")
    }

    fn not_found(accession: &str) -> GatewayError {
        GatewayError::storage(format!("no MWL entry for accession \"{}\"", accession))
    }

    impl MwlStore for InMemoryMwlStore {
        fn add(&self, entry: MwlEntry) -> RUMResult<()> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            if state.entries.contains_key(&entry.accession) {
                return Err(GatewayError::storage(format!(
                    "MWL entry for accession \"{}\" already exists",
                    entry.accession
                )));
            }
            state.entries.insert(entry.accession.clone(), entry);
            Ok(())
        }

        fn update(&self, accession: &str, entry: MwlEntry) -> RUMResult<()> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            if !state.entries.contains_key(accession) {
                return Err(not_found(accession));
            }
            state.entries.insert(RUMString::from(accession), entry);
            Ok(())
        }

        fn cancel(&self, accession: &str) -> RUMResult<()> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            state
                .entries
                .remove(accession)
                .map(|_| ())
                .ok_or_else(|| not_found(accession))
        }

        fn get(&self, accession: &str) -> RUMResult<MwlEntry> {
            let state = self.state.read().map_err(|_| lock_poisoned())?;
            state
                .entries
                .get(accession)
                .cloned()
                .ok_or_else(|| not_found(accession))
        }

        fn reassign_patient(&self, old_patient_id: &str, new_patient_id: &str) -> RUMResult<usize> {
            let mut state = self.state.write().map_err(|_| lock_poisoned())?;
            let mut count = 0;
            for entry in state.entries.values_mut() {
                if entry.patient_id == old_patient_id {
                    entry.patient_id = RUMString::from(new_patient_id);
                    count += 1;
                }
            }
            Ok(count)
        }

        fn query(&self, filter: &MwlQueryFilter) -> RUMResult<Vec<MwlEntry>> {
            let state = self.state.read().map_err(|_| lock_poisoned())?;
            let mut results: Vec<MwlEntry> = state
                .entries
                .values()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect();
            results.sort_by(|a, b| a.scheduled_start.cmp(&b.scheduled_start));
            Ok(results)
        }
    }

    ///
    /// `rusqlite`-backed store for production deployments, grounded on the original system's
    /// SQLite-based MWL/queue persistence (§4.5). One connection guarded by a mutex is adequate
    /// here: SQLite serializes writers internally and the gateway's MWL write volume is low
    /// relative to HL7 message throughput (writes happen once per order, not once per message).
    ///
    pub struct SqliteMwlStore {
        conn: std::sync::Mutex<rusqlite::Connection>,
    }

    impl SqliteMwlStore {
        pub fn open(path: &str) -> RUMResult<Self> {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| GatewayError::storage(format!("opening MWL database: {}", e)))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| GatewayError::storage(format!("enabling WAL mode: {}", e)))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS mwl_entry (
                    accession TEXT PRIMARY KEY,
                    patient_id TEXT NOT NULL,
                    family TEXT NOT NULL DEFAULT '',
                    given TEXT NOT NULL DEFAULT '',
                    middle TEXT NOT NULL DEFAULT '',
                    suffix TEXT NOT NULL DEFAULT '',
                    prefix TEXT NOT NULL DEFAULT '',
                    birth_date TEXT NOT NULL DEFAULT '',
                    sex TEXT NOT NULL DEFAULT '',
                    scheduled_station_ae TEXT NOT NULL DEFAULT '',
                    scheduled_start TEXT NOT NULL DEFAULT '',
                    modality TEXT NOT NULL DEFAULT '',
                    requested_procedure TEXT NOT NULL DEFAULT '',
                    requesting_physician TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL
                )",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating mwl_entry table: {}", e)))?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_mwl_patient ON mwl_entry(patient_id)",
                (),
            )
            .map_err(|e| GatewayError::storage(format!("creating mwl_entry index: {}", e)))?;
            Ok(SqliteMwlStore {
                conn: std::sync::Mutex::new(conn),
            })
        }

        fn status_from_str(status: &str) -> MwlStatus {
            match status {
                "IN_PROGRESS" => MwlStatus::InProgress,
                "COMPLETED" => MwlStatus::Completed,
                "DISCONTINUED" => MwlStatus::Discontinued,
                "ARRIVED" => MwlStatus::Arrived,
                "READY" => MwlStatus::Ready,
                _ => MwlStatus::Scheduled,
            }
        }

        fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MwlEntry> {
            let status: String = row.get("status")?;
            Ok(MwlEntry {
                accession: RUMString::from(row.get::<_, String>("accession")?.as_str()),
                patient_id: RUMString::from(row.get::<_, String>("patient_id")?.as_str()),
                patient_name: PatientName {
                    family: RUMString::from(row.get::<_, String>("family")?.as_str()),
                    given: RUMString::from(row.get::<_, String>("given")?.as_str()),
                    middle: RUMString::from(row.get::<_, String>("middle")?.as_str()),
                    suffix: RUMString::from(row.get::<_, String>("suffix")?.as_str()),
                    prefix: RUMString::from(row.get::<_, String>("prefix")?.as_str()),
                },
                birth_date: RUMString::from(row.get::<_, String>("birth_date")?.as_str()),
                sex: RUMString::from(row.get::<_, String>("sex")?.as_str()),
                scheduled_station_ae: RUMString::from(
                    row.get::<_, String>("scheduled_station_ae")?.as_str(),
                ),
                scheduled_start: RUMString::from(row.get::<_, String>("scheduled_start")?.as_str()),
                modality: RUMString::from(row.get::<_, String>("modality")?.as_str()),
                requested_procedure: RUMString::from(
                    row.get::<_, String>("requested_procedure")?.as_str(),
                ),
                requesting_physician: RUMString::from(
                    row.get::<_, String>("requesting_physician")?.as_str(),
                ),
                status: Self::status_from_str(&status),
            })
        }
    }

    impl MwlStore for SqliteMwlStore {
        fn add(&self, entry: MwlEntry) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.execute(
                "INSERT INTO mwl_entry (
                    accession, patient_id, family, given, middle, suffix, prefix,
                    birth_date, sex, scheduled_station_ae, scheduled_start, modality,
                    requested_procedure, requesting_physician, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                rusqlite::params![
                    entry.accession.as_str(),
                    entry.patient_id.as_str(),
                    entry.patient_name.family.as_str(),
                    entry.patient_name.given.as_str(),
                    entry.patient_name.middle.as_str(),
                    entry.patient_name.suffix.as_str(),
                    entry.patient_name.prefix.as_str(),
                    entry.birth_date.as_str(),
                    entry.sex.as_str(),
                    entry.scheduled_station_ae.as_str(),
                    entry.scheduled_start.as_str(),
                    entry.modality.as_str(),
                    entry.requested_procedure.as_str(),
                    entry.requesting_physician.as_str(),
                    entry.status.as_str(),
                ],
            )
            .map_err(|e| GatewayError::storage(format!("inserting MWL entry: {}", e)))?;
            Ok(())
        }

        fn update(&self, accession: &str, entry: MwlEntry) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let rows = conn
                .execute(
                    "UPDATE mwl_entry SET
                        patient_id = ?2, family = ?3, given = ?4, middle = ?5, suffix = ?6,
                        prefix = ?7, birth_date = ?8, sex = ?9, scheduled_station_ae = ?10,
                        scheduled_start = ?11, modality = ?12, requested_procedure = ?13,
                        requesting_physician = ?14, status = ?15
                     WHERE accession = ?1",
                    rusqlite::params![
                        accession,
                        entry.patient_id.as_str(),
                        entry.patient_name.family.as_str(),
                        entry.patient_name.given.as_str(),
                        entry.patient_name.middle.as_str(),
                        entry.patient_name.suffix.as_str(),
                        entry.patient_name.prefix.as_str(),
                        entry.birth_date.as_str(),
                        entry.sex.as_str(),
                        entry.scheduled_station_ae.as_str(),
                        entry.scheduled_start.as_str(),
                        entry.modality.as_str(),
                        entry.requested_procedure.as_str(),
                        entry.requesting_physician.as_str(),
                        entry.status.as_str(),
                    ],
                )
                .map_err(|e| GatewayError::storage(format!("updating MWL entry: {}", e)))?;
            if rows == 0 {
                return Err(not_found(accession));
            }
            Ok(())
        }

        fn cancel(&self, accession: &str) -> RUMResult<()> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let rows = conn
                .execute("DELETE FROM mwl_entry WHERE accession = ?1", [accession])
                .map_err(|e| GatewayError::storage(format!("cancelling MWL entry: {}", e)))?;
            if rows == 0 {
                return Err(not_found(accession));
            }
            Ok(())
        }

        fn get(&self, accession: &str) -> RUMResult<MwlEntry> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.query_row(
                "SELECT * FROM mwl_entry WHERE accession = ?1",
                [accession],
                Self::row_to_entry,
            )
            .map_err(|_| not_found(accession))
        }

        fn reassign_patient(&self, old_patient_id: &str, new_patient_id: &str) -> RUMResult<usize> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let rows = conn
                .execute(
                    "UPDATE mwl_entry SET patient_id = ?2 WHERE patient_id = ?1",
                    [old_patient_id, new_patient_id],
                )
                .map_err(|e| GatewayError::storage(format!("reassigning patient id: {}", e)))?;
            Ok(rows)
        }

        fn query(&self, filter: &MwlQueryFilter) -> RUMResult<Vec<MwlEntry>> {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            let mut stmt = conn
                .prepare("SELECT * FROM mwl_entry ORDER BY scheduled_start ASC")
                .map_err(|e| GatewayError::storage(format!("preparing MWL query: {}", e)))?;
            let rows = stmt
                .query_map([], Self::row_to_entry)
                .map_err(|e| GatewayError::storage(format!("querying MWL entries: {}", e)))?;
            let mut out = Vec::new();
            for row in rows {
                let entry =
                    row.map_err(|e| GatewayError::storage(format!("reading MWL row: {}", e)))?;
                if filter.matches(&entry) {
                    out.push(entry);
                }
            }
            Ok(out)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn sample(accession: &str, patient_id: &str) -> MwlEntry {
            MwlEntry {
                accession: RUMString::from(accession),
                patient_id: RUMString::from(patient_id),
                patient_name: PatientName {
                    family: RUMString::from("Smith"),
                    given: RUMString::from("John"),
                    ..Default::default()
                },
                birth_date: RUMString::from("19700101"),
                sex: RUMString::from("M"),
                scheduled_station_ae: RUMString::from("CT1"),
                scheduled_start: RUMString::from("20250101130000"),
                modality: RUMString::from("CT"),
                requested_procedure: RUMString::from("CT Head"),
                requesting_physician: RUMString::from("Jones"),
                status: MwlStatus::Scheduled,
            }
        }

        #[test]
        fn test_in_memory_add_then_get() {
            let store = InMemoryMwlStore::new();
            store.add(sample("ACC-1", "P-1")).unwrap();
            let entry = store.get("ACC-1").unwrap();
            assert_eq!(entry.patient_id, "P-1");
        }

        #[test]
        fn test_in_memory_duplicate_accession_rejected() {
            let store = InMemoryMwlStore::new();
            store.add(sample("ACC-1", "P-1")).unwrap();
            assert!(store.add(sample("ACC-1", "P-2")).is_err());
        }

        #[test]
        fn test_in_memory_reassign_patient() {
            let store = InMemoryMwlStore::new();
            store.add(sample("ACC-1", "P-OLD")).unwrap();
            store.add(sample("ACC-2", "P-OLD")).unwrap();
            store.add(sample("ACC-3", "P-OTHER")).unwrap();
            let changed = store.reassign_patient("P-OLD", "P-NEW").unwrap();
            assert_eq!(changed, 2);
            assert_eq!(store.get("ACC-1").unwrap().patient_id, "P-NEW");
            assert_eq!(store.get("ACC-3").unwrap().patient_id, "P-OTHER");
        }

        #[test]
        fn test_in_memory_query_filters_by_modality() {
            let store = InMemoryMwlStore::new();
            store.add(sample("ACC-1", "P-1")).unwrap();
            let mut other = sample("ACC-2", "P-2");
            other.modality = RUMString::from("MR");
            store.add(other).unwrap();

            let filter = MwlQueryFilter {
                modality: Some(RUMString::from("CT")),
                ..Default::default()
            };
            let results = store.query(&filter).unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].accession, "ACC-1");
        }

        #[test]
        fn test_sqlite_round_trip() {
            let store = SqliteMwlStore::open(":memory:").unwrap();
            store.add(sample("ACC-9", "P-9")).unwrap();
            let entry = store.get("ACC-9").unwrap();
            assert_eq!(entry.modality, "CT");
            store.cancel("ACC-9").unwrap();
            assert!(store.get("ACC-9").is_err());
        }
    }
}
