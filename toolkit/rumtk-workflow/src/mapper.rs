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
/// Bidirectional HL7 v2.x <-> DICOM MWL/MPPS mapping: turns ORM^O01/SIU^Sxx/ADT messages into
/// worklist mutations, and turns a closed MPPS record back into an outbound ORM^O01 result
/// notification. Every function here is pure data transformation; none of them touch a store.
///
pub mod mapper {
    use crate::mpps::mpps::MppsRecord;
    use crate::mwl::mwl::{MwlEntry, MwlStatus, PatientName};
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use rumtk_hl7_v2::hl7_v2_builder::v2_builder::V2MessageBuilder;
    use rumtk_hl7_v2::hl7_v2_parser::v2_parser::V2Message;

    /// The MWL mutation an inbound order/scheduling message asks for, decoupled from which HL7
    /// trigger event produced it (ORM^O01's ORC-1 and SIU's event code both collapse to this).
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum OrderIntent {
        New(MwlEntry),
        Update(MwlEntry),
        Cancel { accession: RUMString },
        Discontinue { accession: RUMString },
    }

    fn field_str<'a>(message: &'a V2Message, segment: &str, field: isize) -> RUMResult<&'a str> {
        Ok(message.get(segment, 1)?.get(field)?.as_str())
    }

    fn optional_field_str<'a>(message: &'a V2Message, segment: &str, field: isize) -> &'a str {
        message
            .get(segment, 1)
            .and_then(|seg| seg.get(field))
            .map(|c| c.as_str())
            .unwrap_or("")
    }

    /// Decodes an XPN-encoded name (`Family^Given^Middle^Suffix^Prefix`, HL7's component order)
    /// into a [PatientName].
    pub fn xpn_to_patient_name(raw: &str, component_separator: char) -> PatientName {
        let parts: Vec<&str> = raw.split(component_separator).collect();
        PatientName {
            family: RUMString::from(*parts.first().unwrap_or(&"")),
            given: RUMString::from(*parts.get(1).unwrap_or(&"")),
            middle: RUMString::from(*parts.get(2).unwrap_or(&"")),
            suffix: RUMString::from(*parts.get(3).unwrap_or(&"")),
            prefix: RUMString::from(*parts.get(4).unwrap_or(&"")),
        }
    }

    /// Encodes a [PatientName] as DICOM PN (`Family^Given^Middle^Prefix^Suffix`): the 4th and
    /// 5th components swap places relative to HL7 XPN.
    pub fn patient_name_to_pn(name: &PatientName) -> RUMString {
        RUMString::from(
            format!(
                "{}^{}^{}^{}^{}",
                name.family, name.given, name.middle, name.prefix, name.suffix
            )
            .as_str(),
        )
    }

    /// Encodes a [PatientName] back as HL7 XPN for outbound messages.
    pub fn patient_name_to_xpn(name: &PatientName) -> RUMString {
        RUMString::from(
            format!(
                "{}^{}^{}^{}^{}",
                name.family, name.given, name.middle, name.suffix, name.prefix
            )
            .as_str(),
        )
    }

    /// HL7 TS (`YYYYMMDDHHMMSS`, optionally truncated) split into DICOM DA (`YYYYMMDD`) and
    /// TM (`HHMMSS`) components. Missing time digits come back as an empty TM.
    pub fn hl7_ts_to_da_tm(ts: &str) -> (RUMString, RUMString) {
        let digits: String = ts.chars().take_while(|c| c.is_ascii_digit()).collect();
        let da: String = digits.chars().take(8).collect();
        let tm: String = if digits.len() > 8 {
            digits.chars().skip(8).collect()
        } else {
            String::new()
        };
        (RUMString::from(da.as_str()), RUMString::from(tm.as_str()))
    }

    /// Combines a DICOM DA and TM pair back into an HL7 TS.
    pub fn da_tm_to_hl7_ts(da: &str, tm: &str) -> RUMString {
        RUMString::from(format!("{}{}", da, tm).as_str())
    }

    fn mwl_entry_from_orm(message: &V2Message) -> RUMResult<MwlEntry> {
        let accession = field_str(message, "ORC", 3)
            .or_else(|_| field_str(message, "OBR", 3))
            .map_err(|e| GatewayError::mapping(format!("reading filler order number: {}", e)))?;
        let patient_id = field_str(message, "PID", 3)
            .map_err(|e| GatewayError::mapping(format!("reading patient id: {}", e)))?;
        let raw_name = optional_field_str(message, "PID", 5);
        let scheduled_start = optional_field_str(message, "OBR", 7);
        Ok(MwlEntry {
            accession: RUMString::from(accession),
            patient_id: RUMString::from(patient_id),
            patient_name: xpn_to_patient_name(raw_name, '^'),
            birth_date: RUMString::from(optional_field_str(message, "PID", 7)),
            sex: RUMString::from(optional_field_str(message, "PID", 8)),
            scheduled_station_ae: RUMString::from(optional_field_str(message, "OBR", 21)),
            scheduled_start: RUMString::from(scheduled_start),
            modality: RUMString::from(optional_field_str(message, "OBR", 24)),
            requested_procedure: RUMString::from(optional_field_str(message, "OBR", 4)),
            requesting_physician: RUMString::from(optional_field_str(message, "OBR", 16)),
            status: MwlStatus::Scheduled,
        })
    }

    /// Maps an inbound ORM^O01 to the worklist intent its ORC-1 order control code implies
    /// (NW -> new, XO -> update, CA/DC -> cancel/discontinue).
    pub fn map_orm_to_order_intent(message: &V2Message) -> RUMResult<OrderIntent> {
        let order_control = field_str(message, "ORC", 1)
            .map_err(|e| GatewayError::mapping(format!("reading ORC-1: {}", e)))?;
        let accession = RUMString::from(
            field_str(message, "ORC", 3)
                .or_else(|_| field_str(message, "OBR", 3))
                .unwrap_or(""),
        );
        match order_control {
            "NW" => Ok(OrderIntent::New(mwl_entry_from_orm(message)?)),
            "XO" => Ok(OrderIntent::Update(mwl_entry_from_orm(message)?)),
            "CA" => Ok(OrderIntent::Cancel { accession }),
            "DC" => Ok(OrderIntent::Discontinue { accession }),
            other => Err(GatewayError::mapping(format!(
                "unsupported ORC-1 order control code \"{}\"",
                other
            ))),
        }
    }

    /// Maps an inbound SIU^Sxx scheduling message to its worklist intent (S12 new, S13/S14
    /// reschedule/modify as an update, S15 cancel).
    pub fn map_siu_to_order_intent(message: &V2Message, trigger: &str) -> RUMResult<OrderIntent> {
        let accession = RUMString::from(field_str(message, "SCH", 1).unwrap_or(""));
        let patient_id = RUMString::from(field_str(message, "PID", 3).unwrap_or(""));
        let raw_name = optional_field_str(message, "PID", 5);
        let entry = MwlEntry {
            accession: accession.clone(),
            patient_id,
            patient_name: xpn_to_patient_name(raw_name, '^'),
            birth_date: RUMString::from(optional_field_str(message, "PID", 7)),
            sex: RUMString::from(optional_field_str(message, "PID", 8)),
            scheduled_station_ae: RUMString::from(optional_field_str(message, "SCH", 14)),
            scheduled_start: RUMString::from(optional_field_str(message, "SCH", 11)),
            modality: RUMString::new(),
            requested_procedure: RUMString::from(optional_field_str(message, "SCH", 7)),
            requesting_physician: RUMString::from(optional_field_str(message, "SCH", 10)),
            status: MwlStatus::Scheduled,
        };
        match trigger {
            "S12" => Ok(OrderIntent::New(entry)),
            "S13" | "S14" => Ok(OrderIntent::Update(entry)),
            "S15" => Ok(OrderIntent::Cancel { accession }),
            other => Err(GatewayError::mapping(format!(
                "unsupported SIU trigger event \"{}\"",
                other
            ))),
        }
    }

    /// Patient identity merge from ADT^A40: returns `(surviving_id, merged_id)` so the caller can
    /// reassign every MWL entry keyed to the merged id.
    pub fn map_a40_merge_ids(message: &V2Message) -> RUMResult<(RUMString, RUMString)> {
        let surviving = field_str(message, "PID", 3)
            .map_err(|e| GatewayError::mapping(format!("reading surviving patient id: {}", e)))?;
        let merged = field_str(message, "MRG", 1)
            .map_err(|e| GatewayError::mapping(format!("reading MRG-1 prior patient id: {}", e)))?;
        Ok((RUMString::from(surviving), RUMString::from(merged)))
    }

    /// Builds the outbound ORM^O01 result notification for an MPPS record's N-CREATE or N-SET,
    /// with ORC-1/ORC-5 reflecting the procedure step's status (in-progress, completed, or
    /// discontinued). Returns both the parsed message (for callers inspecting fields) and the
    /// raw wire bytes ready to frame over MLLP.
    pub fn build_orm_from_mpps(
        record: &MppsRecord,
        sending_app: &str,
        sending_facility: &str,
        receiving_app: &str,
        receiving_facility: &str,
        message_control_id: &str,
        message_datetime: &str,
    ) -> RUMResult<(V2Message, RUMString)> {
        use crate::mpps::mpps::MppsStatus;
        let (order_control, order_status) = match record.status {
            MppsStatus::InProgress => ("SC", "IP"),
            MppsStatus::Completed => ("SC", "CM"),
            MppsStatus::Discontinued => ("DC", "CA"),
        };
        let study_ref = RUMString::from(format!("^^^{}", record.study_instance_uid).as_str());

        let mut obr_fields: Vec<RUMString> = vec![RUMString::new(); 27];
        obr_fields[0] = RUMString::from("1");
        obr_fields[2] = record.accession.clone();
        obr_fields[3] = study_ref;
        obr_fields[6] = record.start_datetime.clone();
        if !record.end_datetime.is_empty() {
            obr_fields[21] = record.end_datetime.clone();
            obr_fields[26] = RUMString::from(
                format!("{}^{}", record.start_datetime, record.end_datetime).as_str(),
            );
        }
        let obr_refs: Vec<&str> = obr_fields.iter().map(|f| f.as_str()).collect();

        let raw = V2MessageBuilder::new()
            .msh(
                sending_app,
                sending_facility,
                receiving_app,
                receiving_facility,
                message_datetime,
                "ORM",
                "O01",
                message_control_id,
                "P",
                "2.5.1",
            )
            .segment(
                "ORC",
                &[order_control, record.accession.as_str(), "", "", order_status],
            )
            .segment("OBR", &obr_refs)
            .build();
        let message = V2Message::from_str(&raw)
            .map_err(|e| GatewayError::mapping(format!("parsing built ORM^O01: {}", e)))?;
        Ok((message, RUMString::from(raw.as_str())))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::mpps::mpps::MppsStatus;

        const ORM: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20250101120000||ORM^O01|MSG00001|P|2.5\rPID|||P-123^^^MRN||Smith^John||19700101|M\rORC|NW|ORD-1|FILL-1\rOBR|1|ORD-1|FILL-1|CT-HEAD^CT Head||||20250101130000\r";

        #[test]
        fn test_xpn_to_patient_name_splits_components() {
            let name = xpn_to_patient_name("Smith^John^Q", '^');
            assert_eq!(name.family, "Smith");
            assert_eq!(name.given, "John");
            assert_eq!(name.middle, "Q");
        }

        #[test]
        fn test_patient_name_to_pn_swaps_suffix_and_prefix() {
            let name = PatientName {
                family: RUMString::from("Smith"),
                given: RUMString::from("John"),
                middle: RUMString::new(),
                suffix: RUMString::from("Jr"),
                prefix: RUMString::from("Dr"),
            };
            assert_eq!(patient_name_to_pn(&name).as_str(), "Smith^John^^Dr^Jr");
            assert_eq!(patient_name_to_xpn(&name).as_str(), "Smith^John^^Jr^Dr");
        }

        #[test]
        fn test_hl7_ts_round_trips_through_da_tm() {
            let (da, tm) = hl7_ts_to_da_tm("20250101130000");
            assert_eq!(da.as_str(), "20250101");
            assert_eq!(tm.as_str(), "130000");
            assert_eq!(da_tm_to_hl7_ts(&da, &tm).as_str(), "20250101130000");
        }

        #[test]
        fn test_map_orm_new_order_builds_mwl_entry() {
            let message = V2Message::from_str(ORM).unwrap();
            match map_orm_to_order_intent(&message).unwrap() {
                OrderIntent::New(entry) => {
                    assert_eq!(entry.accession, "FILL-1");
                    assert_eq!(entry.patient_id, "P-123");
                    assert_eq!(entry.patient_name.family, "Smith");
                }
                other => panic!("expected New intent, got {:?}", other),
            }
        }

        #[test]
        fn test_map_orm_cancel_order() {
            let cancel = ORM.replace("ORC|NW|ORD-1|FILL-1", "ORC|CA|ORD-1|FILL-1");
            let message = V2Message::from_str(&cancel).unwrap();
            match map_orm_to_order_intent(&message).unwrap() {
                OrderIntent::Cancel { accession } => assert_eq!(accession, "FILL-1"),
                other => panic!("expected Cancel intent, got {:?}", other),
            }
        }

        #[test]
        fn test_build_orm_from_completed_mpps() {
            let record = MppsRecord {
                sop_instance_uid: RUMString::from("1.2.3.4"),
                accession: RUMString::from("ORD-1"),
                performing_station_ae: RUMString::from("CT1"),
                study_instance_uid: RUMString::from("1.2.3"),
                referenced_series_uids: vec![],
                start_datetime: RUMString::from("20250101130000"),
                end_datetime: RUMString::from("20250101140000"),
                status: MppsStatus::Completed,
                discontinuation_reason: None,
            };
            let (message, raw) = build_orm_from_mpps(
                &record,
                "BRIDGE",
                "HOSP",
                "HIS",
                "HOSP",
                "MSG00002",
                "20250101140100",
            )
            .unwrap();
            assert_eq!(message.get("ORC", 1).unwrap().get(1).unwrap().as_str(), "SC");
            assert_eq!(message.get("ORC", 1).unwrap().get(5).unwrap().as_str(), "CM");
            assert!(raw.contains("ORM^O01"));
        }

        #[test]
        fn test_build_orm_from_in_progress_mpps() {
            let record = MppsRecord {
                sop_instance_uid: RUMString::from("1.2.3.4"),
                accession: RUMString::from("ORD-1"),
                performing_station_ae: RUMString::from("CT1"),
                study_instance_uid: RUMString::from("1.2.3"),
                referenced_series_uids: vec![],
                start_datetime: RUMString::from("20250101130000"),
                end_datetime: RUMString::new(),
                status: MppsStatus::InProgress,
                discontinuation_reason: None,
            };
            let (message, _raw) = build_orm_from_mpps(
                &record, "BRIDGE", "HOSP", "HIS", "HOSP", "MSG00003", "20250101130100",
            )
            .unwrap();
            assert_eq!(message.get("ORC", 1).unwrap().get(1).unwrap().as_str(), "SC");
            assert_eq!(message.get("ORC", 1).unwrap().get(5).unwrap().as_str(), "IP");
        }
    }
}
