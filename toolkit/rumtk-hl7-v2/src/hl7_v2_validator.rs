/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2024  Luis M. Santos, M.D.
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

//! Declarative required-segment and required-field schemas keyed by `"TYPE^TRIGGER"`, checked
//! before a parsed message is handed to a handler. Unknown message-type/trigger combinations are
//! accepted with only the universal MSH check, rather than rejected outright, matching the
//! gateway's tolerant-parsing posture toward message types it wasn't specifically written for.

use crate::hl7_v2_parser::v2_parser::V2Message;
use ::phf::{phf_map, Map};
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::strings::RUMString;

type RequiredSegments = &'static [&'static str];
/// `(segment, field_number)` pairs that must hold a non-empty value, on top of the segment
/// itself being present.
type RequiredFields = &'static [(&'static str, isize)];

static MESSAGE_SCHEMAS: Map<&'static str, RequiredSegments> = phf_map! {
    "ADT^A01" => &["MSH", "EVN", "PID", "PV1"],
    "ADT^A04" => &["MSH", "EVN", "PID", "PV1"],
    "ADT^A08" => &["MSH", "EVN", "PID"],
    "ORM^O01" => &["MSH", "PID", "ORC", "OBR"],
    "OMI^O23" => &["MSH", "PID", "ORC", "OBR"],
    "SIU^S12" => &["MSH", "SCH", "PID"],
    "SIU^S13" => &["MSH", "SCH", "PID"],
    "SIU^S14" => &["MSH", "SCH", "PID"],
    "SIU^S15" => &["MSH", "SCH", "PID"],
    "SIU^S17" => &["MSH", "SCH"],
    "ORU^R01" => &["MSH", "PID", "OBR", "OBX"],
    "ACK" => &["MSH", "MSA"],
};

static MESSAGE_FIELD_SCHEMAS: Map<&'static str, RequiredFields> = phf_map! {
    "ORM^O01" => &[("PID", 3), ("ORC", 1)],
    "OMI^O23" => &[("PID", 3), ("ORC", 1)],
};

/// MSH-9's `TYPE^TRIGGER^STRUCTURE` composite, reduced to the `TYPE^TRIGGER` key the schema
/// table is indexed by.
fn message_type_key(message: &V2Message) -> RUMResult<RUMString> {
    let msh = message.get("MSH", 1)?;
    let msh9 = msh.get(9)?;
    let message_type = msh9.get(1).map(|c| c.as_str()).unwrap_or("");
    let trigger_event = msh9.get(2).map(|c| c.as_str()).unwrap_or("");
    if message_type.is_empty() {
        return Err(GatewayError::validation("MSH-9 (message type) is empty"));
    }
    if trigger_event.is_empty() {
        Ok(RUMString::from(message_type))
    } else {
        Ok(RUMString::from(format!("{}^{}", message_type, trigger_event)))
    }
}

/// Whether `segment`-`field` holds a non-empty value in `message`'s first occurrence of that
/// segment. A segment occurrence that doesn't exist or a field that doesn't populate count the
/// same as an empty one: not present.
fn field_present(message: &V2Message, segment: &str, field: isize) -> bool {
    message
        .get(segment, 1)
        .and_then(|seg| seg.get(field))
        .map(|f| !f.as_str().is_empty())
        .unwrap_or(false)
}

/// Validates `message` against the segment and required-field schema for its own MSH-9 message
/// type, returning every missing segment and field at once rather than stopping at the first so
/// the gateway can build one informative AR/AE acknowledgement instead of round-tripping
/// per-error.
pub fn validate(message: &V2Message) -> RUMResult<()> {
    if !message.segment_exists("MSH") {
        return Err(GatewayError::validation("Message has no MSH segment"));
    }
    let key = message_type_key(message)?;
    let Some(required) = MESSAGE_SCHEMAS.get(key.as_str()) else {
        return Ok(());
    };
    let missing_segments: Vec<&str> = required
        .iter()
        .copied()
        .filter(|segment| !message.segment_exists(segment))
        .collect();

    let required_fields = MESSAGE_FIELD_SCHEMAS.get(key.as_str()).copied().unwrap_or(&[]);
    let missing_fields: Vec<RUMString> = required_fields
        .iter()
        .filter(|(segment, field)| {
            // A field on a segment that's already missing entirely is reported once, as the
            // segment, not doubled up as a field too.
            message.segment_exists(segment) && !field_present(message, segment, *field)
        })
        .map(|(segment, field)| RUMString::from(format!("{}-{}", segment, field).as_str()))
        .collect();

    if missing_segments.is_empty() && missing_fields.is_empty() {
        return Ok(());
    }

    let mut issues: Vec<String> = Vec::new();
    if !missing_segments.is_empty() {
        issues.push(format!("segment(s): {}", missing_segments.join(", ")));
    }
    if !missing_fields.is_empty() {
        let fields: Vec<&str> = missing_fields.iter().map(|f| f.as_str()).collect();
        issues.push(format!("field(s): {}", fields.join(", ")));
    }
    Err(GatewayError::validation(format!(
        "Message type {} is missing required {}",
        key,
        issues.join("; ")
    )))
}

/// The `TYPE^TRIGGER` key for `message`, exposed for the handler registry to dispatch on
/// without re-deriving it from MSH-9 itself.
pub fn dispatch_key(message: &V2Message) -> RUMResult<RUMString> {
    message_type_key(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE_ADT: &str = "MSH|^~\\&|A|B|C|D|20240101||ADT^A01|CTRL|P|2.5.1\rEVN|A01|20240101\rPID|1\rPV1|1|I";
    const MISSING_PV1_ADT: &str = "MSH|^~\\&|A|B|C|D|20240101||ADT^A01|CTRL|P|2.5.1\rEVN|A01|20240101\rPID|1";
    const UNKNOWN_TYPE: &str = "MSH|^~\\&|A|B|C|D|20240101||ZZZ^Z01|CTRL|P|2.5.1\r";
    const COMPLETE_ORM: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20250101120000||ORM^O01|MSG00001|P|2.5\rPID|||P-123^^^MRN||Smith^John||19700101|M\rORC|NW|ORD-1|FILL-1\rOBR|1|ORD-1|FILL-1|CT-HEAD^CT Head||||20250101130000\r";
    const ORM_EMPTY_PID3: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20250101120000||ORM^O01|MSG00001|P|2.5\rPID|||\rORC|NW|ORD-1|FILL-1\rOBR|1|ORD-1|FILL-1|CT-HEAD^CT Head||||20250101130000\r";

    #[test]
    fn test_validate_passes_when_all_segments_present() {
        let message = V2Message::from_str(COMPLETE_ADT).unwrap();
        assert!(validate(&message).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_segment() {
        let message = V2Message::from_str(MISSING_PV1_ADT).unwrap();
        let err = validate(&message).unwrap_err();
        assert!(err.to_string().contains("PV1"));
    }

    #[test]
    fn test_validate_accepts_unknown_message_type() {
        let message = V2Message::from_str(UNKNOWN_TYPE).unwrap();
        assert!(validate(&message).is_ok());
    }

    #[test]
    fn test_dispatch_key_reads_msh9() {
        let message = V2Message::from_str(COMPLETE_ADT).unwrap();
        assert_eq!(dispatch_key(&message).unwrap(), "ADT^A01");
    }

    #[test]
    fn test_validate_passes_orm_with_pid3_present() {
        let message = V2Message::from_str(COMPLETE_ORM).unwrap();
        assert!(validate(&message).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_required_field() {
        let message = V2Message::from_str(ORM_EMPTY_PID3).unwrap();
        let err = validate(&message).unwrap_err();
        assert!(err.to_string().contains("PID-3"));
    }
}
