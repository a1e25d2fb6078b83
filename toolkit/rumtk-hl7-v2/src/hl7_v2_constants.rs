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

//! Delimiters, header markers, and segment-name lookups shared by the parser, builder,
//! and validator. Default delimiter values are per Figure 2-1 of the HL7 v2 standard.

use ::phf::{phf_map, Map};

/// Segment terminator. Not configurable by implementers per the standard.
pub const V2_SEGMENT_TERMINATOR: char = '\r';
pub const V2_DEFAULT_FIELD_SEPARATOR: char = '|';
pub const V2_DEFAULT_COMPONENT_SEPARATOR: char = '^';
pub const V2_DEFAULT_REPETITION_SEPARATOR: char = '~';
pub const V2_DEFAULT_ESCAPE_CHARACTER: char = '\\';
pub const V2_DEFAULT_SUBCOMPONENT_SEPARATOR: char = '&';
pub const V2_DEFAULT_TRUNCATION_CHARACTER: char = '#';

/// Three-letter tag that must open every message's first segment.
pub const MSHEADER_PATTERN: &str = "MSH";

/// Sentinel HL7 places in a field to mean "delete this value on update".
pub const V2_DELETE_FIELD: &str = "\"\"";

/// Digits of precision HL7 allows for the fractional-second portion of a DTM value.
pub const V2_DATETIME_MIRCRO_LENGTH: u8 = 4;
/// Nanosecond-to-microsecond-digit tick conversion factor used by `V2DateTime::from_utc_datetime`.
pub const V2_DATETIME_THOUSAND_TICK: u32 = 1000;

/// Known segment identifiers mapped to a short human-readable description. Segments not
/// present here are still accepted by the parser (per the tolerant-parsing Non-goal of
/// rejecting unknown message types); `segment_description` falls back to a generic label.
pub static V2_SEGMENT_DESCRIPTIONS: Map<&'static str, &'static str> = phf_map! {
    "MSH" => "Message Header",
    "FHS" => "File Header",
    "FTS" => "File Trailer",
    "BHS" => "Batch Header",
    "BTS" => "Batch Trailer",
    "EVN" => "Event Type",
    "PID" => "Patient Identification",
    "PD1" => "Patient Additional Demographic",
    "NK1" => "Next of Kin / Associated Parties",
    "PV1" => "Patient Visit",
    "PV2" => "Patient Visit - Additional Information",
    "ORC" => "Common Order",
    "OBR" => "Observation Request",
    "OBX" => "Observation/Result",
    "DG1" => "Diagnosis",
    "SPM" => "Specimen",
    "RXA" => "Pharmacy/Treatment Administration",
    "NTE" => "Notes and Comments",
    "MSA" => "Message Acknowledgment",
    "ERR" => "Error",
    "AL1" => "Patient Allergy Information",
    "IN1" => "Insurance",
    "GT1" => "Guarantor",
    "ROL" => "Role",
    "SCH" => "Scheduling Activity Information",
    "AIS" => "Appointment Information - Service",
    "AIL" => "Appointment Information - Location Resource",
    "AIP" => "Appointment Information - Personnel Resource",
    "QRD" => "Original-Style Query Definition",
    "QRF" => "Original Style Query Filter",
};

/// Looks up a segment's description, falling back to a generic label for segments the
/// gateway does not specifically recognize.
pub fn segment_description(segment_name: &str) -> &'static str {
    V2_SEGMENT_DESCRIPTIONS
        .get(segment_name)
        .copied()
        .unwrap_or("Unrecognized Segment")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_segment_description() {
        assert_eq!(segment_description("PID"), "Patient Identification");
    }

    #[test]
    fn test_unknown_segment_falls_back() {
        assert_eq!(segment_description("ZZZ"), "Unrecognized Segment");
    }
}
