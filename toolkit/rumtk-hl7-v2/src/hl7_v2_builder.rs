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

//! Fluent construction of outbound HL7 v2.x wire payloads, plus the ACK/NAK generation the
//! gateway needs to answer every inbound message over MLLP.

pub mod v2_builder {
    use crate::hl7_v2_parser::v2_parser::V2Message;
    use rumtk_core::core::RUMResult;
    use rumtk_core::strings::RUMString;

    const FIELD_SEP: char = '|';
    const ENCODING_CHARS: &str = "^~\\&";

    /// Builds a message segment-by-segment, joining fields with `|` and segments with the
    /// standard's `\r` terminator (always appended, including after the final segment).
    pub struct V2MessageBuilder {
        segments: Vec<RUMString>,
    }

    impl V2MessageBuilder {
        pub fn new() -> Self {
            V2MessageBuilder {
                segments: Vec::new(),
            }
        }

        /// Appends the MSH segment. `message_type` and `trigger_event` are combined as
        /// `TYPE^TRIGGER^TYPE_TRIGGER` per the MSH-9 composite convention.
        pub fn msh(
            mut self,
            sending_app: &str,
            sending_facility: &str,
            receiving_app: &str,
            receiving_facility: &str,
            timestamp: &str,
            message_type: &str,
            trigger_event: &str,
            control_id: &str,
            processing_id: &str,
            version: &str,
        ) -> Self {
            let message_type_field = if trigger_event.is_empty() {
                RUMString::from(message_type)
            } else {
                RUMString::from(format!(
                    "{}^{}^{}_{}",
                    message_type, trigger_event, message_type, trigger_event
                ))
            };
            let fields = [
                sending_app,
                sending_facility,
                receiving_app,
                receiving_facility,
                timestamp,
                "",
                message_type_field.as_str(),
                control_id,
                processing_id,
                version,
            ];
            let mut segment = RUMString::from(format!("MSH{}{}{}", FIELD_SEP, ENCODING_CHARS, FIELD_SEP));
            segment.push_str(&fields.join(&FIELD_SEP.to_string()));
            self.segments.push(segment);
            self
        }

        /// Appends an arbitrary segment built from already-encoded field values.
        pub fn segment(mut self, name: &str, fields: &[&str]) -> Self {
            let mut segment = RUMString::from(name);
            for field in fields {
                segment.push(FIELD_SEP);
                segment.push_str(field);
            }
            self.segments.push(segment);
            self
        }

        pub fn build(self) -> RUMString {
            let mut out = RUMString::new();
            for segment in &self.segments {
                out.push_str(segment);
                out.push('\r');
            }
            out
        }
    }

    impl Default for V2MessageBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    fn msh_field(original: &V2Message, field_number: isize) -> RUMString {
        original
            .get("MSH", 1)
            .ok()
            .and_then(|msh| msh.get(field_number).ok())
            .map(|f| RUMString::from(f.as_str()))
            .unwrap_or_default()
    }

    /// The original message's MSH-9.2 (trigger event), e.g. `"O01"` for `ORM^O01^ORM_O01`.
    fn msh_trigger_event(original: &V2Message) -> RUMString {
        original
            .get("MSH", 1)
            .ok()
            .and_then(|msh| msh.get(9).ok())
            .and_then(|f| f.get(2).ok())
            .map(|c| RUMString::from(c.as_str()))
            .unwrap_or_default()
    }

    /// Builds an ACK/NAK response to `original`, swapping sending/receiving application and
    /// facility (the responder was the original receiver) and carrying MSA-1/MSA-2/MSA-3. Per
    /// the ACK contract, MSH-9 is `ACK^<trigger>^ACK` (not the usual `TYPE^TRIGGER^TYPE_TRIGGER`
    /// composite), so the original's trigger is folded into a literal composite string and
    /// handed to `.msh()` as an already-built message type with no further trigger to append.
    fn build_acknowledgement(
        original: &V2Message,
        ack_code: &str,
        text_message: &str,
        timestamp: &str,
        control_id: &str,
    ) -> RUMResult<RUMString> {
        let sending_app = msh_field(original, 5);
        let sending_facility = msh_field(original, 6);
        let receiving_app = msh_field(original, 3);
        let receiving_facility = msh_field(original, 4);
        let original_control_id = msh_field(original, 10);
        let processing_id = msh_field(original, 11);
        let version = msh_field(original, 12);
        let trigger = msh_trigger_event(original);
        let ack_message_type = if trigger.is_empty() {
            RUMString::from("ACK")
        } else {
            RUMString::from(format!("ACK^{}^ACK", trigger))
        };

        let mut builder = V2MessageBuilder::new()
            .msh(
                &sending_app,
                &sending_facility,
                &receiving_app,
                &receiving_facility,
                timestamp,
                ack_message_type.as_str(),
                "",
                control_id,
                if processing_id.is_empty() {
                    "P"
                } else {
                    processing_id.as_str()
                },
                if version.is_empty() {
                    "2.5.1"
                } else {
                    version.as_str()
                },
            )
            .segment("MSA", &[ack_code, &original_control_id, text_message]);
        // Per the ACK contract, AE/AR carry an ERR segment with the error code and text; AA
        // needs none since there's nothing to explain.
        if ack_code != "AA" {
            // ERR-3 (HL7 Error Code) carries the ack code, ERR-8 (User Message) the free text.
            builder = builder.segment("ERR", &["", "", ack_code, "", "", "", "", text_message]);
        }
        Ok(builder.build())
    }

    /// `AA` application-accept acknowledgement.
    pub fn build_ack(
        original: &V2Message,
        timestamp: &str,
        control_id: &str,
    ) -> RUMResult<RUMString> {
        build_acknowledgement(original, "AA", "", timestamp, control_id)
    }

    /// `AE` application-error acknowledgement: the message was understood but could not be
    /// processed (mapping/storage failure downstream of parsing/validation).
    pub fn build_ae(
        original: &V2Message,
        error_text: &str,
        timestamp: &str,
        control_id: &str,
    ) -> RUMResult<RUMString> {
        build_acknowledgement(original, "AE", error_text, timestamp, control_id)
    }

    /// `AR` application-reject acknowledgement: the message failed structural validation.
    pub fn build_nak(
        original: &V2Message,
        error_text: &str,
        timestamp: &str,
        control_id: &str,
    ) -> RUMResult<RUMString> {
        build_acknowledgement(original, "AR", error_text, timestamp, control_id)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::hl7_v2_parser::v2_parser::V2Message;

        const SAMPLE: &str = "MSH|^~\\&|SENDAPP|SENDFAC|RECVAPP|RECVFAC|20240101000000||ADT^A01|CTRL1|P|2.5.1\rPID|1";

        #[test]
        fn test_builder_round_trips_through_parser() {
            let wire = V2MessageBuilder::new()
                .msh(
                    "APP", "FAC", "RAPP", "RFAC", "20240101000000", "ADT", "A01", "CTRL1", "P",
                    "2.5.1",
                )
                .segment("PID", &["1", "", "PATID1"])
                .build();
            let message = V2Message::from_str(&wire).unwrap();
            assert!(message.segment_exists("MSH"));
            assert!(message.segment_exists("PID"));
        }

        #[test]
        fn test_ack_swaps_sender_and_receiver() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let ack_wire = build_ack(&original, "20240101000001", "CTRL2").unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            let msh = ack.get("MSH", 1).unwrap();
            assert_eq!(msh.get(3).unwrap().as_str(), "RECVAPP");
            assert_eq!(msh.get(5).unwrap().as_str(), "SENDAPP");
            let msa = ack.get("MSA", 1).unwrap();
            assert_eq!(msa.get(1).unwrap().as_str(), "AA");
            assert_eq!(msa.get(2).unwrap().as_str(), "CTRL1");
        }

        #[test]
        fn test_ack_message_type_is_ack_trigger_ack() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let ack_wire = build_ack(&original, "20240101000001", "CTRL2").unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            let msh9 = ack.get("MSH", 1).unwrap().get(9).unwrap();
            assert_eq!(msh9.get(1).unwrap().as_str(), "ACK");
            assert_eq!(msh9.get(2).unwrap().as_str(), "A01");
            assert_eq!(msh9.get(3).unwrap().as_str(), "ACK");
        }

        #[test]
        fn test_nak_carries_error_text() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let nak_wire = build_nak(&original, "missing PID-3", "20240101000001", "CTRL2").unwrap();
            let nak = V2Message::from_str(&nak_wire).unwrap();
            let msa = nak.get("MSA", 1).unwrap();
            assert_eq!(msa.get(1).unwrap().as_str(), "AR");
            assert_eq!(msa.get(3).unwrap().as_str(), "missing PID-3");
        }

        #[test]
        fn test_nak_includes_err_segment() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let nak_wire = build_nak(&original, "missing PID-3", "20240101000001", "CTRL2").unwrap();
            let nak = V2Message::from_str(&nak_wire).unwrap();
            assert!(nak.segment_exists("ERR"));
            let err = nak.get("ERR", 1).unwrap();
            assert_eq!(err.get(3).unwrap().as_str(), "AR");
            assert_eq!(err.get(8).unwrap().as_str(), "missing PID-3");
        }

        #[test]
        fn test_ae_includes_err_segment() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let ae_wire = build_ae(&original, "storage unavailable", "20240101000001", "CTRL2").unwrap();
            let ae = V2Message::from_str(&ae_wire).unwrap();
            assert!(ae.segment_exists("ERR"));
            let err = ae.get("ERR", 1).unwrap();
            assert_eq!(err.get(3).unwrap().as_str(), "AE");
            assert_eq!(err.get(8).unwrap().as_str(), "storage unavailable");
        }

        #[test]
        fn test_ack_has_no_err_segment() {
            let original = V2Message::from_str(SAMPLE).unwrap();
            let ack_wire = build_ack(&original, "20240101000001", "CTRL2").unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            assert!(!ack.segment_exists("ERR"));
        }
    }
}
