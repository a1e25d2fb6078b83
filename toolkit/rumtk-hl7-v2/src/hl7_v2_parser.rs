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

//! A tolerant HL7 v2.x message parser: turns a raw wire payload into a navigable tree of
//! segments, fields, repetitions, and components, discovering the encoding delimiters from
//! the message's own MSH segment rather than assuming the HL7 defaults.
//! https://v2.hl7.org/conformance/HL7v2_Conformance_Methodology_R1_O1_Ballot_Revised_D9_-_September_2019_Introduction.html

pub mod v2_parser {
    use crate::hl7_v2_constants::{
        segment_description, MSHEADER_PATTERN, V2_DEFAULT_COMPONENT_SEPARATOR,
        V2_DEFAULT_ESCAPE_CHARACTER, V2_DEFAULT_FIELD_SEPARATOR, V2_DEFAULT_REPETITION_SEPARATOR,
        V2_DEFAULT_SUBCOMPONENT_SEPARATOR, V2_DEFAULT_TRUNCATION_CHARACTER, V2_SEGMENT_TERMINATOR,
    };
    use rumtk_core::core::{clamp_index, GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    /// Delimiters a message's own MSH-1/MSH-2 declare. Every segment after MSH is split
    /// using these rather than the HL7 defaults, since implementers are allowed to change
    /// everything but the segment terminator.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct V2ParseCharacters {
        pub segment_terminator: char,
        pub field_separator: char,
        pub component_separator: char,
        pub repetition_separator: char,
        pub escape_character: char,
        pub subcomponent_separator: char,
        pub truncation_character: char,
    }

    impl Default for V2ParseCharacters {
        fn default() -> Self {
            V2ParseCharacters {
                segment_terminator: V2_SEGMENT_TERMINATOR,
                field_separator: V2_DEFAULT_FIELD_SEPARATOR,
                component_separator: V2_DEFAULT_COMPONENT_SEPARATOR,
                repetition_separator: V2_DEFAULT_REPETITION_SEPARATOR,
                escape_character: V2_DEFAULT_ESCAPE_CHARACTER,
                subcomponent_separator: V2_DEFAULT_SUBCOMPONENT_SEPARATOR,
                truncation_character: V2_DEFAULT_TRUNCATION_CHARACTER,
            }
        }
    }

    impl V2ParseCharacters {
        pub fn new() -> V2ParseCharacters {
            V2ParseCharacters::default()
        }

        /// MSH-1 is the field separator itself (the character right after the literal "MSH").
        /// MSH-2 is 4 or 5 more characters (component, repetition, escape, subcomponent, and
        /// an optional truncation character) that are never themselves escaped or split.
        pub fn from_msh(msh_segment: &str) -> RUMResult<V2ParseCharacters> {
            if !V2ParseCharacters::is_msh(msh_segment) {
                return Err(GatewayError::parse(
                    "Segment does not begin with MSH; cannot discover encoding characters",
                    0,
                    0,
                ));
            }
            let mut chars = msh_segment.chars();
            for _ in 0..3 {
                chars.next();
            }
            let field_separator = chars.next().ok_or_else(|| {
                GatewayError::parse("MSH segment is missing its field separator (MSH-1)", 3, 0)
            })?;
            let encoding: RUMString = chars.take(5).collect();
            let mut encoding_chars = encoding.chars();
            let component_separator = encoding_chars.next().ok_or_else(|| {
                GatewayError::parse("MSH-2 is missing the component separator", 4, 0)
            })?;
            let repetition_separator = encoding_chars.next().ok_or_else(|| {
                GatewayError::parse("MSH-2 is missing the repetition separator", 5, 0)
            })?;
            let escape_character = encoding_chars
                .next()
                .ok_or_else(|| GatewayError::parse("MSH-2 is missing the escape character", 6, 0))?;
            let subcomponent_separator = encoding_chars.next().ok_or_else(|| {
                GatewayError::parse("MSH-2 is missing the subcomponent separator", 7, 0)
            })?;
            let truncation_character = encoding_chars
                .next()
                .unwrap_or(V2_DEFAULT_TRUNCATION_CHARACTER);

            Ok(V2ParseCharacters {
                segment_terminator: V2_SEGMENT_TERMINATOR,
                field_separator,
                component_separator,
                repetition_separator,
                escape_character,
                subcomponent_separator,
                truncation_character,
            })
        }

        pub fn is_msh(segment_token: &str) -> bool {
            segment_token.len() >= 3 && &segment_token[0..3] == MSHEADER_PATTERN
        }

        /// Decodes `\F\`/`\S\`/`\T\`/`\R\`/`\E\`/`\Xhh..\` escape sequences back into the
        /// literal delimiter (or byte) they stand in for, per section 2.7 of the standard.
        pub fn decode_escapes(&self, raw: &str) -> RUMString {
            if !raw.contains(self.escape_character) {
                return RUMString::from(raw);
            }
            let mut out = RUMString::new();
            let mut chars = raw.chars().peekable();
            while let Some(c) = chars.next() {
                if c != self.escape_character {
                    out.push(c);
                    continue;
                }
                let mut code = RUMString::new();
                let mut closed = false;
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == self.escape_character {
                        closed = true;
                        break;
                    }
                    code.push(next);
                }
                if !closed {
                    out.push(self.escape_character);
                    out.push_str(&code);
                    continue;
                }
                match code.as_str() {
                    "F" => out.push(self.field_separator),
                    "S" => out.push(self.component_separator),
                    "T" => out.push(self.subcomponent_separator),
                    "R" => out.push(self.repetition_separator),
                    "E" => out.push(self.escape_character),
                    hex if hex.starts_with('X') => {
                        if let Ok(byte) = u8::from_str_radix(&hex[1..], 16) {
                            out.push(byte as char);
                        }
                    }
                    other => {
                        out.push(self.escape_character);
                        out.push_str(other);
                        out.push(self.escape_character);
                    }
                }
            }
            out
        }
    }

    /// One HL7 value at the bottom of the field tree. Subcomponents (HL7's fourth encoding
    /// level) are accessed on demand via [`V2Component::subcomponent`] instead of being
    /// pre-split, since the overwhelming majority of components never use them.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct V2Component {
        value: RUMString,
        subcomponent_separator: char,
    }

    impl V2Component {
        pub fn new(value: RUMString, subcomponent_separator: char) -> V2Component {
            V2Component {
                value,
                subcomponent_separator,
            }
        }

        pub fn as_str(&self) -> &str {
            self.value.as_str()
        }

        pub fn is_empty(&self) -> bool {
            self.value.is_empty()
        }

        /// 1-based access into this component's `&`-delimited subcomponents.
        pub fn subcomponent(&self, index: isize) -> RUMResult<&str> {
            let parts: Vec<&str> = self.value.split(self.subcomponent_separator).collect();
            let i = clamp_index(&index, &(parts.len() as isize))?;
            Ok(parts[i - 1])
        }
    }

    /// One occurrence of a repeating field: an ordered list of components.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct V2Repetition {
        components: Vec<V2Component>,
    }

    impl V2Repetition {
        /// 1-based/negative-index access per [`clamp_index`].
        pub fn get(&self, index: isize) -> RUMResult<&V2Component> {
            let i = clamp_index(&index, &(self.components.len() as isize))?;
            Ok(&self.components[i - 1])
        }

        pub fn len(&self) -> usize {
            self.components.len()
        }

        pub fn is_empty(&self) -> bool {
            self.components.is_empty()
        }

        pub fn as_str(&self) -> &str {
            self.components.first().map(V2Component::as_str).unwrap_or("")
        }
    }

    /// One HL7 field slot, possibly repeating (components separated by `~`).
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct V2Field {
        repetitions: Vec<V2Repetition>,
    }

    impl V2Field {
        /// Builds a field that is never split into components/repetitions, used for MSH-2
        /// (the encoding-characters field), which defines the very delimiters it would
        /// otherwise be split on.
        pub fn singleton(raw: &str) -> V2Field {
            V2Field {
                repetitions: vec![V2Repetition {
                    components: vec![V2Component::new(RUMString::from(raw), '&')],
                }],
            }
        }

        pub fn from_str(raw: &str, parse_chars: &V2ParseCharacters) -> V2Field {
            let repetitions = raw
                .split(parse_chars.repetition_separator)
                .map(|rep| V2Repetition {
                    components: rep
                        .split(parse_chars.component_separator)
                        .map(|component| {
                            V2Component::new(
                                parse_chars.decode_escapes(component),
                                parse_chars.subcomponent_separator,
                            )
                        })
                        .collect(),
                })
                .collect();
            V2Field { repetitions }
        }

        /// 1-based/negative-index access to a repetition, per [`clamp_index`].
        pub fn repetition(&self, index: isize) -> RUMResult<&V2Repetition> {
            let i = clamp_index(&index, &(self.repetitions.len() as isize))?;
            Ok(&self.repetitions[i - 1])
        }

        /// Shorthand for `repetition(1)?.get(component_index)`, the common case of a
        /// non-repeating field.
        pub fn get(&self, component_index: isize) -> RUMResult<&V2Component> {
            self.repetition(1)?.get(component_index)
        }

        pub fn repetition_count(&self) -> usize {
            self.repetitions.len()
        }

        pub fn is_repeating(&self) -> bool {
            self.repetitions.len() > 1
        }

        pub fn as_str(&self) -> &str {
            self.repetitions.first().map(V2Repetition::as_str).unwrap_or("")
        }
    }

    /// One parsed segment occurrence. `fields[0]` is always the segment's 3-letter name;
    /// `fields[n]` (n >= 1) is HL7 field n, matching the wire's own 1-based numbering, so
    /// `segment.get(5)` on a PID segment is PID-5 with no off-by-one bookkeeping at call sites.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct V2Segment {
        pub name: RUMString,
        pub description: RUMString,
        fields: Vec<V2Field>,
    }

    impl V2Segment {
        pub fn from_tokens(tokens: &[&str], parse_chars: &V2ParseCharacters) -> RUMResult<V2Segment> {
            if tokens.is_empty() {
                return Err(GatewayError::parse("Empty segment has no name field", 0, 0));
            }
            let name = RUMString::from(tokens[0].to_uppercase().as_str());
            let is_msh = name == MSHEADER_PATTERN;
            let mut fields = Vec::with_capacity(tokens.len() + if is_msh { 1 } else { 0 });
            fields.push(V2Field::singleton(tokens[0]));
            if is_msh {
                // MSH-1 is the field separator character itself. It is consumed as the
                // delimiter `split` runs on rather than ever appearing as its own token, so
                // without this it would be silently skipped and every later MSH-N would read
                // one token ahead of itself (MSH-9 returning MSH-10's value, and so on).
                let separator = parse_chars.field_separator.to_string();
                fields.push(V2Field::singleton(&separator));
            }
            for (i, token) in tokens.iter().enumerate().skip(1) {
                if is_msh && i == 1 {
                    // MSH-2: the encoding characters field defines the very delimiters
                    // that would otherwise be used to split it.
                    fields.push(V2Field::singleton(token));
                } else {
                    fields.push(V2Field::from_str(token, parse_chars));
                }
            }
            let description = RUMString::from(segment_description(&name));
            Ok(V2Segment {
                name,
                description,
                fields,
            })
        }

        /// 1-based HL7 field access (MSH-1, the literal separator byte, is not addressable
        /// this way since it never appears as a token); negative indices count from the end.
        pub fn get(&self, field_number: isize) -> RUMResult<&V2Field> {
            let max = (self.fields.len() as isize) - 1;
            let i = clamp_index(&field_number, &max)?;
            Ok(&self.fields[i])
        }

        pub fn field_count(&self) -> usize {
            self.fields.len().saturating_sub(1)
        }
    }

    pub type V2SegmentGroup = Vec<V2Segment>;
    pub type SegmentMap = HashMap<RUMString, V2SegmentGroup>;

    /// A fully parsed HL7 v2.x message: every segment, grouped by segment name in the
    /// order they were encountered on the wire.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct V2Message {
        pub separators: V2ParseCharacters,
        segment_groups: SegmentMap,
        segment_order: Vec<RUMString>,
    }

    impl V2Message {
        /// Normalizes line endings: bare `\n` and `\r\n` both become the standard's lone
        /// `\r` segment terminator, and repeated terminators collapse to one so a message
        /// copy/pasted with extra blank lines still parses.
        pub fn sanitize(raw: &str) -> RUMString {
            let mut out = RUMString::with_capacity(raw.len());
            let mut chars = raw.chars().peekable();
            let mut last_was_terminator = false;
            while let Some(c) = chars.next() {
                match c {
                    '\r' => {
                        if chars.peek() == Some(&'\n') {
                            chars.next();
                        }
                        if !last_was_terminator {
                            out.push('\r');
                        }
                        last_was_terminator = true;
                    }
                    '\n' => {
                        if !last_was_terminator {
                            out.push('\r');
                        }
                        last_was_terminator = true;
                    }
                    other => {
                        out.push(other);
                        last_was_terminator = false;
                    }
                }
            }
            RUMString::from(out.trim())
        }

        pub fn tokenize_segments(sanitized: &str) -> Vec<&str> {
            sanitized
                .split(V2_SEGMENT_TERMINATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        }

        /// Messages are permitted to carry other header segments (FHS/BHS batch wrappers)
        /// ahead of MSH, so this scans rather than assuming `tokens[0]`.
        pub fn find_msh<'a>(tokens: &[&'a str]) -> RUMResult<&'a str> {
            tokens
                .iter()
                .copied()
                .find(|t| V2ParseCharacters::is_msh(t))
                .ok_or_else(|| GatewayError::parse("No MSH segment found in message", 0, 0))
        }

        pub fn extract_segments(
            tokens: &[&str],
            parse_chars: &V2ParseCharacters,
        ) -> RUMResult<(SegmentMap, Vec<RUMString>)> {
            let mut segments: SegmentMap = SegmentMap::new();
            let mut order = Vec::with_capacity(tokens.len());
            for (segment_index, raw_segment) in tokens.iter().enumerate() {
                let field_tokens: Vec<&str> =
                    raw_segment.split(parse_chars.field_separator).collect();
                let segment = V2Segment::from_tokens(&field_tokens, parse_chars).map_err(|e| {
                    GatewayError::parse(e.context().to_string(), 0, segment_index)
                })?;
                if !segments.contains_key(&segment.name) {
                    order.push(segment.name.clone());
                }
                segments
                    .entry(segment.name.clone())
                    .or_insert_with(V2SegmentGroup::new)
                    .push(segment);
            }
            Ok((segments, order))
        }

        pub fn from_str(raw_msg: &str) -> RUMResult<V2Message> {
            let sanitized = V2Message::sanitize(raw_msg);
            let tokens = V2Message::tokenize_segments(&sanitized);
            let msh = V2Message::find_msh(&tokens)?;
            let separators = V2ParseCharacters::from_msh(msh)?;
            let (segment_groups, segment_order) = V2Message::extract_segments(&tokens, &separators)?;
            Ok(V2Message {
                separators,
                segment_groups,
                segment_order,
            })
        }

        /// Number of distinct segment types present (not total segment occurrences).
        pub fn len(&self) -> usize {
            self.segment_groups.len()
        }

        pub fn is_empty(&self) -> bool {
            self.segment_groups.is_empty()
        }

        pub fn segment_exists(&self, segment_name: &str) -> bool {
            self.segment_groups
                .get(segment_name)
                .map(|g| !g.is_empty())
                .unwrap_or(false)
        }

        pub fn is_repeat_segment(&self, segment_name: &str) -> bool {
            self.segment_groups
                .get(segment_name)
                .map(|g| g.len() > 1)
                .unwrap_or(false)
        }

        /// Every occurrence of `segment_name`, in wire order.
        pub fn find_segment(&self, segment_name: &str) -> Option<&V2SegmentGroup> {
            self.segment_groups.get(segment_name)
        }

        /// 1-based/negative-index access to one occurrence of a (possibly repeating)
        /// segment, e.g. `message.get("OBX", 2)` for the second OBX.
        pub fn get(&self, segment_name: &str, occurrence: isize) -> RUMResult<&V2Segment> {
            let group = self.segment_groups.get(segment_name).ok_or_else(|| {
                GatewayError::validation(format!("Segment {} is not present", segment_name))
            })?;
            let i = clamp_index(&occurrence, &(group.len() as isize))?;
            Ok(&group[i - 1])
        }

        /// Segment names in the order they first appeared on the wire.
        pub fn segment_order(&self) -> &[RUMString] {
            &self.segment_order
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const SAMPLE_MESSAGE: &str =
            "MSH|^~\\&|ADT1|GOOD HEALTH HOSPITAL|GHH LAB, INC.|GOOD HEALTH HOSPITAL|198808181126|SECURITY|ADT^A01^ADT_A01|MSG00001|P|2.8\r\
             EVN|A01|200708181123\r\
             PID|1||PATID1234^5^M11^ADT1^MR^GOOD HEALTH HOSPITAL~123456789^^^USSSA^SS||EVERYMAN^ADAM^A^III||19610615|M\r\
             PV1|1|I|2000^2012^01||||004777^ATTEND^AARON^A|||SUR||||ADM|A0";

        #[test]
        fn test_sanitize_collapses_line_endings() {
            let raw = "MSH|a\r\nPID|b\n\nOBX|c";
            let sanitized = V2Message::sanitize(raw);
            assert!(!sanitized.contains('\n'));
            assert!(!sanitized.contains("\r\r"));
        }

        #[test]
        fn test_from_msh_discovers_delimiters() {
            let chars = V2ParseCharacters::from_msh("MSH|^~\\&|SRC").unwrap();
            assert_eq!(chars.field_separator, '|');
            assert_eq!(chars.component_separator, '^');
            assert_eq!(chars.repetition_separator, '~');
            assert_eq!(chars.escape_character, '\\');
            assert_eq!(chars.subcomponent_separator, '&');
        }

        #[test]
        fn test_from_msh_rejects_non_msh() {
            assert!(V2ParseCharacters::from_msh("PID|a|b").is_err());
        }

        #[test]
        fn test_parse_message_finds_all_segments() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            assert!(message.segment_exists("MSH"));
            assert!(message.segment_exists("EVN"));
            assert!(message.segment_exists("PID"));
            assert!(message.segment_exists("PV1"));
            assert_eq!(message.len(), 4);
        }

        #[test]
        fn test_field_access_by_hl7_number() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            let pid = message.get("PID", 1).unwrap();
            let name = pid.get(5).unwrap();
            assert_eq!(name.get(1).unwrap().as_str(), "EVERYMAN");
            assert_eq!(name.get(2).unwrap().as_str(), "ADAM");
        }

        #[test]
        fn test_repeating_field() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            let pid = message.get("PID", 1).unwrap();
            let identifiers = pid.get(3).unwrap();
            assert!(identifiers.is_repeating());
            assert_eq!(identifiers.repetition_count(), 2);
            assert_eq!(
                identifiers.repetition(2).unwrap().get(1).unwrap().as_str(),
                "123456789"
            );
        }

        #[test]
        fn test_negative_index_from_end() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            let pv1 = message.get("PV1", -1).unwrap();
            assert_eq!(pv1.name.as_str(), "PV1");
        }

        #[test]
        fn test_escape_decoding() {
            let parse_chars = V2ParseCharacters::new();
            let field = V2Field::from_str(r"5\F\6", &parse_chars);
            assert_eq!(field.get(1).unwrap().as_str(), "5|6");
        }

        #[test]
        fn test_msh_field_numbers_match_true_hl7_numbering() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            let msh = message.get("MSH", 1).unwrap();
            assert_eq!(msh.get(3).unwrap().as_str(), "ADT1");
            assert_eq!(msh.get(4).unwrap().as_str(), "GOOD HEALTH HOSPITAL");
            assert_eq!(msh.get(9).unwrap().get(1).unwrap().as_str(), "ADT");
            assert_eq!(msh.get(9).unwrap().get(2).unwrap().as_str(), "A01");
            assert_eq!(msh.get(10).unwrap().as_str(), "MSG00001");
            assert_eq!(msh.get(12).unwrap().as_str(), "2.8");
        }

        #[test]
        fn test_missing_segment_is_error() {
            let message = V2Message::from_str(SAMPLE_MESSAGE).unwrap();
            assert!(message.get("ZZZ", 1).is_err());
        }

        #[test]
        fn test_batch_header_before_msh() {
            let raw = "FHS|^~\\&\rMSH|^~\\&|A|B|C|D|20200101\rPID|1";
            let message = V2Message::from_str(raw).unwrap();
            assert!(message.segment_exists("FHS"));
            assert!(message.segment_exists("MSH"));
        }
    }
}
