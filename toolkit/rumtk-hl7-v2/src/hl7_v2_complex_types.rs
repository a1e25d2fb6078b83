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

///
/// Casts raw component text into the HL7 primitive types a field descriptor declares,
/// independent of the parser's tree types (`rumtk-hl7-v2/src/hl7_v2_parser.rs` converts
/// `V2Component`s to `&str` before handing them here).
///
pub mod hl7_v2_complex_types {
    use crate::hl7_v2_base_types::v2_base_types::V2DateTime;
    use crate::hl7_v2_base_types::v2_primitives::V2PrimitiveType;
    use crate::hl7_v2_field_descriptors::v2_field_descriptor::V2ComponentTypeDescriptor;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;

    /// Maximum length allowed for a FT (formatted text) value before truncation, per the
    /// standard's "arbitrary length (up to 64k)" note, clamped to a sane wire-friendly bound.
    pub const TRUNCATE_FT: u32 = 65536;
    /// ST values are not supposed to be truncated; anything over this is a validation error.
    pub const MAX_ST_LEN: usize = 1000;

    ///
    /// The cast result for a single component, tagged by which primitive type was requested.
    ///
    #[derive(Debug)]
    pub enum V2Type {
        DateTime(RUMResult<V2DateTime>),
        Date(RUMResult<V2DateTime>),
        Time(RUMResult<V2DateTime>),
        Boolean(RUMResult<bool>),
        Integer(RUMResult<i64>),
        Decimal(RUMResult<f64>),
        StringData(RUMResult<RUMString>),
        FormattedText(RUMResult<RUMString>),
        TextData(RUMResult<RUMString>),
    }

    ///
    /// Casts a raw component value according to `descriptor`'s declared primitive type,
    /// enforcing the descriptor's required-ness and max length where applicable.
    ///
    pub fn cast_component(component: &str, descriptor: &V2ComponentTypeDescriptor) -> V2Type {
        if descriptor.required && component.is_empty() {
            let err = Err(GatewayError::validation(format!(
                "Component \"{}\" is required but empty",
                descriptor.name
            )));
            return match descriptor.data_type {
                V2PrimitiveType::DateTime => V2Type::DateTime(err),
                V2PrimitiveType::Date => V2Type::Date(err),
                V2PrimitiveType::Time => V2Type::Time(err),
                V2PrimitiveType::Boolean => V2Type::Boolean(err),
                V2PrimitiveType::Integer => V2Type::Integer(err),
                V2PrimitiveType::Decimal => V2Type::Decimal(err),
                V2PrimitiveType::StringData => V2Type::StringData(err),
                V2PrimitiveType::FormattedText => V2Type::FormattedText(err),
                V2PrimitiveType::TextData => V2Type::TextData(err),
            };
        }

        match descriptor.data_type {
            V2PrimitiveType::DateTime => V2Type::DateTime(component.to_v2datetime()),
            V2PrimitiveType::Date => V2Type::Date(component.to_v2date()),
            V2PrimitiveType::Time => V2Type::Time(component.to_v2time()),
            V2PrimitiveType::Boolean => V2Type::Boolean(component.to_v2boolean()),
            V2PrimitiveType::Integer => V2Type::Integer(component.to_v2integer()),
            V2PrimitiveType::Decimal => V2Type::Decimal(component.to_v2number()),
            V2PrimitiveType::StringData => V2Type::StringData(component.to_v2stringdata()),
            V2PrimitiveType::FormattedText => {
                V2Type::FormattedText(component.to_v2formattedtext("~"))
            }
            V2PrimitiveType::TextData => V2Type::TextData(Ok(RUMString::from(component))),
        }
    }

    ///
    /// Extension trait adding HL7-aware primitive casts to any string slice, so call sites
    /// can write `component.to_v2datetime()?` instead of routing through `cast_component`
    /// when they already know what type they expect.
    ///
    pub trait V2PrimitiveCasting {
        fn to_v2datetime(&self) -> RUMResult<V2DateTime>;
        fn to_v2date(&self) -> RUMResult<V2DateTime>;
        fn to_v2time(&self) -> RUMResult<V2DateTime>;
        fn to_v2boolean(&self) -> RUMResult<bool>;
        fn to_v2integer(&self) -> RUMResult<i64>;
        fn to_v2number(&self) -> RUMResult<f64>;
        fn to_v2stringdata(&self) -> RUMResult<RUMString>;
        fn to_v2formattedtext(&self, repeat_delimiter: &str) -> RUMResult<RUMString>;
    }

    impl V2PrimitiveCasting for str {
        fn to_v2datetime(&self) -> RUMResult<V2DateTime> {
            let digits = self.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits < 4 {
                return Err(GatewayError::validation(format!(
                    "DTM value \"{}\" needs at least a 4 digit year",
                    self
                )));
            }
            Ok(V2DateTime::from_v2_string(&RUMString::from(self)))
        }

        fn to_v2date(&self) -> RUMResult<V2DateTime> {
            self.to_v2datetime()
        }

        fn to_v2time(&self) -> RUMResult<V2DateTime> {
            if self.chars().take_while(|c| c.is_ascii_digit()).count() < 4 {
                return Err(GatewayError::validation(format!(
                    "TM value \"{}\" needs at least hours and minutes",
                    self
                )));
            }
            let padded = format!("19700101{}", self);
            Ok(V2DateTime::from_v2_string(&RUMString::from(padded.as_str())))
        }

        fn to_v2boolean(&self) -> RUMResult<bool> {
            match self {
                "Y" | "y" | "T" | "true" => Ok(true),
                "N" | "n" | "F" | "false" => Ok(false),
                _ => Err(GatewayError::validation(format!(
                    "\"{}\" is not a valid HL7 boolean (expected Y/N)",
                    self
                ))),
            }
        }

        fn to_v2integer(&self) -> RUMResult<i64> {
            self.trim()
                .parse::<i64>()
                .map_err(|e| GatewayError::validation(format!("\"{}\" is not an integer: {}", self, e)))
        }

        fn to_v2number(&self) -> RUMResult<f64> {
            let trimmed = self.trim();
            let stripped = trimmed.strip_suffix(['f', 'F']).unwrap_or(trimmed);
            stripped
                .parse::<f64>()
                .map_err(|e| GatewayError::validation(format!("\"{}\" is not a number: {}", self, e)))
        }

        fn to_v2stringdata(&self) -> RUMResult<RUMString> {
            let trimmed = self.trim_start();
            if trimmed.len() > MAX_ST_LEN {
                return Err(GatewayError::validation(format!(
                    "ST value exceeds the {} character maximum length",
                    MAX_ST_LEN
                )));
            }
            Ok(RUMString::from(trimmed))
        }

        fn to_v2formattedtext(&self, _repeat_delimiter: &str) -> RUMResult<RUMString> {
            if self.len() as u32 > TRUNCATE_FT {
                Ok(RUMString::from(&self[..TRUNCATE_FT as usize]))
            } else {
                Ok(RUMString::from(self))
            }
        }
    }
}
