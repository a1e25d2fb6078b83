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

pub mod v2_field_descriptor {
    use crate::hl7_v2_base_types::v2_primitives::V2PrimitiveType;
    use ::phf::{phf_map, Map};

    ///
    /// Describes one component slot of a composite HL7 field (e.g. XPN.1 "Family Name").
    /// Tables of these are how the validator (SPEC_FULL §4.3) knows what a message-type's
    /// fields are supposed to look like without hand-writing per-segment validation code.
    ///
    #[derive(Debug, Clone, Copy)]
    pub struct V2ComponentTypeDescriptor {
        pub name: &'static str,
        pub data_type: V2PrimitiveType,
        pub max_input_len: u32,
        pub seq: u16,
        pub valid_table: u16,
        pub required: bool,
        pub truncate: bool,
    }

    impl V2ComponentTypeDescriptor {
        pub const fn new(
            name: &'static str,
            data_type: V2PrimitiveType,
            max_input_len: u32,
            seq: u16,
            valid_table: u16,
            required: bool,
            truncate: bool,
        ) -> V2ComponentTypeDescriptor {
            V2ComponentTypeDescriptor {
                name,
                data_type,
                max_input_len,
                seq,
                valid_table,
                required,
                truncate,
            }
        }
    }

    pub type V2FieldDescriptor = &'static [V2ComponentTypeDescriptor];
    pub type V2FieldDescriptors = Map<&'static str, V2FieldDescriptor>;

    #[macro_export]
    macro_rules! v2_component_descriptor {
        ( $name:expr, $data_type:expr, $max_input_len:expr, $seq:expr, $valid_table:expr, $required:expr, $truncate:expr ) => {
            $crate::hl7_v2_field_descriptors::v2_field_descriptor::V2ComponentTypeDescriptor::new(
                $name,
                $data_type,
                $max_input_len,
                $seq,
                $valid_table,
                $required,
                $truncate,
            )
        };
    }

    /// Composite-datatype component layouts keyed by HL7 data type code. Only the handful
    /// of types the gateway actually validates (name, address, timestamp-bearing fields
    /// used in MWL/MPPS mapping) are populated; unknown codes fall back to single-component
    /// treatment in the validator.
    pub static V2_FIELD_DESCRIPTORS: V2FieldDescriptors = phf_map! {
        "AD" => &[
            v2_component_descriptor!("Street Address", V2PrimitiveType::StringData, 120, 1, 0, false, true),
            v2_component_descriptor!("Other Designation", V2PrimitiveType::StringData, 120, 2, 0, false, true),
            v2_component_descriptor!("City", V2PrimitiveType::StringData, 50, 3, 0, false, true),
            v2_component_descriptor!("State or Province", V2PrimitiveType::StringData, 50, 4, 0, false, true),
            v2_component_descriptor!("Zip or Postal Code", V2PrimitiveType::StringData, 12, 5, 0, false, false),
            v2_component_descriptor!("Country", V2PrimitiveType::StringData, 0, 6, 399, false, false),
            v2_component_descriptor!("Address Type", V2PrimitiveType::StringData, 0, 7, 190, false, false),
            v2_component_descriptor!("Other Geographic Designation", V2PrimitiveType::StringData, 50, 8, 0, false, true),
        ],
        "XPN" => &[
            v2_component_descriptor!("Family Name", V2PrimitiveType::StringData, 194, 1, 0, true, true),
            v2_component_descriptor!("Given Name", V2PrimitiveType::StringData, 30, 2, 0, false, true),
            v2_component_descriptor!("Second and Further Given Names or Initials", V2PrimitiveType::StringData, 30, 3, 0, false, true),
            v2_component_descriptor!("Suffix", V2PrimitiveType::StringData, 20, 4, 0, false, true),
            v2_component_descriptor!("Prefix", V2PrimitiveType::StringData, 20, 5, 0, false, true),
            v2_component_descriptor!("Degree", V2PrimitiveType::StringData, 6, 6, 0, false, true),
            v2_component_descriptor!("Name Type Code", V2PrimitiveType::StringData, 1, 7, 200, false, false),
        ],
        "TS" => &[
            v2_component_descriptor!("Time", V2PrimitiveType::DateTime, 24, 1, 0, true, false),
            v2_component_descriptor!("Degree of Precision", V2PrimitiveType::StringData, 1, 2, 13, false, false),
        ],
    };
}
