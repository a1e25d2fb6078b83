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

//! HL7 v2.x <-> DICOM MPPS/MWL workflow coordination for the RUMTK gateway: worklist and
//! procedure-step storage, bidirectional message mapping, outbound failover routing and
//! reliable delivery, the MPPS-to-HL7 notification coordinator, the patient demographics
//! cache, and the inbound handler registry.

extern crate rumtk_core;
extern crate rumtk_hl7_v2;
extern crate rumtk_mllp;

pub mod config;
pub mod mapper;
pub mod mpps;
pub mod mwl;
pub mod patient_cache;
pub mod registry;
pub mod router;
pub mod sender;
pub mod workflow;
