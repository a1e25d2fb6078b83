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

//! MLLP (Minimal Lower Layer Protocol) framing over an async byte stream.
//!
//! ```text
//! HL7-Content-Block = SB, dddd, EB, CR.
//!     SB = 0x0B, EB = 0x1C, CR = 0x0D.
//! ```
//!
//! The block format is all this crate understands; it has no knowledge of HL7 itself. Higher
//! layers hand it bytes to frame and get framed bytes back out.

pub mod constants;
pub mod transport;
pub mod framing;
pub mod session;
pub mod client;
pub mod server;

pub use client::MllpClient;
pub use constants::*;
pub use server::{MllpServer, ServerHandle};
pub use session::{SessionContext, SessionHandler};
pub use transport::Transport;
