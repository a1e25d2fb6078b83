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

/// Start Block character (1 byte). ASCII <VT>, i.e., 0x0B.
pub const SB: u8 = 0x0b;
/// End Block character (1 byte). ASCII <FS>, i.e., 0x1C.
pub const EB: u8 = 0x1c;
/// Carriage Return (1 byte). ASCII <CR>, i.e., 0x0D.
pub const CR: u8 = 0x0d;
/// Affirmative commit acknowledgement byte used by some enhanced-mode deployments.
pub const ACK: u8 = 0x06;
/// Negative commit acknowledgement byte used by some enhanced-mode deployments.
pub const NAK: u8 = 0x15;

/// Default cap on a single frame's payload size. Chosen generously above a typical HL7 message;
/// sessions that exceed this are almost always mis-framed rather than legitimately large.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Default idle timeout for a session that has sent or received nothing.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default time a client waits for the single response frame to a sent message.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Default grace period the server gives in-flight frames during a graceful shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Size of the chunks we attempt to read off the wire at a time while assembling a frame.
pub const READ_CHUNK_BYTES: usize = 8192;
