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

use crate::constants::{DEFAULT_MAX_FRAME_BYTES, EB, CR, READ_CHUNK_BYTES, SB};
use crate::transport::Transport;
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::strings::format_compact;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

///
/// Incrementally assembles MLLP frames out of a byte stream. One instance is owned per
/// connection; bytes that arrive ahead of the frame they belong to are held across calls to
/// [FrameReader::read_frame].
///
pub struct FrameReader {
    buf: Vec<u8>,
    max_frame_bytes: usize,
    /// Count of bytes discarded before the first SB of a frame was seen. Exposed for metrics;
    /// a non-zero count on an otherwise healthy session usually means the peer or the network
    /// is injecting noise ahead of the block.
    pub garbage_bytes: u64,
}

impl FrameReader {
    pub fn new(max_frame_bytes: usize) -> Self {
        FrameReader {
            buf: Vec::new(),
            max_frame_bytes,
            garbage_bytes: 0,
        }
    }

    ///
    /// Reads one complete frame's payload (the bytes between SB and the EB,CR terminator) off
    /// `transport`, blocking on reads as needed. Returns `Ok(None)` only when the peer closed the
    /// connection cleanly with no partial frame pending; any other form of connection loss is a
    /// [GatewayError::Framing] so the caller can tell "done" from "broke".
    ///
    pub async fn read_frame<T: Transport>(&mut self, transport: &mut T) -> RUMResult<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(payload) = self.try_extract_frame()? {
                return Ok(Some(payload));
            }

            let n = transport
                .read(&mut chunk)
                .await
                .map_err(|e| GatewayError::Framing {
                    context: format_compact!("socket read failed while assembling frame: {e}"),
                })?;

            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(GatewayError::Framing {
                    context: "connection closed with a partial MLLP frame pending".into(),
                });
            }

            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Attempts to pull one full frame out of whatever has already been buffered, without
    /// touching the transport. Returns `Ok(None)` when more bytes are needed.
    fn try_extract_frame(&mut self) -> RUMResult<Option<Vec<u8>>> {
        let start = match self.buf.iter().position(|&b| b == SB) {
            Some(pos) => pos,
            None => {
                // No start byte buffered at all yet; everything we have so far is garbage.
                if !self.buf.is_empty() {
                    self.garbage_bytes += self.buf.len() as u64;
                    self.buf.clear();
                }
                return Ok(None);
            }
        };

        if start > 0 {
            self.garbage_bytes += start as u64;
        }

        // Look for the EB,CR terminator, and fail fast on an embedded SB before it.
        let mut i = start + 1;
        while i < self.buf.len() {
            if self.buf[i] == SB {
                return Err(GatewayError::Framing {
                    context: "embedded start-of-block byte before terminator; frame abandoned"
                        .into(),
                });
            }
            if self.buf[i] == EB && i + 1 < self.buf.len() && self.buf[i + 1] == CR {
                let payload = self.buf[start + 1..i].to_vec();
                self.buf.drain(..i + 2);
                return Ok(Some(payload));
            }
            if i - start > self.max_frame_bytes {
                return Err(GatewayError::Framing {
                    context: format_compact!(
                        "frame exceeds maximum size of {} bytes",
                        self.max_frame_bytes
                    ),
                });
            }
            i += 1;
        }

        Ok(None)
    }
}

///
/// Writes `payload` as a single MLLP block (`SB payload EB CR`) and flushes it.
///
pub async fn write_frame<T: Transport>(transport: &mut T, payload: &[u8]) -> RUMResult<()> {
    let mut framed = Vec::with_capacity(payload.len() + 3);
    framed.push(SB);
    framed.extend_from_slice(payload);
    framed.push(EB);
    framed.push(CR);
    transport
        .write_all(&framed)
        .await
        .map_err(|e| GatewayError::Framing {
            context: format_compact!("socket write failed while sending frame: {e}"),
        })?;
    transport.flush().await.map_err(|e| GatewayError::Framing {
        context: format_compact!("socket flush failed while sending frame: {e}"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.push(SB);
        v.extend_from_slice(payload);
        v.push(EB);
        v.push(CR);
        v
    }

    #[tokio::test]
    async fn test_read_single_frame() {
        let mut stream = Cursor::new(frame(b"MSH|...|"));
        let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_BYTES);
        let got = reader.read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(got, b"MSH|...|");
    }

    #[tokio::test]
    async fn test_discards_leading_garbage() {
        let mut bytes = b"\x00\x00noise".to_vec();
        bytes.extend(frame(b"hello"));
        let mut stream = Cursor::new(bytes);
        let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_BYTES);
        let got = reader.read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(got, b"hello");
        assert!(reader.garbage_bytes > 0);
    }

    #[tokio::test]
    async fn test_embedded_start_byte_is_framing_error() {
        let mut bytes = vec![SB];
        bytes.extend_from_slice(b"partial");
        bytes.push(SB);
        bytes.extend_from_slice(b"next");
        bytes.push(EB);
        bytes.push(CR);
        let mut stream = Cursor::new(bytes);
        let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_BYTES);
        let err = reader.read_frame(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), rumtk_core::core::ErrorKind::Framing);
    }

    #[tokio::test]
    async fn test_oversize_frame_is_rejected() {
        let mut stream = Cursor::new(frame(&vec![b'x'; 64]));
        let mut reader = FrameReader::new(8);
        let err = reader.read_frame(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), rumtk_core::core::ErrorKind::Framing);
    }

    #[tokio::test]
    async fn test_clean_eof_with_no_pending_frame() {
        let mut stream = Cursor::new(Vec::new());
        let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_BYTES);
        let got = reader.read_frame(&mut stream).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_write_frame_round_trips() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, b"ping").await.unwrap();
        assert_eq!(buf, frame(b"ping"));
    }
}
