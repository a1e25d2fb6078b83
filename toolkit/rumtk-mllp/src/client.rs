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

use crate::constants::{DEFAULT_MAX_FRAME_BYTES, DEFAULT_RESPONSE_TIMEOUT_SECS};
use crate::framing::{write_frame, FrameReader};
use crate::transport::Transport;
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::strings::{format_compact, RUMString};
use std::time::Duration;
use tokio::net::TcpStream;

///
/// Connects to a destination, sends one framed payload, and reads exactly one response frame or
/// times out. One [MllpClient] is meant to be reused across a session's worth of request/response
/// pairs against the same destination; it is not a connection pool.
///
pub struct MllpClient<T: Transport = TcpStream> {
    transport: T,
    reader: FrameReader,
    response_timeout: Duration,
    pub destination: RUMString,
}

impl MllpClient<TcpStream> {
    ///
    /// Connects over plain TCP. For TLS, construct the stream yourself and hand it to
    /// [MllpClient::from_transport].
    ///
    pub async fn connect(ip: &str, port: u16) -> RUMResult<Self> {
        let addr = format_compact!("{}:{}", ip, port);
        let stream = TcpStream::connect(addr.as_str())
            .await
            .map_err(|e| GatewayError::transport(format_compact!("{}", e), addr.clone()))?;
        Ok(Self::from_transport(stream, addr))
    }
}

impl<T: Transport> MllpClient<T> {
    pub fn from_transport(transport: T, destination: impl Into<RUMString>) -> Self {
        MllpClient {
            transport,
            reader: FrameReader::new(DEFAULT_MAX_FRAME_BYTES),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            destination: destination.into(),
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.reader = FrameReader::new(max_frame_bytes);
        self
    }

    /// Sends a payload without waiting for a response. Used by fire-and-forget callers; most
    /// interface code wants [MllpClient::send_and_receive] instead.
    pub async fn send(&mut self, payload: &[u8]) -> RUMResult<()> {
        write_frame(&mut self.transport, payload).await
    }

    /// Reads exactly one response frame, bounded by the configured response timeout.
    pub async fn receive(&mut self) -> RUMResult<Vec<u8>> {
        match tokio::time::timeout(
            self.response_timeout,
            self.reader.read_frame(&mut self.transport),
        )
        .await
        {
            Ok(inner) => inner?.ok_or_else(|| {
                GatewayError::transport(
                    "peer closed the connection without sending a response",
                    self.destination.clone(),
                )
            }),
            Err(_) => Err(GatewayError::Timeout {
                context: format_compact!(
                    "no response from {} within {:?}",
                    self.destination,
                    self.response_timeout
                ),
            }),
        }
    }

    /// Sends `payload` and waits for the single response frame, per the MLLP request/response
    /// contract on a connection.
    pub async fn send_and_receive(&mut self, payload: &[u8]) -> RUMResult<Vec<u8>> {
        self.send(payload).await?;
        self.receive().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// In-memory duplex so client tests don't need a real socket.
    struct Duplex {
        inbound: std::io::Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl AsyncRead for Duplex {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inbound).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Duplex {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.outbound.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_send_and_receive_round_trip() {
        let mut response = vec![0x0b];
        response.extend_from_slice(b"MSA|AA|1");
        response.push(0x1c);
        response.push(0x0d);
        let duplex = Duplex {
            inbound: std::io::Cursor::new(response),
            outbound: Vec::new(),
        };
        let mut client = MllpClient::from_transport(duplex, "test-dest");
        let got = client.send_and_receive(b"MSH|...|").await.unwrap();
        assert_eq!(got, b"MSA|AA|1");
        assert_eq!(client.transport.outbound[0], 0x0b);
    }

    #[tokio::test]
    async fn test_receive_times_out_when_peer_silent() {
        let duplex = Duplex {
            inbound: std::io::Cursor::new(Vec::new()),
            outbound: Vec::new(),
        };
        let mut client =
            MllpClient::from_transport(duplex, "test-dest").with_response_timeout(Duration::from_millis(20));
        let err = client.receive().await.unwrap_err();
        assert_eq!(err.kind(), rumtk_core::core::ErrorKind::Timeout);
    }
}
