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

use crate::constants::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_FRAME_BYTES};
use crate::framing::{write_frame, FrameReader};
use crate::transport::Transport;
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::strings::RUMString;
use std::future::Future;
use std::time::Duration;

///
/// Identity and bookkeeping for one accepted connection, handed to the per-connection callback
/// alongside each inbound frame. Cheap to clone so a handler can stash it for logging/metrics.
///
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: RUMString,
    pub peer_addr: RUMString,
    pub frames_received: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<RUMString>, peer_addr: impl Into<RUMString>) -> Self {
        SessionContext {
            session_id: session_id.into(),
            peer_addr: peer_addr.into(),
            frames_received: 0,
        }
    }
}

///
/// Per-connection message callback. Given an inbound frame's payload and the session it arrived
/// on, produce the response payload to frame back (or `Ok(None)` to send nothing, e.g. while the
/// connection is being drained at shutdown).
///
pub trait SessionHandler: Clone + Send + Sync + 'static {
    fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &SessionContext,
    ) -> impl Future<Output = RUMResult<Option<Vec<u8>>>> + Send;
}

impl<F, Fut> SessionHandler for F
where
    F: Fn(Vec<u8>, &SessionContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RUMResult<Option<Vec<u8>>>> + Send,
{
    fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &SessionContext,
    ) -> impl Future<Output = RUMResult<Option<Vec<u8>>>> + Send {
        self(payload, ctx)
    }
}

///
/// Runs one session to completion: read a frame, invoke `handler`, send its response, repeat,
/// until the peer disconnects cleanly, an idle timeout elapses, or `shutdown` fires.
///
/// A single session processes frames sequentially (HL7/MLLP is request/response per message on
/// a connection) -- there is deliberately no pipelining here.
///
pub async fn run_session<T, H>(
    mut transport: T,
    mut ctx: SessionContext,
    handler: H,
    idle_timeout: Duration,
    max_frame_bytes: usize,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> RUMResult<()>
where
    T: Transport,
    H: SessionHandler,
{
    let mut reader = FrameReader::new(max_frame_bytes);
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
            result = tokio::time::timeout(idle_timeout, reader.read_frame(&mut transport)) => {
                match result {
                    Ok(inner) => inner?,
                    Err(_) => {
                        return Err(GatewayError::Timeout {
                            context: rumtk_core::strings::format_compact!(
                                "session {} idle for more than {:?}",
                                ctx.session_id,
                                idle_timeout
                            ),
                        });
                    }
                }
            }
        };

        let payload = match frame {
            Some(payload) => payload,
            None => return Ok(()),
        };

        ctx.frames_received += 1;
        if let Some(response) = handler.handle(payload, &ctx).await? {
            write_frame(&mut transport, &response).await?;
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        SessionContext::new("", "")
    }
}

pub fn default_idle_timeout() -> Duration {
    Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)
}

pub fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
