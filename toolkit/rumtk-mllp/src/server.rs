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

use crate::constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_FRAME_BYTES, DEFAULT_SHUTDOWN_GRACE_SECS,
};
use crate::session::{run_session, SessionContext, SessionHandler};
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::strings::{format_compact, RUMString};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

///
/// Listens on a TCP address and spawns one session task per accepted connection, each running
/// `handler` against its own stream until the peer disconnects, the session idles out, or
/// shutdown is requested. One accepted connection never blocks another from being accepted.
///
pub struct MllpServer<H: SessionHandler> {
    listener: TcpListener,
    handler: H,
    idle_timeout: Duration,
    max_frame_bytes: usize,
    shutdown_grace: Duration,
}

///
/// A handle to a running server: `shutdown()` tells every in-flight session to stop accepting
/// new frames, and `join()` waits for the accept loop and all sessions to actually finish (up to
/// `shutdown_grace`, after which outstanding sessions are abandoned rather than awaited forever).
///
pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) {
        let _ = self.accept_task.await;
    }
}

impl<H: SessionHandler> MllpServer<H> {
    pub async fn bind(addr: &str, handler: H) -> RUMResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::transport(format_compact!("{}", e), addr))?;
        Ok(MllpServer {
            listener,
            handler,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        })
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> RUMResult<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| GatewayError::transport(format_compact!("{}", e), "local listener"))
    }

    /// Runs the accept loop on a spawned task and returns immediately with a [ServerHandle] the
    /// caller uses to request shutdown and wait for drain.
    pub fn serve(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            self.listener,
            self.handler,
            self.idle_timeout,
            self.max_frame_bytes,
            self.shutdown_grace,
            shutdown_rx,
        ));
        ServerHandle {
            shutdown_tx,
            accept_task,
        }
    }
}

async fn accept_loop<H: SessionHandler>(
    listener: TcpListener,
    handler: H,
    idle_timeout: Duration,
    max_frame_bytes: usize,
    shutdown_grace: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sessions = tokio::task::JoinSet::new();
    let mut next_session_id: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "mllp server failed to accept a connection");
                        continue;
                    }
                };
                next_session_id += 1;
                let ctx = SessionContext::new(
                    format_compact!("session-{}", next_session_id),
                    RUMString::from(peer_addr.to_string().as_str()),
                );
                let handler = handler.clone();
                let session_shutdown = shutdown_rx.clone();
                tracing::info!(session_id = %ctx.session_id, peer = %ctx.peer_addr, "mllp session accepted");
                sessions.spawn(async move {
                    let session_id = ctx.session_id.clone();
                    if let Err(e) =
                        run_session(stream, ctx, handler, idle_timeout, max_frame_bytes, session_shutdown).await
                    {
                        tracing::warn!(session_id = %session_id, error = %e, "mllp session ended with an error");
                    }
                });
            }
        }
    }

    tracing::info!(sessions = sessions.len(), "mllp server draining in-flight sessions");
    let _ = tokio::time::timeout(shutdown_grace, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_server_echoes_a_framed_message() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter_for_handler = counter.clone();
        let handler = move |payload: Vec<u8>, _ctx: &SessionContext| {
            let counter = counter_for_handler.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(payload))
            }
        };

        let server = MllpServer::bind("127.0.0.1:0", handler)
            .await
            .unwrap()
            .with_idle_timeout(Duration::from_millis(200));
        let addr = server.local_addr().unwrap();
        let handle = server.serve();

        let mut client = crate::client::MllpClient::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let response = client.send_and_receive(b"MSH|test").await.unwrap();
        assert_eq!(response, b"MSH|test");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting_new_connections() {
        let handler = |payload: Vec<u8>, _ctx: &SessionContext| async move { Ok(Some(payload)) };
        let server = MllpServer::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.serve();
        handle.shutdown();
        handle.join().await;

        let connect_result =
            tokio::time::timeout(Duration::from_millis(200), tokio::net::TcpStream::connect(addr)).await;
        match connect_result {
            Ok(Ok(_)) => panic!("server accepted a connection after shutdown"),
            _ => {}
        }
    }
}
