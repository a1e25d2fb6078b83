/*
 *     rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 *     This toolkit aims to be reliable, simple, performant, and standards compliant.
 *     Copyright (C) 2025  Luis M. Santos, M.D.
 *
 *     This program is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU General Public License as published by
 *     the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     This program is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU General Public License for more details.
 *
 *     You should have received a copy of the GNU General Public License
 *     along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Thin gateway binary: locates a config file, wires up the workflow crate's stores/router/queue
//! around an inbound MLLP server, and runs until a shutdown signal arrives. Routing rules and
//! retry policy live entirely in the config file (`rumtk_workflow::config::GatewayConfig`) -- this
//! binary only parses the handful of flags needed to find that file or override it for a manual
//! run (§10 of the spec: no routing/retry parsing on the CLI surface).

use clap::Parser;
use rumtk_core::core::{GatewayError, RUMResult};
use rumtk_core::log::{init_logging, LogFormat};
use rumtk_core::strings::RUMString;
use rumtk_mllp::MllpServer;
use rumtk_workflow::config::config::GatewayConfig;
use rumtk_workflow::mpps::mpps::{InMemoryMppsStore, MppsHandler, MppsStore, SqliteMppsStore};
use rumtk_workflow::mwl::mwl::{InMemoryMwlStore, MwlStore, SqliteMwlStore};
use rumtk_workflow::patient_cache::patient_cache::PatientCache;
use rumtk_workflow::registry::registry::{GatewayInboundHandler, HandlerContext, HandlerRegistry};
use rumtk_workflow::router::router::{Destination, OutboundRouter};
use rumtk_workflow::sender::sender::{QueueWorkerPool, ReliableSender};
use rumtk_workflow::workflow::workflow::MppsWorkflow;
use rumtk_core::queue::queue::{InMemoryQueueStore, QueueStore};
use rumtk_workflow::queue_store::queue_store::SqliteQueueStore;
use std::sync::Arc;
use std::time::Duration;

///
/// RUMTK HL7 v2 <-> DICOM MWL/MPPS gateway.
///
/// Reads a YAML config describing inbound bind address, outbound destinations/failover groups,
/// retry policy, and storage backends, then runs the MLLP server and queue worker pool until
/// asked to stop.
///
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct RUMTKInterfaceArgs {
    /// Path to the gateway's YAML configuration file.
    #[arg(short, long, default_value = "rumtk-gateway.yaml")]
    config: RUMString,
    /// Override the inbound bind address from the config file, e.g. for a manual smoke test.
    #[arg(short, long)]
    port: Option<u16>,
    /// Bind to loopback only, overriding whatever host the config/`--port` would otherwise use.
    #[arg(short, long, default_value_t = false)]
    local: bool,
    /// Log as single-line JSON instead of the human-readable default.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn load_config(path: &str) -> RUMResult<GatewayConfig> {
    let bytes = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::FatalInit { context: RUMString::from(format!("reading config file \"{}\": {}", path, e).as_str()) })?;
    let config: GatewayConfig = serde_yaml::from_str(&bytes)
        .map_err(|e| GatewayError::FatalInit { context: RUMString::from(format!("parsing config file \"{}\": {}", path, e).as_str()) })?;
    config.validate()?;
    Ok(config)
}

fn build_mwl_store(backend: &str) -> RUMResult<Arc<dyn MwlStore>> {
    if backend == "memory" {
        Ok(Arc::new(InMemoryMwlStore::new()))
    } else {
        Ok(Arc::new(SqliteMwlStore::open(backend)?))
    }
}

fn build_queue_store(backend: &str) -> RUMResult<Arc<dyn QueueStore>> {
    if backend == "memory" {
        Ok(Arc::new(InMemoryQueueStore::new()))
    } else {
        Ok(Arc::new(SqliteQueueStore::open(backend)?))
    }
}

fn build_mpps_store(backend: &str) -> RUMResult<Arc<dyn MppsStore>> {
    if backend == "memory" {
        Ok(Arc::new(InMemoryMppsStore::new()))
    } else {
        Ok(Arc::new(SqliteMppsStore::open(backend)?))
    }
}

fn build_router(config: &GatewayConfig) -> RUMResult<Arc<OutboundRouter>> {
    let router = Arc::new(OutboundRouter::new());
    for destination in &config.destinations {
        router.register_destination(Destination {
            id: destination.id.clone(),
            host: destination.host.clone(),
            port: destination.port,
            transport: destination.transport(),
        })?;
    }
    for group in &config.groups {
        router.register_group(group.name.as_str(), group.destinations.clone())?;
    }
    Ok(router)
}

async fn run(args: RUMTKInterfaceArgs) -> RUMResult<()> {
    let mut config = load_config(args.config.as_str())?;
    if let Some(port) = args.port {
        let host = if args.local { "127.0.0.1" } else { "0.0.0.0" };
        config.bind_address = RUMString::from(format!("{}:{}", host, port).as_str());
    }

    tracing::info!(bind_address = %config.bind_address, "starting rumtk gateway");

    let mwl: Arc<dyn MwlStore> = build_mwl_store(config.mwl_backend.as_str())?;
    let patients = Arc::new(PatientCache::default());
    let queue = build_queue_store(config.queue_backend.as_str())?;
    let router = build_router(&config)?;

    let retry_policy = (&config.retry).into();
    let send_timeout = Duration::from_millis(config.send_timeout_ms);
    let sender = Arc::new(
        ReliableSender::new(router.clone(), queue.clone())
            .with_retry_policy(retry_policy)
            .with_send_timeout(send_timeout)
            .with_high_water_mark(config.queue_high_water_mark),
    );

    let queue_workers = QueueWorkerPool::spawn(
        router.clone(),
        queue.clone(),
        (&config.retry).into(),
        send_timeout,
        Duration::from_millis(200),
        Duration::from_secs(30),
        config.claim_grace_ms,
    );

    let mpps_store = build_mpps_store(config.mpps_backend.as_str())?;
    let mpps = Arc::new(MppsHandler::with_store(mpps_store));
    let mpps_rx = mpps.subscribe();
    let workflow = Arc::new(MppsWorkflow::new(
        sender.clone(),
        config.mpps_notification_groups.clone(),
        config.sending_application.clone(),
        config.sending_facility.clone(),
        config.sending_application.clone(),
        config.sending_facility.clone(),
    ));
    let workflow_task = workflow.spawn(mpps_rx);

    // Recover any MPPS records left in-progress across a restart (§4.6). Nothing further is
    // done with them here -- the actual DICOM MPPS SCP that would resume monitoring these
    // procedure steps is an external collaborator outside this gateway's scope.
    match mpps.recover_in_progress() {
        Ok(pending) if !pending.is_empty() => {
            tracing::info!(count = pending.len(), "recovered in-progress MPPS records on startup");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to enumerate in-progress MPPS records on startup"),
    }

    let registry = Arc::new(HandlerRegistry::new());
    let handler_ctx = Arc::new(HandlerContext { mwl, patients });
    let inbound_handler = GatewayInboundHandler::new(
        registry,
        handler_ctx,
        config.sending_application.clone(),
        config.sending_facility.clone(),
    );

    let server = MllpServer::bind(config.bind_address.as_str(), inbound_handler).await?;
    let local_addr = server.local_addr()?;
    let handle = server.serve();
    tracing::info!(addr = %local_addr, "mllp server listening");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight sessions");

    handle.shutdown();
    handle.join().await;
    queue_workers.shutdown().await;
    workflow_task.abort();

    tracing::info!("rumtk gateway stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn main() {
    let args = RUMTKInterfaceArgs::parse();
    let log_format = if args.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_logging(log_format);

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    if let Err(e) = runtime.block_on(run(args)) {
        tracing::error!(error = %e, "fatal error during gateway startup");
        std::process::exit(1);
    }
}
