// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all)]

mod args;
mod discovery;
mod handler;
mod installer;
mod poller;
mod session;
mod state;
#[cfg(test)]
mod testutil;

use crate::args::CmdArgs;
use crate::state::ControllerState;
use anyhow::{Context, Result};
use clap::Parser;
use classify::ClassificationTable;
use config::ControllerConfig;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_classifier(config: &ControllerConfig) -> ClassificationTable {
    let Some(path) = &config.classification_csv_path else {
        info!("no classification csv configured, all flows are UNKNOWN");
        return ClassificationTable::empty();
    };
    match ClassificationTable::load(path) {
        Ok(table) => table,
        Err(e) => {
            // absence of classification data degrades, never kills
            warn!("classification csv unusable ({e}), all flows are UNKNOWN");
            ClassificationTable::empty()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CmdArgs::parse();
    init_tracing(args.tracing());

    let mut config = match args.config() {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(addr) = args.listen_address() {
        config.listen_address = addr;
    }
    if let Some(port) = args.listen_port() {
        config.listen_port = port;
    }

    let classifier = load_classifier(&config);
    info!(
        "classification table: {} flows, weight by {}",
        classifier.len(),
        if config.weight_by_utilization {
            "utilization"
        } else {
            "raw load"
        }
    );

    let bind = (config.listen_address, config.listen_port);
    let state = Arc::new(ControllerState::new(config, classifier));
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}:{}", bind.0, bind.1))?;
    info!("listening for switches on {}:{}", bind.0, bind.1);

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(run_cancellable(
        session::run_listener(Arc::clone(&state), listener),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(cancel_on(
        poller::stats_poll_task(Arc::clone(&state)),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(poller::energy_task(
        Arc::clone(&state),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(cancel_on(
        poller::decay_task(Arc::clone(&state)),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(cancel_on(
        poller::discovery_task(Arc::clone(&state)),
        shutdown.clone(),
    )));
    if let Some(period) = state.config.flow_reset_interval() {
        tasks.push(tokio::spawn(cancel_on(
            poller::flow_reset_task(Arc::clone(&state), period),
            shutdown.clone(),
        )));
    }

    #[cfg(unix)]
    spawn_sighup_reset(Arc::clone(&state), shutdown.clone());

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }

    log_energy_summary(&state);
    Ok(())
}

/// Run a fallible task until completion or shutdown; a task failing on
/// its own takes the process down via the returned error path.
async fn run_cancellable(
    task: impl Future<Output = Result<()>>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        result = task => {
            if let Err(e) = result {
                tracing::error!("task failed: {e:#}");
                shutdown.cancel();
            }
        }
        () = shutdown.cancelled() => {}
    }
}

async fn cancel_on(task: impl Future<Output = ()>, shutdown: CancellationToken) {
    tokio::select! {
        () = task => {}
        () = shutdown.cancelled() => {}
    }
}

#[cfg(unix)]
fn spawn_sighup_reset(state: Arc<ControllerState>, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};
    tokio::spawn(async move {
        let Ok(mut hup) = signal(SignalKind::hangup()) else {
            warn!("SIGHUP handler unavailable");
            return;
        };
        loop {
            tokio::select! {
                received = hup.recv() => {
                    if received.is_none() {
                        return;
                    }
                    info!("SIGHUP: operator-requested flow table reset");
                    installer::reset_all(&state);
                }
                () = shutdown.cancelled() => return,
            }
        }
    });
}

/// Emit the end-of-run energy summary (rows were flushed by the
/// energy task on cancellation).
fn log_energy_summary(state: &ControllerState) {
    let energy = state.energy.lock().unwrap_or_else(|e| e.into_inner());
    match energy.summary() {
        Some(summary) => info!("{summary}"),
        None => info!("no energy measurements taken"),
    }
}
