// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The controller's periodic tasks: statistics polling, energy
//! accounting, link-load decay and MAC aging, and the optional
//! periodic flow reset.

use crate::discovery;
use crate::installer;
use crate::state::ControllerState;
use openflow::{
    FlowStatsRequest, Message, MultipartRequestBody, PortStatsRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stats::EnergyLog;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[allow(unused)]
use tracing::{debug, info, warn};

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Request flow and port statistics from every switch, forever.
pub async fn stats_poll_task(state: Arc<ControllerState>) {
    let mut ticker = interval(state.config.stats_poll_interval());
    loop {
        ticker.tick().await;
        for dp in state.switch_ids() {
            state.send(
                dp,
                Message::MultipartRequest {
                    xid: state.next_xid(),
                    body: MultipartRequestBody::FlowStats(FlowStatsRequest::default()),
                },
            );
            state.send(
                dp,
                Message::MultipartRequest {
                    xid: state.next_xid(),
                    body: MultipartRequestBody::PortStats(PortStatsRequest::default()),
                },
            );
        }
    }
}

/// Take one energy sample per tick, flush rows out periodically and a
/// final time at shutdown.
pub async fn energy_task(state: Arc<ControllerState>, shutdown: CancellationToken) {
    let tick_len = state.config.energy_poll_interval();
    let flush_every = state
        .config
        .energy_flush_interval()
        .as_secs()
        .div_ceil(tick_len.as_secs().max(1))
        .max(1);
    let log = EnergyLog::new(&state.config.energy_csv_path);
    let mut buffer = Vec::new();
    let mut ticker = interval(tick_len);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = {
                    let mut energy = state.energy.lock().unwrap_or_else(|e| e.into_inner());
                    energy.tick(tick_len)
                };
                buffer.push(sample);
                if buffer.len() as u64 >= flush_every {
                    flush(&log, &mut buffer);
                }
            }
            () = shutdown.cancelled() => {
                flush(&log, &mut buffer);
                return;
            }
        }
    }
}

fn flush(log: &EnergyLog, buffer: &mut Vec<stats::EnergySample>) {
    if let Err(e) = log.append(buffer) {
        warn!("energy log write failed: {e}");
    }
    buffer.clear();
}

/// Decay link loads and age out idle MAC entries once a second.
pub async fn decay_task(state: Arc<ControllerState>) {
    let tau = state.config.decay_time_constant();
    let max_age = state.config.mac_age();
    let mut ticker = interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let now = Instant::now();
        {
            let mut topology = state.topology.write().unwrap_or_else(|e| e.into_inner());
            topology.decay(now, tau);
        }
        let aged = {
            let mut macs = state.macs.write().unwrap_or_else(|e| e.into_inner());
            macs.age(now, max_age)
        };
        if aged > 0 {
            debug!("aged out {aged} idle mac entries");
        }
    }
}

/// Inject LLDP announcements and, once past the grace period with no
/// links discovered, load the static fallback.
pub async fn discovery_task(state: Arc<ControllerState>) {
    let grace = state.config.discovery_grace();
    let started = Instant::now();
    let mut ticker = interval(discovery::LLDP_INTERVAL);
    loop {
        ticker.tick().await;
        discovery::emit_announcements(&state);
        if started.elapsed() >= grace {
            discovery::apply_fallback_if_needed(&state);
        }
    }
}

/// Periodically wipe flow tables so routes re-form under current
/// loads; only runs when configured.
pub async fn flow_reset_task(state: Arc<ControllerState>, period: Duration) {
    let mut ticker = interval(period);
    ticker.tick().await; // the immediate first tick would wipe at startup
    loop {
        ticker.tick().await;
        info!("periodic flow reset");
        installer::reset_all(&state);
    }
}
