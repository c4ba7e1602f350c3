// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One task per switch session.
//!
//! The accept loop spawns a session task per connection; each session
//! splits its stream, pushes every outbound message through an
//! unbounded channel drained by a writer task (so packet handling
//! never blocks on socket back-pressure while holding state), and
//! processes inbound messages strictly in arrival order.

use crate::handler;
use crate::installer;
use crate::state::{ControllerState, SwitchHandle};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use openflow::{
    Message, MultipartReplyBody, MultipartRequestBody, OpenFlowCodec, PortDesc, PortStatusReason,
};
use routing::DpId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Accept switch connections forever.
pub async fn run_listener(state: Arc<ControllerState>, listener: TcpListener) -> Result<()> {
    let mut tasks: JoinSet<()> = JoinSet::new();
    loop {
        let (sock, peer) = listener.accept().await.context("accept")?;
        debug!("connection from {peer}");
        let state = Arc::clone(&state);
        tasks.spawn(async move {
            if let Err(e) = run_session(state, sock, peer).await {
                warn!("session {peer}: {e:#}");
            }
        });
        // reap finished sessions (non-blocking)
        while tasks.try_join_next().is_some() {}
    }
}

async fn run_session(
    state: Arc<ControllerState>,
    sock: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    if let Err(e) = sock.set_nodelay(true) {
        warn!("could not set TCP_NODELAY for {peer}: {e}");
    }
    let framed = Framed::new(sock, OpenFlowCodec);
    let (mut sink, mut stream) = framed.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                warn!("write to {peer} failed: {e}");
                break;
            }
        }
    });

    let send = |msg: Message| {
        let _ = tx.send(msg);
    };
    send(Message::Hello {
        xid: state.next_xid(),
    });
    send(Message::FeaturesRequest {
        xid: state.next_xid(),
    });

    let mut datapath: Option<DpId> = None;
    let result = loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break Err(e).context("decode"),
            None => break Ok(()),
        };
        match msg {
            Message::Hello { .. } => {}
            Message::EchoRequest { xid, data } => send(Message::EchoReply { xid, data }),
            Message::EchoReply { .. } => {}
            Message::FeaturesReply { features, .. } => {
                let dp = features.datapath_id;
                datapath = Some(dp);
                register_switch(&state, dp, tx.clone());
                // the 1.3 features reply has no port list; ask for it
                send(Message::MultipartRequest {
                    xid: state.next_xid(),
                    body: MultipartRequestBody::PortDesc,
                });
                info!(
                    "switch {dp:#x} connected from {peer} ({} buffers, {} tables)",
                    features.n_buffers, features.n_tables
                );
            }
            Message::PacketIn { packet_in, .. } => {
                let Some(dp) = datapath else {
                    trace!("packet-in before features reply, dropped");
                    continue;
                };
                handler::handle_packet_in(&state, dp, &packet_in);
            }
            Message::PortStatus { reason, desc, .. } => {
                if let Some(dp) = datapath {
                    port_status(&state, dp, reason, desc);
                }
            }
            Message::MultipartReply { reply, .. } => {
                if let Some(dp) = datapath {
                    multipart_reply(&state, dp, reply.body);
                }
            }
            Message::Error {
                err_type, code, ..
            } => {
                warn!(
                    "switch {:#x} reports error type {err_type} code {code}",
                    datapath.unwrap_or(0)
                );
            }
            Message::Other { raw_type, .. } => {
                trace!("ignoring message type {raw_type}");
            }
            // only ever controller → switch
            Message::FeaturesRequest { .. }
            | Message::PacketOut { .. }
            | Message::FlowMod { .. }
            | Message::MultipartRequest { .. } => {
                trace!("ignoring controller-side message from switch");
            }
        }
    };

    if let Some(dp) = datapath {
        state.forget_switch(dp);
    }
    drop(tx);
    writer.abort();
    result
}

fn register_switch(state: &ControllerState, dp: DpId, tx: mpsc::UnboundedSender<Message>) {
    state
        .switches
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(dp, SwitchHandle::new(tx));
    state
        .topology
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .add_switch(dp);
    installer::install_table_miss(state, dp);
}

fn port_status(state: &ControllerState, dp: DpId, reason: PortStatusReason, desc: PortDesc) {
    let port = desc.port_no;
    let gone = reason == PortStatusReason::Delete || !desc.is_up();
    debug!("switch {dp:#x}: port {port} status {reason:?} (up: {})", desc.is_up());

    {
        let mut switches = state.switches.write().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = switches.get_mut(&dp) {
            if reason == PortStatusReason::Delete {
                handle.ports.remove(&port);
            } else {
                handle.ports.insert(port, desc.clone());
            }
        }
    }

    if gone {
        state
            .topology
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_port(dp, port);
        state
            .macs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate_port(dp, port);
        state
            .energy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove_port(dp, port);
    } else if desc.is_data_port() {
        state
            .energy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .register_port(dp, port);
    }
}

fn multipart_reply(state: &ControllerState, dp: DpId, body: MultipartReplyBody) {
    match body {
        MultipartReplyBody::PortDesc(ports) => {
            {
                let mut energy = state.energy.lock().unwrap_or_else(|e| e.into_inner());
                for desc in ports.iter().filter(|d| d.is_data_port()) {
                    energy.register_port(dp, desc.port_no);
                }
            }
            let count = ports.len();
            let mut switches = state.switches.write().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = switches.get_mut(&dp) {
                for desc in ports {
                    handle.ports.insert(desc.port_no, desc);
                }
            }
            debug!("switch {dp:#x}: {count} ports described");
        }
        MultipartReplyBody::PortStats(entries) => {
            {
                // reserved ports (LOCAL and friends) are not energy-modelled
                let mut energy = state.energy.lock().unwrap_or_else(|e| e.into_inner());
                for entry in entries
                    .iter()
                    .filter(|e| e.port_no <= openflow::port_no::MAX)
                {
                    energy.observe_port(dp, entry.port_no, entry.tx_bytes);
                }
            }
            state
                .stats
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .record_port_stats(dp, entries);
        }
        MultipartReplyBody::FlowStats(entries) => {
            state
                .stats
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .record_flow_stats(dp, entries);
        }
        MultipartReplyBody::Other { mp_type } => {
            trace!("switch {dp:#x}: ignoring multipart type {mp_type}");
        }
    }
}
