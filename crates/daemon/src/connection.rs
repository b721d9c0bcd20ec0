// SPDX-License-Identifier: MIT

//! Connection supervisor (C4, spec.md §4.1): dial, authenticate, run the
//! frame-ingest loop, reconnect with constant backoff on any error except
//! auth rejection.

use crate::outbound::LiveConnection;
use crate::router::dispatch_frame;
use futures_util::{SinkExt, StreamExt};
use portacode_handlers::HandlerContext;
use portacode_keypair::Keypair;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

/// The literal confirmation the gateway sends back once it has accepted
/// the public key handed it in the first text frame (spec.md §6).
const AUTH_OK_MARKER: &str = "ok";

/// Exit code reserved for a fatal authentication rejection (spec.md §6):
/// a process supervisor must not respawn on this code.
pub const AUTH_REJECTED_EXIT_CODE: i32 = 86;

/// Process-wide cooperative stop flag, raised by the SIGINT/SIGTERM
/// handler in `main`. Checked at every suspension point in the reconnect
/// loop and the handshake itself (spec.md §4.1: "the handshake must be
/// interruptible by the stop signal").
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the connect -> authenticate -> ingest loop forever, reconnecting
/// on any transport error, until either `stop` is raised or the gateway
/// rejects authentication (in which case the caller should exit the
/// process with [`AUTH_REJECTED_EXIT_CODE`]).
pub async fn run_connection_supervisor(
    gateway_url: &str,
    reconnect_delay: Duration,
    keypair: &Keypair,
    ctx: Arc<HandlerContext>,
    live: Arc<LiveConnection>,
    stop: StopSignal,
) -> Result<(), crate::error::DaemonError> {
    while !stop.is_raised() {
        match run_once(gateway_url, keypair, Arc::clone(&ctx), Arc::clone(&live), &stop).await {
            Ok(()) => {
                info!("gateway connection closed cleanly");
            }
            Err(crate::error::DaemonError::AuthRejected(reason)) => {
                error!(reason = %reason, "gateway rejected authentication, exiting");
                return Err(crate::error::DaemonError::AuthRejected(reason));
            }
            Err(e) => {
                warn!(error = %e, "gateway connection failed, retrying");
            }
        }

        if stop.is_raised() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = wait_for_stop(&stop) => {}
        }
    }
    info!("connection supervisor stopping");
    Ok(())
}

async fn wait_for_stop(stop: &StopSignal) {
    while !stop.is_raised() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn run_once(
    gateway_url: &str,
    keypair: &Keypair,
    ctx: Arc<HandlerContext>,
    live: Arc<LiveConnection>,
    stop: &StopSignal,
) -> Result<(), crate::error::DaemonError> {
    let dial = tokio::select! {
        dial = tokio_tungstenite::connect_async(gateway_url) => dial,
        _ = wait_for_stop(stop) => return Ok(()),
    };
    let (ws_stream, _response) = dial?;
    info!(url = gateway_url, "dialed gateway");

    let (mut write, mut read) = ws_stream.split();

    tokio::select! {
        sent = write.send(Message::Text(keypair.public_key_pem().to_string().into())) => sent?,
        _ = wait_for_stop(stop) => return Ok(()),
    };

    let reply = tokio::select! {
        frame = read.next() => frame,
        _ = wait_for_stop(stop) => return Ok(()),
    };
    match reply {
        Some(Ok(Message::Text(text))) if text.trim() == AUTH_OK_MARKER => {
            info!("authenticated with gateway");
        }
        Some(Ok(Message::Text(text))) => {
            return Err(crate::error::DaemonError::AuthRejected(text.to_string()));
        }
        Some(Ok(other)) => {
            return Err(crate::error::DaemonError::AuthRejected(format!("unexpected handshake frame: {other:?}")));
        }
        Some(Err(e)) => return Err(e.into()),
        None => return Err(crate::error::DaemonError::ConnectionClosed),
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
    live.install(outbound_tx.clone());
    ctx.automation.set_event_sink(live.as_automation_sink()).await;

    let result = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let ctx = Arc::clone(&ctx);
                    let reply_tx = outbound_tx.clone();
                    tokio::spawn(async move {
                        if let Some(reply) = dispatch_frame(&ctx, &text).await {
                            let _ = reply_tx.send(reply).await;
                        }
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "gateway closed connection");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            },
            Some(payload) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(payload.into())).await {
                    break Err(e.into());
                }
            },
            _ = wait_for_stop(stop) => {
                let _ = write.close().await;
                break Ok(());
            }
        }
    };
    live.clear();
    result
}
