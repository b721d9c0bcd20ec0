// SPDX-License-Identifier: MIT

//! The live connection's send path: rebound on every successful reconnect
//! so the automation runtime's event sink and the handlers crate's
//! [`OutboundSink`] always route over whichever socket is currently up
//! (spec.md §4.3's "handler registrations rebind this to the current
//! connection's send path").

use async_trait::async_trait;
use portacode_automation::EventSink;
use portacode_handlers::{ConnectionStatus, OutboundSink};
use portacode_provisioner::{ContainerProgress, ProvisionerEventSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::warn;

pub struct LiveConnection {
    sender: parking_lot::Mutex<Option<Sender<String>>>,
    connected: AtomicBool,
}

impl LiveConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { sender: parking_lot::Mutex::new(None), connected: AtomicBool::new(false) })
    }

    pub fn install(&self, tx: Sender<String>) {
        *self.sender.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        *self.sender.lock() = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn send_raw(&self, payload: serde_json::Value) {
        let tx = self.sender.lock().clone();
        let Some(tx) = tx else {
            warn!("dropping outbound event, no live connection");
            return;
        };
        match serde_json::to_string(&payload) {
            Ok(text) => {
                let _ = tx.send(text).await;
            }
            Err(e) => warn!(error = %e, "failed to serialize outbound event"),
        }
    }

    /// Adapts this as the automation runtime's [`EventSink`].
    pub fn as_automation_sink(self: &Arc<Self>) -> Arc<dyn EventSink> {
        Arc::new(AutomationEventSink(Arc::clone(self)))
    }

    /// Adapts this as the provisioner pipeline's progress sink.
    pub fn as_provisioner_sink(self: &Arc<Self>) -> Arc<dyn ProvisionerEventSink> {
        Arc::new(ProvisionerProgressSink(Arc::clone(self)))
    }
}

#[async_trait]
impl OutboundSink for LiveConnection {
    async fn send(&self, event: &str, mut payload: serde_json::Value) {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("event".to_string(), serde_json::Value::String(event.to_string()));
        }
        self.send_raw(payload).await;
    }
}

impl ConnectionStatus for LiveConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct AutomationEventSink(Arc<LiveConnection>);

#[async_trait]
impl EventSink for AutomationEventSink {
    async fn send(&self, payload: serde_json::Value) {
        self.0.send_raw(payload).await;
    }
}

struct ProvisionerProgressSink(Arc<LiveConnection>);

#[async_trait]
impl ProvisionerEventSink for ProvisionerProgressSink {
    async fn send(&self, progress: ContainerProgress) {
        match serde_json::to_value(&progress) {
            Ok(payload) => self.0.send_raw(payload).await,
            Err(e) => warn!(error = %e, "failed to serialize provisioner progress"),
        }
    }
}
