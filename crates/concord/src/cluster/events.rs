//! User event delivery.

use async_trait::async_trait;
use concord_common::{ConcordError, UserEvent};
use tokio::sync::broadcast;

/// Delivers user events into a datacenter's gossip layer
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn fire(&self, dc: &str, event: UserEvent) -> Result<(), ConcordError>;
}

/// Event sink backed by a broadcast channel. Events fired with no
/// subscriber attached are dropped.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<UserEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn fire(&self, dc: &str, mut event: UserEvent) -> Result<(), ConcordError> {
        event.datacenter = dc.to_string();
        let name = event.name.clone();

        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = %name, datacenter = %dc, receivers = receivers, "User event delivered");
            }
            Err(_) => {
                tracing::debug!(event = %name, datacenter = %dc, "User event fired with no subscribers");
            }
        }
        Ok(())
    }
}

/// Log every delivered user event until shutdown
pub async fn event_watcher(
    mut events: broadcast::Receiver<UserEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("📣 Event watcher started");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    tracing::info!(
                        id = %event.id,
                        event = %event.name,
                        datacenter = %event.datacenter,
                        payload_bytes = event.payload.len(),
                        "User event received"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => {
                tracing::info!("📣 Event watcher shutting down");
                break;
            }
        }
    }
}
