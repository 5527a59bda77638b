use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use huddle_types::events::GatewayEvent;
use huddle_types::models::Message;

/// A serialized event and the room/channel it belongs to.
#[derive(Debug, Clone)]
pub struct ScopedEvent {
    pub scope: Option<Uuid>,
    pub json: Arc<str>,
}

/// Fans events out to every connected socket. Each connection filters by
/// the rooms and channels it subscribed to.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<ScopedEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ScopedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event, serialized once for all receivers. Returns how
    /// many connections it was handed to; nobody listening is not an error.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize gateway event: {}", e);
                return 0;
            }
        };

        self.inner
            .broadcast_tx
            .send(ScopedEvent {
                scope: event.scope(),
                json: json.into(),
            })
            .unwrap_or(0)
    }

    /// Deliver a freshly persisted message to its room or channel.
    pub fn publish_message(&self, message: &Message) -> usize {
        self.broadcast(GatewayEvent::MessageReceived {
            message: message.clone(),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}
