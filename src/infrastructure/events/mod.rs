use crate::events::DaemonEvent;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

const HUB_CAPACITY: usize = 256;

/// Process-local notification as delivered on the internal bus.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: DaemonEvent,
    pub payload: Value,
}

/// Client-facing notification as delivered on the pub/sub hub. The transport
/// layer decides which connections are subscribed to which topic.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub event: DaemonEvent,
    pub topic: String,
    pub payload: Value,
}

/// Pub/sub addressing for outbound messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Global,
    Session(String),
    Room(String),
}

impl Channel {
    pub fn as_topic(&self) -> String {
        match self {
            Channel::Global => "global".to_string(),
            Channel::Session(id) => format!("session:{id}"),
            Channel::Room(id) => format!("room:{id}"),
        }
    }
}

/// Internal event bus. Emission is fire-and-forget: serialization failures are
/// logged and dropped, absent or lagging subscribers never fail the emitting
/// operation.
#[derive(Clone)]
pub struct DaemonHub {
    tx: broadcast::Sender<EventEnvelope>,
}

impl DaemonHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit<T: Serialize>(&self, event: DaemonEvent, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize payload for {}: {e}", event.as_str());
                return;
            }
        };
        let _ = self.tx.send(EventEnvelope { event, payload });
    }
}

impl Default for DaemonHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast hub feeding connected clients through the transport layer.
#[derive(Clone)]
pub struct MessageHub {
    tx: broadcast::Sender<OutboundMessage>,
}

impl MessageHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    pub fn event<T: Serialize>(&self, event: DaemonEvent, payload: &T, channel: Channel) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize payload for {}: {e}", event.as_str());
                return;
            }
        };
        let _ = self.tx.send(OutboundMessage {
            event,
            topic: channel.as_topic(),
            payload,
        });
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}
