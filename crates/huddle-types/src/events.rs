use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageTarget};

/// Events sent over the websocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// Server confirms the set of streams this connection now receives
    Subscribed { ids: Vec<Uuid> },

    /// A new message was persisted in a room or channel
    MessageReceived { message: Message },

    /// Direct reply to the connection that issued a `NewMessage`
    Ack {
        request_id: Option<String>,
        success: bool,
        message: String,
        data: Option<Message>,
    },
}

impl GatewayEvent {
    /// Returns the room or channel id this event is scoped to.
    /// Events that return `None` are not fanned out by scope.
    pub fn scope(&self) -> Option<Uuid> {
        match self {
            Self::MessageReceived { message } => Some(message.target.id()),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the websocket connection
    Identify { token: String },

    /// Start receiving messages for these rooms or channels
    Subscribe { ids: Vec<Uuid> },

    /// Stop receiving messages for these rooms or channels
    Unsubscribe { ids: Vec<Uuid> },

    /// Post a message into a room or a channel
    NewMessage(NewMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<Uuid>,
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    pub body: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewMessage {
    /// Resolve the single target of this message.
    pub fn target(&self) -> Result<MessageTarget, &'static str> {
        match (self.room_id, self.channel_id) {
            (Some(room_id), None) => Ok(MessageTarget::Room(room_id)),
            (None, Some(channel_id)) => Ok(MessageTarget::Channel(channel_id)),
            (Some(_), Some(_)) => Err("Cannot have both channel_id and room_id"),
            (None, None) => Err("Either channel_id or room_id must be provided"),
        }
    }
}
