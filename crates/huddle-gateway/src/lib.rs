pub mod connection;
pub mod dispatcher;

use async_trait::async_trait;
use uuid::Uuid;

use huddle_types::models::{Message, MessageTarget};

/// What the gateway needs from the application to serve socket commands.
#[async_trait]
pub trait GatewayBackend: Send + Sync {
    /// Persist a message from `sender_id` and publish it to subscribers.
    /// The error is a message safe to show to the client.
    async fn post_message(
        &self,
        sender_id: Uuid,
        target: MessageTarget,
        body: String,
        image: Option<String>,
    ) -> Result<Message, String>;

    /// Whether `user_id` may receive messages for the room or channel `target_id`.
    async fn can_subscribe(&self, user_id: Uuid, target_id: Uuid) -> bool;
}
