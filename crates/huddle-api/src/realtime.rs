//! Serves gateway socket commands through the same services as REST.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use huddle_gateway::GatewayBackend;
use huddle_types::models::{Message, MessageTarget};

use crate::error::ApiError;
use crate::membership::{is_member, is_room_member};
use crate::services::{ChannelService, DmService};
use crate::state::{AppState, run_blocking};

pub struct RealtimeBackend {
    state: AppState,
}

impl RealtimeBackend {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl GatewayBackend for RealtimeBackend {
    async fn post_message(
        &self,
        sender_id: Uuid,
        target: MessageTarget,
        body: String,
        image: Option<String>,
    ) -> Result<Message, String> {
        run_blocking(&self.state, move |s| match target {
            MessageTarget::Room(room_id) => {
                DmService::new(&s.db, &s.dispatcher).send_message(room_id, sender_id, &body, image)
            }
            MessageTarget::Channel(channel_id) => {
                ChannelService::new(&s.db, &s.dispatcher)
                    .send_message(channel_id, sender_id, &body, image)
            }
        })
        .await
        .map_err(|e: ApiError| e.public_message())
    }

    /// Room members may follow the room; workspace members may follow any
    /// of its channels.
    async fn can_subscribe(&self, user_id: Uuid, target_id: Uuid) -> bool {
        let allowed = run_blocking(&self.state, move |s| {
            if let Some(room) = s.db.get_room(target_id)? {
                return Ok(is_room_member(&room, user_id));
            }
            Ok(s.db
                .get_workspace_by_channel_id(target_id)?
                .is_some_and(|ws| is_member(&ws, user_id)))
        })
        .await;

        allowed.unwrap_or_else(|e| {
            warn!("subscription check for {} failed: {}", target_id, e);
            false
        })
    }
}
