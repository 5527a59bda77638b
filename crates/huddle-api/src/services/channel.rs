use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::NewMessage;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_types::api::ChannelDetail;
use huddle_types::models::{Channel, Message, MessageTarget};

use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, not_a_member, require_body};
use crate::error::{ApiError, ApiResult};
use crate::membership::is_member;

pub struct ChannelService<'a> {
    db: &'a Database,
    dispatcher: &'a Dispatcher,
}

impl<'a> ChannelService<'a> {
    pub fn new(db: &'a Database, dispatcher: &'a Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn get_channel(&self, channel_id: Uuid, user_id: Uuid) -> ApiResult<ChannelDetail> {
        let channel = self.require_access(channel_id, user_id)?;
        let messages = self
            .db
            .list_messages(MessageTarget::Channel(channel_id), 1, DEFAULT_PAGE_SIZE)?;
        Ok(ChannelDetail { channel, messages })
    }

    /// One page of channel history, oldest first. Pages start at 1.
    pub fn list_messages(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> ApiResult<Vec<Message>> {
        self.require_access(channel_id, user_id)?;
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.db.list_messages(MessageTarget::Channel(channel_id), page, limit)?)
    }

    pub fn send_message(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        body: &str,
        image: Option<String>,
    ) -> ApiResult<Message> {
        let channel = self.require_access(channel_id, user_id)?;
        require_body(body)?;

        let message = self.db.insert_message(&NewMessage {
            body: body.to_string(),
            image,
            target: MessageTarget::Channel(channel_id),
            workspace_id: channel.workspace_id,
            sender_id: user_id,
        })?;

        self.dispatcher.publish_message(&message);
        Ok(message)
    }

    /// Channels are open to every member of the owning workspace.
    fn require_access(&self, channel_id: Uuid, user_id: Uuid) -> ApiResult<Channel> {
        let channel = self.db.get_channel(channel_id)?.ok_or_else(|| {
            ApiError::not_found("Channel not found", "Invalid channel ID sent from the client")
        })?;
        let workspace = self
            .db
            .get_workspace(channel.workspace_id)?
            .ok_or_else(|| ApiError::not_found("Workspace not found", "Channel has no workspace"))?;
        if !is_member(&workspace, user_id) {
            return Err(not_a_member());
        }
        Ok(channel)
    }
}
