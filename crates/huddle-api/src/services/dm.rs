use tracing::info;
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::NewMessage;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_types::api::DmDetail;
use huddle_types::models::{Message, MessageTarget, Room};

use super::{DEFAULT_PAGE_SIZE, require_body};
use crate::error::{ApiError, ApiResult};
use crate::membership::{is_member, is_room_member};

/// Outcome of [`DmService::start_dm`]. `is_new` is false when the room
/// already existed for the pair.
#[derive(Debug)]
pub struct StartedDm {
    pub room: Room,
    pub is_new: bool,
}

pub struct DmService<'a> {
    db: &'a Database,
    dispatcher: &'a Dispatcher,
}

fn workspace_not_found() -> ApiError {
    ApiError::not_found(
        "Workspace not found with the provided ID",
        "Invalid workspace ID sent from the client",
    )
}

fn room_not_found() -> ApiError {
    ApiError::not_found("DM room not found", "Invalid room ID sent from the client")
}

fn not_a_room_member() -> ApiError {
    ApiError::unauthorized(
        "You are not a member of this DM",
        "User is not authorized to access this DM",
    )
}

impl<'a> DmService<'a> {
    pub fn new(db: &'a Database, dispatcher: &'a Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Find or create the DM room between `user_id` and `recipient_id`.
    ///
    /// Self-DMs are rejected before anything is looked up. At most one room
    /// exists per unordered pair and workspace; concurrent first contacts
    /// resolve to the same room.
    pub fn start_dm(
        &self,
        user_id: Uuid,
        recipient_id: Uuid,
        workspace_id: Uuid,
    ) -> ApiResult<StartedDm> {
        if user_id == recipient_id {
            return Err(ApiError::bad_request(
                "Cannot create DM with yourself",
                "Invalid recipient ID",
            ));
        }

        let workspace = self.db.get_workspace(workspace_id)?.ok_or_else(workspace_not_found)?;

        if !is_member(&workspace, user_id) {
            return Err(ApiError::unauthorized(
                "You are not a member of this workspace",
                "User is not authorized to create DM in this workspace",
            ));
        }
        if !is_member(&workspace, recipient_id) {
            return Err(ApiError::bad_request(
                "Recipient is not a member of this workspace",
                "Cannot create DM with user who is not in the workspace",
            ));
        }

        if let Some(room) = self.db.find_room_for_pair(workspace_id, user_id, recipient_id)? {
            return Ok(StartedDm { room, is_new: false });
        }

        let (room, is_new) = self.db.find_or_create_room(workspace_id, user_id, recipient_id)?;
        if is_new {
            info!(room_id = %room.id, workspace_id = %workspace_id, "DM room created");
        }
        Ok(StartedDm { room, is_new })
    }

    /// Rooms of `user_id` in the workspace, most recent activity first.
    pub fn get_all_dms(&self, user_id: Uuid, workspace_id: Uuid) -> ApiResult<Vec<Room>> {
        let workspace = self.db.get_workspace(workspace_id)?.ok_or_else(workspace_not_found)?;
        if !is_member(&workspace, user_id) {
            return Err(ApiError::unauthorized(
                "You are not a member of this workspace",
                "User is not authorized to view DMs in this workspace",
            ));
        }
        Ok(self.db.list_rooms_for_user(workspace_id, user_id)?)
    }

    /// The room and its first page of messages, oldest first.
    pub fn get_dm_by_id(&self, room_id: Uuid, user_id: Uuid) -> ApiResult<DmDetail> {
        let room = self.require_room_member(room_id, user_id)?;
        let messages = self
            .db
            .list_messages(MessageTarget::Room(room_id), 1, DEFAULT_PAGE_SIZE)?;
        Ok(DmDetail { room, messages })
    }

    /// Persist a message into the room, update its last-message pointer and
    /// broadcast it to the room's subscribers.
    pub fn send_message(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        body: &str,
        image: Option<String>,
    ) -> ApiResult<Message> {
        let room = self.require_room_member(room_id, user_id)?;
        require_body(body)?;

        let message = self.db.insert_message(&NewMessage {
            body: body.to_string(),
            image,
            target: MessageTarget::Room(room_id),
            workspace_id: room.workspace_id,
            sender_id: user_id,
        })?;

        self.dispatcher.publish_message(&message);
        Ok(message)
    }

    fn require_room_member(&self, room_id: Uuid, user_id: Uuid) -> ApiResult<Room> {
        let room = self.db.get_room(room_id)?.ok_or_else(room_not_found)?;
        if !is_room_member(&room, user_id) {
            return Err(not_a_room_member());
        }
        Ok(room)
    }
}
