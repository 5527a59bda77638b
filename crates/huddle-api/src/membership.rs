//! Authorization decisions over already-loaded aggregates. No I/O.
//!
//! Every membership or role check in the services goes through here.

use uuid::Uuid;

use huddle_types::models::{Role, Room, Workspace, WorkspaceMember};

pub fn member(workspace: &Workspace, user_id: Uuid) -> Option<&WorkspaceMember> {
    workspace.members.iter().find(|m| m.member_id == user_id)
}

pub fn is_member(workspace: &Workspace, user_id: Uuid) -> bool {
    member(workspace, user_id).is_some()
}

pub fn is_admin(workspace: &Workspace, user_id: Uuid) -> bool {
    member(workspace, user_id).is_some_and(|m| m.role == Role::Admin)
}

pub fn is_room_member(room: &Room, user_id: Uuid) -> bool {
    room.members.iter().any(|m| m.id == user_id)
}

/// Case-insensitive, matching the store's `NOCASE` index.
pub fn channel_name_taken(workspace: &Workspace, name: &str) -> bool {
    let wanted = name.to_lowercase();
    workspace
        .channels
        .iter()
        .any(|c| c.name.to_lowercase() == wanted)
}
