//! Write-side inputs for the store. Reads come back as `huddle_types::models`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use huddle_types::models::MessageTarget;

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub verification_token: String,
    pub verification_token_expiry: DateTime<Utc>,
}

pub struct NewWorkspace {
    pub name: String,
    pub description: String,
    pub join_code: String,
    pub owner_id: Uuid,
    /// Channel created alongside the workspace.
    pub default_channel: String,
}

#[derive(Default)]
pub struct WorkspacePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub join_code: Option<String>,
}

pub struct NewMessage {
    pub body: String,
    pub image: Option<String>,
    pub target: MessageTarget,
    pub workspace_id: Uuid,
    pub sender_id: Uuid,
}
