//! Business operations. Services are synchronous and run on the blocking
//! pool (see [`crate::state::run_blocking`]); every authorization decision
//! goes through [`crate::membership`].

pub mod channel;
pub mod dm;
pub mod user;
pub mod workspace;

pub use channel::ChannelService;
pub use dm::{DmService, StartedDm};
pub use user::UserService;
pub use workspace::WorkspaceService;

use huddle_types::models::Workspace;

use crate::error::{ApiError, ApiResult};

/// Messages are served in pages of this size unless asked otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

fn workspace_not_found() -> ApiError {
    ApiError::not_found("Workspace not found", "Invalid data sent from the client")
}

fn not_a_member() -> ApiError {
    ApiError::unauthorized(
        "User is not a member of the workspace",
        "User is not a member of the workspace",
    )
}

fn not_an_admin() -> ApiError {
    ApiError::unauthorized(
        "User is not an admin of the workspace",
        "User is not an admin of the workspace",
    )
}

fn require_workspace(workspace: Option<Workspace>) -> ApiResult<Workspace> {
    workspace.ok_or_else(workspace_not_found)
}

fn require_body(body: &str) -> ApiResult<()> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request(
            "Message body is required",
            "Invalid data sent from the client",
        ));
    }
    Ok(())
}
