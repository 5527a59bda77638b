use tracing::{info, warn};
use uuid::Uuid;

use huddle_db::models::{NewWorkspace, WorkspacePatch};
use huddle_db::{Database, StoreError};
use huddle_mail::{MailTemplate, Mailer};
use huddle_types::models::{Role, Workspace};

use super::{not_a_member, not_an_admin, require_workspace};
use crate::credentials;
use crate::error::{ApiError, ApiResult};
use crate::membership::{channel_name_taken, is_admin, is_member};

pub const DEFAULT_CHANNEL: &str = "general";

/// Join codes are short, so a collision is retried a few times before it
/// surfaces as a validation error.
const JOIN_CODE_ATTEMPTS: usize = 3;

pub struct WorkspaceService<'a> {
    db: &'a Database,
    mailer: &'a Mailer,
    join_codes: Box<dyn Fn() -> String + 'a>,
}

impl<'a> WorkspaceService<'a> {
    pub fn new(db: &'a Database, mailer: &'a Mailer) -> Self {
        Self {
            db,
            mailer,
            join_codes: Box::new(credentials::join_code),
        }
    }

    #[cfg(test)]
    fn with_join_codes(mut self, join_codes: impl Fn() -> String + 'a) -> Self {
        self.join_codes = Box::new(join_codes);
        self
    }

    /// Create a workspace owned by `owner_id`, with the owner as its only
    /// admin and a "general" channel.
    pub fn create_workspace(
        &self,
        name: &str,
        description: &str,
        owner_id: Uuid,
    ) -> ApiResult<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation(vec!["Workspace name is required".into()]));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let new = NewWorkspace {
                name: name.to_string(),
                description: description.to_string(),
                join_code: (self.join_codes)(),
                owner_id,
                default_channel: DEFAULT_CHANNEL.to_string(),
            };
            match self.db.create_workspace(&new) {
                Ok(workspace) => {
                    info!(workspace_id = %workspace.id, owner = %owner_id, "workspace created");
                    return Ok(workspace);
                }
                Err(StoreError::Conflict { field })
                    if field == "join_code" && attempt < JOIN_CODE_ATTEMPTS =>
                {
                    warn!(attempt, "join code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn list_workspaces(&self, user_id: Uuid) -> ApiResult<Vec<Workspace>> {
        Ok(self.db.list_workspaces_for_member(user_id)?)
    }

    pub fn get_workspace(&self, workspace_id: Uuid, user_id: Uuid) -> ApiResult<Workspace> {
        let workspace = require_workspace(self.db.get_workspace(workspace_id)?)?;
        if !is_member(&workspace, user_id) {
            return Err(not_a_member());
        }
        Ok(workspace)
    }

    pub fn get_workspace_by_join_code(
        &self,
        join_code: &str,
        user_id: Uuid,
    ) -> ApiResult<Workspace> {
        let workspace = require_workspace(self.db.get_workspace_by_join_code(join_code)?)?;
        if !is_member(&workspace, user_id) {
            return Err(not_a_member());
        }
        Ok(workspace)
    }

    pub fn delete_workspace(&self, workspace_id: Uuid, user_id: Uuid) -> ApiResult<()> {
        let workspace = require_workspace(self.db.get_workspace(workspace_id)?)?;
        if !is_admin(&workspace, user_id) {
            return Err(ApiError::unauthorized(
                "User is not allowed to delete the workspace",
                "User is either not a memeber or an admin of the workspace",
            ));
        }
        self.db.delete_workspace(workspace_id)?;
        info!(workspace_id = %workspace_id, "workspace deleted");
        Ok(())
    }

    pub fn update_workspace(
        &self,
        workspace_id: Uuid,
        name: Option<String>,
        description: Option<String>,
        user_id: Uuid,
    ) -> ApiResult<Workspace> {
        self.require_admin(workspace_id, user_id)?;

        let name = name.map(|n| n.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(ApiError::validation(vec!["Workspace name is required".into()]));
        }

        let patch = WorkspacePatch {
            name,
            description,
            join_code: None,
        };
        Ok(self.db.update_workspace(workspace_id, &patch)?)
    }

    pub fn reset_join_code(&self, workspace_id: Uuid, user_id: Uuid) -> ApiResult<Workspace> {
        self.require_admin(workspace_id, user_id)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let patch = WorkspacePatch {
                join_code: Some((self.join_codes)()),
                ..Default::default()
            };
            match self.db.update_workspace(workspace_id, &patch) {
                Ok(workspace) => return Ok(workspace),
                Err(StoreError::Conflict { field })
                    if field == "join_code" && attempt < JOIN_CODE_ATTEMPTS =>
                {
                    warn!(attempt, "join code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Add `member_id` with `role`. The new member is notified by mail.
    pub fn add_member(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        role: Role,
        user_id: Uuid,
    ) -> ApiResult<Workspace> {
        let workspace = self.require_admin(workspace_id, user_id)?;

        let member = self.db.get_user_by_id(member_id)?.ok_or_else(|| {
            ApiError::not_found("User not found", "Invalid data sent from the client")
        })?;

        if is_member(&workspace, member_id) {
            return Err(ApiError::unauthorized(
                "User is already a member of the workspace",
                "User is already a member of the workspace",
            ));
        }

        let updated = self.db.add_member(workspace_id, member_id, role)?;
        self.mailer.enqueue(
            MailTemplate::WorkspaceJoin {
                workspace_name: updated.name.clone(),
            },
            &member.email,
        );
        Ok(updated)
    }

    pub fn join_by_code(
        &self,
        workspace_id: Uuid,
        join_code: &str,
        user_id: Uuid,
    ) -> ApiResult<Workspace> {
        let workspace = require_workspace(self.db.get_workspace(workspace_id)?)?;

        if workspace.join_code != join_code {
            return Err(ApiError::bad_request(
                "Invalid join code",
                "Invalid data sent from the client",
            ));
        }
        if is_member(&workspace, user_id) {
            return Err(ApiError::bad_request(
                "User is already a member of the workspace",
                "User is already a member of the workspace",
            ));
        }

        Ok(self.db.add_member(workspace_id, user_id, Role::Member)?)
    }

    pub fn add_channel(
        &self,
        workspace_id: Uuid,
        channel_name: &str,
        user_id: Uuid,
    ) -> ApiResult<Workspace> {
        let workspace = self.require_admin(workspace_id, user_id)?;

        let channel_name = channel_name.trim();
        if channel_name.is_empty() {
            return Err(ApiError::validation(vec!["Channel name is required".into()]));
        }
        if channel_name_taken(&workspace, channel_name) {
            return Err(ApiError::forbidden(
                "Channel already part of workspace",
                "Invalid data sent from the client",
            ));
        }

        Ok(self.db.add_channel(workspace_id, channel_name, Some(user_id))?)
    }

    /// Strip `user_id` from every workspace it belongs to.
    pub fn remove_user_everywhere(&self, user_id: Uuid) -> ApiResult<usize> {
        let workspaces = self.db.list_workspaces_for_member(user_id)?;
        for workspace in &workspaces {
            self.db.remove_member(workspace.id, user_id)?;
        }
        Ok(workspaces.len())
    }

    fn require_admin(&self, workspace_id: Uuid, user_id: Uuid) -> ApiResult<Workspace> {
        let workspace = require_workspace(self.db.get_workspace(workspace_id)?)?;
        if !is_admin(&workspace, user_id) {
            return Err(not_an_admin());
        }
        Ok(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::test_support::Harness;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn created_workspace_has_owner_admin_and_general() {
        let h = Harness::new();
        let owner = h.user("owner");
        let ws = h.workspaces().create_workspace("Eng", "", owner.id).unwrap();

        assert!(is_admin(&ws, owner.id));
        assert_eq!(ws.members.len(), 1);
        assert_eq!(ws.channels.len(), 1);
        assert_eq!(ws.channels[0].name, DEFAULT_CHANNEL);
        assert_eq!(ws.join_code.len(), 6);
    }

    #[tokio::test]
    async fn blank_name_is_a_validation_error() {
        let h = Harness::new();
        let owner = h.user("owner");
        let err = h.workspaces().create_workspace("   ", "", owner.id).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[tokio::test]
    async fn add_member_rejects_second_call_and_notifies_once() {
        let h = Harness::new();
        let owner = h.user("owner");
        let bob = h.user("bob");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        let updated = svc.add_member(ws.id, bob.id, Role::Member, owner.id).unwrap();
        assert!(is_member(&updated, bob.id));

        let err = svc.add_member(ws.id, bob.id, Role::Member, owner.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let sent = h.drain_mail().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, bob.email);
    }

    #[tokio::test]
    async fn only_admins_manage_the_workspace() {
        let h = Harness::new();
        let owner = h.user("owner");
        let bob = h.user("bob");
        let carol = h.user("carol");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();
        svc.add_member(ws.id, bob.id, Role::Member, owner.id).unwrap();

        let status = |r: ApiResult<Workspace>| r.unwrap_err().status();
        assert_eq!(
            status(svc.add_member(ws.id, carol.id, Role::Member, bob.id)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(svc.add_channel(ws.id, "random", bob.id)), StatusCode::UNAUTHORIZED);
        assert_eq!(status(svc.reset_join_code(ws.id, bob.id)), StatusCode::UNAUTHORIZED);
        assert_eq!(
            svc.delete_workspace(ws.id, bob.id).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            svc.add_member(ws.id, Uuid::new_v4(), Role::Member, owner.id).unwrap_err().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn duplicate_channel_name_is_forbidden() {
        let h = Harness::new();
        let owner = h.user("owner");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        let ws = svc.add_channel(ws.id, "Random", owner.id).unwrap();
        assert_eq!(ws.channels.len(), 2);

        let err = svc.add_channel(ws.id, "GENERAL", owner.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn join_by_code_checks_code_and_membership() {
        let h = Harness::new();
        let owner = h.user("owner");
        let bob = h.user("bob");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        let err = svc.join_by_code(ws.id, "WRONG!", bob.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let joined = svc.join_by_code(ws.id, &ws.join_code, bob.id).unwrap();
        assert!(is_member(&joined, bob.id) && !is_admin(&joined, bob.id));

        let err = svc.join_by_code(ws.id, &ws.join_code, bob.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_join_code_invalidates_the_old_code() {
        let h = Harness::new();
        let owner = h.user("owner");
        let bob = h.user("bob");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        let reset = svc.reset_join_code(ws.id, owner.id).unwrap();
        if reset.join_code != ws.join_code {
            assert!(svc.join_by_code(ws.id, &ws.join_code, bob.id).is_err());
        }
        assert!(svc.join_by_code(ws.id, &reset.join_code, bob.id).is_ok());
    }

    #[tokio::test]
    async fn get_requires_membership() {
        let h = Harness::new();
        let owner = h.user("owner");
        let outsider = h.user("outsider");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        assert!(svc.get_workspace(ws.id, owner.id).is_ok());
        assert!(svc.get_workspace_by_join_code(&ws.join_code, owner.id).is_ok());
        assert_eq!(
            svc.get_workspace(ws.id, outsider.id).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            svc.get_workspace(Uuid::new_v4(), owner.id).unwrap_err().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn delete_removes_the_workspace() {
        let h = Harness::new();
        let owner = h.user("owner");
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        svc.delete_workspace(ws.id, owner.id).unwrap();
        assert!(svc.list_workspaces(owner.id).unwrap().is_empty());
        assert_eq!(svc.get_workspace(ws.id, owner.id).unwrap_err().status(), StatusCode::NOT_FOUND);
    }

    fn scripted(codes: &[&str]) -> impl Fn() -> String + 'static {
        let codes: VecDeque<String> = codes.iter().map(|c| c.to_string()).collect();
        let codes = RefCell::new(codes);
        move || codes.borrow_mut().pop_front().unwrap_or_else(credentials::join_code)
    }

    #[tokio::test]
    async fn join_code_collision_is_regenerated() {
        let h = Harness::new();
        let owner = h.user("owner");
        let taken = h.workspaces().create_workspace("Eng", "", owner.id).unwrap().join_code;

        let svc = h.workspaces().with_join_codes(scripted(&[taken.as_str(), "FRESH1"]));
        let ws = svc.create_workspace("Ops", "", owner.id).unwrap();
        assert_eq!(ws.join_code, "FRESH1");

        let svc = h.workspaces().with_join_codes(scripted(&[taken.as_str(), "FRESH2"]));
        let reset = svc.reset_join_code(ws.id, owner.id).unwrap();
        assert_eq!(reset.join_code, "FRESH2");
    }

    #[tokio::test]
    async fn persistent_join_code_collision_is_a_validation_error() {
        let h = Harness::new();
        let owner = h.user("owner");
        let taken = h.workspaces().create_workspace("Eng", "", owner.id).unwrap().join_code;

        let always_taken = taken.clone();
        let svc = h.workspaces().with_join_codes(move || always_taken.clone());
        match svc.create_workspace("Ops", "", owner.id).unwrap_err() {
            ApiError::Validation { errors, .. } => {
                assert_eq!(errors, vec!["join_code already exists"])
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(svc.list_workspaces(owner.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_workspace_is_admin_only() {
        let h = Harness::new();
        let (owner, bob) = (h.user("owner"), h.user("bob"));
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "old", owner.id).unwrap();
        svc.add_member(ws.id, bob.id, Role::Member, owner.id).unwrap();

        let updated = svc
            .update_workspace(ws.id, Some("Engineering".into()), None, owner.id)
            .unwrap();
        assert_eq!(updated.name, "Engineering");
        assert_eq!(updated.description, "old");

        let err = svc.update_workspace(ws.id, None, Some("new".into()), bob.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let err = svc.update_workspace(ws.id, Some("  ".into()), None, owner.id).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        let err = svc.update_workspace(Uuid::new_v4(), None, None, owner.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn join_code_lookup_requires_membership() {
        let h = Harness::new();
        let (owner, outsider) = (h.user("owner"), h.user("outsider"));
        let svc = h.workspaces();
        let ws = svc.create_workspace("Eng", "", owner.id).unwrap();

        let err = svc.get_workspace_by_join_code(&ws.join_code, outsider.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let err = svc.get_workspace_by_join_code("NOPE00", owner.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
