use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use huddle_types::models::{Channel, Role, Workspace, WorkspaceMember};

use super::{fmt_ts, opt_uuid_col, ts_col, uuid_col};
use crate::models::{NewWorkspace, WorkspacePatch};
use crate::{Database, StoreError, StoreResult};

impl Database {
    // -- Workspaces --

    /// Insert the workspace, its owner as admin, and its default channel as
    /// one transaction.
    pub fn create_workspace(&self, new: &NewWorkspace) -> StoreResult<Workspace> {
        let id = Uuid::new_v4();
        let now = fmt_ts(Utc::now());
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO workspaces (id, name, description, join_code, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id.to_string(), new.name, new.description, new.join_code, now],
            )?;
            insert_member(tx, id, new.owner_id, Role::Admin)?;
            insert_channel(tx, id, &new.default_channel, Some(new.owner_id))?;
            load_workspace(tx, id)
        })
    }

    pub fn get_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>> {
        self.with_conn(|conn| find_workspace(conn, "id = ?1", &id.to_string()))
    }

    pub fn get_workspace_by_join_code(&self, join_code: &str) -> StoreResult<Option<Workspace>> {
        self.with_conn(|conn| find_workspace(conn, "join_code = ?1", join_code))
    }

    pub fn get_workspace_by_channel_id(&self, channel_id: Uuid) -> StoreResult<Option<Workspace>> {
        self.with_conn(|conn| {
            find_workspace(
                conn,
                "id = (SELECT workspace_id FROM channels WHERE id = ?1)",
                &channel_id.to_string(),
            )
        })
    }

    pub fn list_workspaces_for_member(&self, user_id: Uuid) -> StoreResult<Vec<Workspace>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT w.id FROM workspaces w
                 JOIN workspace_members m ON m.workspace_id = w.id
                 WHERE m.user_id = ?1
                 ORDER BY w.created_at",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| uuid_col(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids.into_iter().map(|id| load_workspace(conn, id)).collect()
        })
    }

    pub fn update_workspace(&self, id: Uuid, patch: &WorkspacePatch) -> StoreResult<Workspace> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE workspaces
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     join_code = COALESCE(?4, join_code),
                     updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    patch.name,
                    patch.description,
                    patch.join_code,
                    fmt_ts(Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("workspace {}", id)));
            }
            load_workspace(tx, id)
        })
    }

    /// Fails with `Conflict` when the user is already a member.
    pub fn add_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<Workspace> {
        self.with_tx(|tx| {
            insert_member(tx, workspace_id, user_id, role)?;
            touch(tx, workspace_id)?;
            load_workspace(tx, workspace_id)
        })
    }

    pub fn remove_member(&self, workspace_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2",
                [workspace_id.to_string(), user_id.to_string()],
            )?;
            touch(tx, workspace_id)
        })
    }

    /// Fails with `Conflict` when a channel of the same name (ignoring case)
    /// already exists in the workspace.
    pub fn add_channel(
        &self,
        workspace_id: Uuid,
        name: &str,
        created_by: Option<Uuid>,
    ) -> StoreResult<Workspace> {
        self.with_tx(|tx| {
            insert_channel(tx, workspace_id, name, created_by)?;
            touch(tx, workspace_id)?;
            load_workspace(tx, workspace_id)
        })
    }

    pub fn get_channel(&self, id: Uuid) -> StoreResult<Option<Channel>> {
        self.with_conn(|conn| {
            let channel = conn
                .query_row(
                    "SELECT id, workspace_id, name, created_by, created_at FROM channels WHERE id = ?1",
                    [id.to_string()],
                    map_channel,
                )
                .optional()?;
            Ok(channel)
        })
    }

    /// Delete the workspace's channels, then its member list, then the
    /// workspace itself.
    pub fn delete_workspace(&self, id: Uuid) -> StoreResult<()> {
        self.with_tx(|tx| {
            let id = id.to_string();
            tx.execute("DELETE FROM channels WHERE workspace_id = ?1", [&id])?;
            tx.execute("DELETE FROM workspace_members WHERE workspace_id = ?1", [&id])?;
            let changed = tx.execute("DELETE FROM workspaces WHERE id = ?1", [&id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("workspace {}", id)));
            }
            Ok(())
        })
    }
}

fn insert_member(
    conn: &Connection,
    workspace_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            workspace_id.to_string(),
            user_id.to_string(),
            role.as_str(),
            fmt_ts(Utc::now()),
        ],
    )?;
    Ok(())
}

fn insert_channel(
    conn: &Connection,
    workspace_id: Uuid,
    name: &str,
    created_by: Option<Uuid>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO channels (id, workspace_id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            workspace_id.to_string(),
            name,
            created_by.map(|id| id.to_string()),
            fmt_ts(Utc::now()),
        ],
    )?;
    Ok(())
}

fn touch(conn: &Connection, workspace_id: Uuid) -> StoreResult<()> {
    conn.execute(
        "UPDATE workspaces SET updated_at = ?2 WHERE id = ?1",
        [workspace_id.to_string(), fmt_ts(Utc::now())],
    )?;
    Ok(())
}

fn find_workspace(
    conn: &Connection,
    predicate: &str,
    value: &str,
) -> StoreResult<Option<Workspace>> {
    let sql = format!("SELECT id FROM workspaces WHERE {}", predicate);
    let id = conn.query_row(&sql, [value], |row| uuid_col(row, 0)).optional()?;
    match id {
        Some(id) => load_workspace(conn, id).map(Some),
        None => Ok(None),
    }
}

/// Load a workspace with its members and channels.
fn load_workspace(conn: &Connection, id: Uuid) -> StoreResult<Workspace> {
    let key = id.to_string();

    let mut workspace = conn
        .query_row(
            "SELECT id, name, description, join_code, created_at, updated_at
             FROM workspaces WHERE id = ?1",
            [&key],
            |row| {
                Ok(Workspace {
                    id: uuid_col(row, 0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    join_code: row.get(3)?,
                    members: Vec::new(),
                    channels: Vec::new(),
                    created_at: ts_col(row, 4)?,
                    updated_at: ts_col(row, 5)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("workspace {}", id)))?;

    let mut stmt = conn.prepare(
        "SELECT m.user_id, u.username, u.email, u.avatar, m.role, m.joined_at
         FROM workspace_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.workspace_id = ?1
         ORDER BY m.joined_at",
    )?;
    workspace.members = stmt
        .query_map([&key], map_member)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, name, created_by, created_at
         FROM channels WHERE workspace_id = ?1
         ORDER BY created_at, rowid",
    )?;
    workspace.channels = stmt
        .query_map([&key], map_channel)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(workspace)
}

fn map_member(row: &Row<'_>) -> rusqlite::Result<WorkspaceMember> {
    let role: String = row.get(4)?;
    Ok(WorkspaceMember {
        member_id: uuid_col(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        joined_at: ts_col(row, 5)?,
    })
}

fn map_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_col(row, 0)?,
        workspace_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        created_by: opt_uuid_col(row, 3)?,
        created_at: ts_col(row, 4)?,
    })
}
