use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use huddle_types::models::User;

use super::{fmt_ts, opt_ts_col, ts_col, uuid_col};
use crate::models::NewUser;
use crate::{Database, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, username, email, password, avatar, is_verified, \
     verification_token, verification_token_expiry, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, avatar, verification_token,
                                    verification_token_expiry, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.to_string(),
                    new.username,
                    new.email,
                    new.password_hash,
                    new.avatar,
                    new.verification_token,
                    fmt_ts(new.verification_token_expiry),
                    fmt_ts(Utc::now()),
                ],
            )?;
            query_user(conn, "id", &id.to_string())?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_verification_token(&self, token: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "verification_token", token))
    }

    /// Flip the verified flag and burn the token so it cannot be reused.
    pub fn mark_user_verified(&self, id: Uuid) -> StoreResult<User> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET is_verified = 1, verification_token = NULL, verification_token_expiry = NULL
                 WHERE id = ?1",
                [id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {}", id)));
            }
            query_user(conn, "id", &id.to_string())?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
        })
    }

    /// Delete the account row. Workspace memberships reference the user and
    /// must be stripped first.
    pub fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {}", id)));
            }
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    let user = stmt.query_row([value], map_user).optional()?;
    Ok(user)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        is_verified: row.get(5)?,
        verification_token: row.get(6)?,
        verification_token_expiry: opt_ts_col(row, 7)?,
        created_at: ts_col(row, 8)?,
    })
}
