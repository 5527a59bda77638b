use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use rusqlite::types::Type;
use uuid::Uuid;

use huddle_types::models::{Message, MessageTarget, UserProfile};

use super::{fmt_ts, opt_uuid_col, ts_col, uuid_col};
use crate::models::NewMessage;
use crate::{Database, StoreError, StoreResult};

// JOIN users to populate the sender in a single query
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.body, m.image, m.channel_id, m.room_id, m.workspace_id, m.sender_id,
           COALESCE(u.username, 'unknown'), COALESCE(u.email, ''), COALESCE(u.avatar, ''),
           m.created_at
    FROM messages m
    LEFT JOIN users u ON u.id = m.sender_id";

impl Database {
    // -- Messages --

    /// Persist a message. For a room message the room's last-message pointer
    /// is moved to it within the same transaction.
    pub fn insert_message(&self, new: &NewMessage) -> StoreResult<Message> {
        let id = Uuid::new_v4();
        let created_at = fmt_ts(Utc::now());
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO messages (id, body, image, channel_id, room_id, sender_id, workspace_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.to_string(),
                    new.body,
                    new.image,
                    new.target.channel_id().map(|id| id.to_string()),
                    new.target.room_id().map(|id| id.to_string()),
                    new.sender_id.to_string(),
                    new.workspace_id.to_string(),
                    created_at,
                ],
            )?;

            if let MessageTarget::Room(room_id) = new.target {
                let changed = tx.execute(
                    "UPDATE rooms SET last_message_id = ?2, last_message_at = ?3, updated_at = ?3
                     WHERE id = ?1",
                    [room_id.to_string(), id.to_string(), created_at.clone()],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound(format!("room {}", room_id)));
                }
            }

            query_message(tx, id)?.ok_or_else(|| StoreError::NotFound(format!("message {}", id)))
        })
    }

    /// One page of a room's or channel's history, oldest first. `page` is 1-based.
    pub fn list_messages(
        &self,
        target: MessageTarget,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let column = match target {
            MessageTarget::Channel(_) => "channel_id",
            MessageTarget::Room(_) => "room_id",
        };
        let offset = u64::from(page.max(1) - 1) * u64::from(limit);
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.{} = ?1 ORDER BY m.created_at ASC, m.rowid ASC LIMIT ?2 OFFSET ?3",
                MESSAGE_SELECT, column
            );
            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map(
                    rusqlite::params![target.id().to_string(), limit, offset],
                    map_message,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
    }
}

fn query_message(conn: &Connection, id: Uuid) -> StoreResult<Option<Message>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    let message = conn.query_row(&sql, [id.to_string()], map_message).optional()?;
    Ok(message)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let target = match (opt_uuid_col(row, 3)?, opt_uuid_col(row, 4)?) {
        (Some(channel_id), None) => MessageTarget::Channel(channel_id),
        (None, Some(room_id)) => MessageTarget::Room(room_id),
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                "message must have exactly one of channel_id or room_id".into(),
            ));
        }
    };

    Ok(Message {
        id: uuid_col(row, 0)?,
        body: row.get(1)?,
        image: row.get(2)?,
        target,
        workspace_id: uuid_col(row, 5)?,
        sender: UserProfile {
            id: uuid_col(row, 6)?,
            username: row.get(7)?,
            email: row.get(8)?,
            avatar: row.get(9)?,
        },
        created_at: ts_col(row, 10)?,
    })
}
