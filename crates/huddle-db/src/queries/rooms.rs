use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use huddle_types::models::{Room, UserProfile};

use super::{fmt_ts, opt_ts_col, opt_uuid_col, sorted_pair, ts_col, uuid_col};
use crate::{Database, StoreError, StoreResult};

// Members are populated from users; a deleted account shows as "unknown".
const ROOM_SELECT: &str = "
    SELECT r.id, r.name, r.workspace_id, r.created_by, r.last_message_id, r.last_message_at,
           r.created_at, r.updated_at,
           r.member_a, COALESCE(ua.username, 'unknown'), COALESCE(ua.email, ''), COALESCE(ua.avatar, ''),
           r.member_b, COALESCE(ub.username, 'unknown'), COALESCE(ub.email, ''), COALESCE(ub.avatar, '')
    FROM rooms r
    LEFT JOIN users ua ON ua.id = r.member_a
    LEFT JOIN users ub ON ub.id = r.member_b";

impl Database {
    // -- Rooms --

    /// Atomic find-or-create for the DM room of an unordered pair within a
    /// workspace. Returns the room and whether this call created it.
    pub fn find_or_create_room(
        &self,
        workspace_id: Uuid,
        creator_id: Uuid,
        recipient_id: Uuid,
    ) -> StoreResult<(Room, bool)> {
        let (a, b) = sorted_pair(creator_id, recipient_id);
        let now = fmt_ts(Utc::now());
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT INTO rooms (id, name, workspace_id, member_a, member_b, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (workspace_id, member_a, member_b) DO NOTHING",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    format!("DM_{}_{}", creator_id, recipient_id),
                    workspace_id.to_string(),
                    a.to_string(),
                    b.to_string(),
                    creator_id.to_string(),
                    now,
                ],
            )?;
            let room = query_room_for_pair(tx, workspace_id, a, b)?
                .ok_or_else(|| StoreError::NotFound(format!("room for {} and {}", a, b)))?;
            Ok((room, inserted == 1))
        })
    }

    pub fn find_room_for_pair(
        &self,
        workspace_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> StoreResult<Option<Room>> {
        let (a, b) = sorted_pair(user_a, user_b);
        self.with_conn(|conn| query_room_for_pair(conn, workspace_id, a, b))
    }

    pub fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?1", ROOM_SELECT);
            let room = conn.query_row(&sql, [id.to_string()], map_room).optional()?;
            Ok(room)
        })
    }

    /// Rooms in the workspace containing `user_id`, most recent activity first.
    pub fn list_rooms_for_user(&self, workspace_id: Uuid, user_id: Uuid) -> StoreResult<Vec<Room>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE r.workspace_id = ?1 AND (r.member_a = ?2 OR r.member_b = ?2)
                 ORDER BY COALESCE(r.last_message_at, r.updated_at) DESC, r.rowid DESC",
                ROOM_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rooms = stmt
                .query_map([workspace_id.to_string(), user_id.to_string()], map_room)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rooms)
        })
    }
}

fn query_room_for_pair(
    conn: &Connection,
    workspace_id: Uuid,
    a: Uuid,
    b: Uuid,
) -> StoreResult<Option<Room>> {
    let sql = format!(
        "{} WHERE r.workspace_id = ?1 AND r.member_a = ?2 AND r.member_b = ?3",
        ROOM_SELECT
    );
    let room = conn
        .query_row(
            &sql,
            [workspace_id.to_string(), a.to_string(), b.to_string()],
            map_room,
        )
        .optional()?;
    Ok(room)
}

fn map_room(row: &Row<'_>) -> rusqlite::Result<Room> {
    let profile = |offset: usize| -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            id: uuid_col(row, offset)?,
            username: row.get(offset + 1)?,
            email: row.get(offset + 2)?,
            avatar: row.get(offset + 3)?,
        })
    };

    Ok(Room {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        workspace_id: uuid_col(row, 2)?,
        created_by: uuid_col(row, 3)?,
        last_message_id: opt_uuid_col(row, 4)?,
        last_message_at: opt_ts_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
        members: vec![profile(8)?, profile(12)?],
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use uuid::Uuid;

    use crate::queries::test_support::{db, user};

    #[test]
    fn pair_order_does_not_matter() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let ws = Uuid::new_v4();

        let (first, created) = db.find_or_create_room(ws, alice.id, bob.id).unwrap();
        assert!(created);
        assert_eq!(first.created_by, alice.id);
        assert_eq!(first.members.len(), 2);

        let (second, created) = db.find_or_create_room(ws, bob.id, alice.id).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        let found = db.find_room_for_pair(ws, bob.id, alice.id).unwrap().unwrap();
        assert_eq!(found.id, first.id);

        // Same pair in another workspace is a different room
        let (other, created) = db.find_or_create_room(Uuid::new_v4(), alice.id, bob.id).unwrap();
        assert!(created);
        assert_ne!(other.id, first.id);
    }

    #[test]
    fn concurrent_first_contact_creates_one_room() {
        let db = Arc::new(db());
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let ws = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let (from, to) = if i % 2 == 0 { (alice.id, bob.id) } else { (bob.id, alice.id) };
                thread::spawn(move || db.find_or_create_room(ws, from, to).unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        assert!(results.iter().all(|(room, _)| room.id == results[0].0.id));
        assert_eq!(db.list_rooms_for_user(ws, alice.id).unwrap().len(), 1);
    }
}
