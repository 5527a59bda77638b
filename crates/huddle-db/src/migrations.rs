use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                          TEXT PRIMARY KEY,
            username                    TEXT NOT NULL UNIQUE,
            email                       TEXT NOT NULL UNIQUE,
            password                    TEXT NOT NULL,
            avatar                      TEXT NOT NULL,
            is_verified                 INTEGER NOT NULL DEFAULT 0,
            verification_token          TEXT,
            verification_token_expiry   TEXT,
            created_at                  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_verification_token
            ON users(verification_token);

        CREATE TABLE IF NOT EXISTS workspaces (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            join_code   TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspace_members (
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            joined_at       TEXT NOT NULL,
            PRIMARY KEY (workspace_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_workspace_members_user
            ON workspace_members(user_id);

        CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            name            TEXT NOT NULL,
            created_by      TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_workspace_name
            ON channels(workspace_id, name COLLATE NOCASE);

        -- member_a < member_b: one row per unordered pair per workspace
        CREATE TABLE IF NOT EXISTS rooms (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            workspace_id    TEXT NOT NULL,
            member_a        TEXT NOT NULL,
            member_b        TEXT NOT NULL,
            created_by      TEXT NOT NULL,
            last_message_id TEXT,
            last_message_at TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK (member_a < member_b),
            UNIQUE (workspace_id, member_a, member_b)
        );

        CREATE INDEX IF NOT EXISTS idx_rooms_member_a ON rooms(workspace_id, member_a);
        CREATE INDEX IF NOT EXISTS idx_rooms_member_b ON rooms(workspace_id, member_b);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            body            TEXT NOT NULL CHECK (length(body) > 0),
            image           TEXT,
            channel_id      TEXT,
            room_id         TEXT,
            sender_id       TEXT NOT NULL,
            workspace_id    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            CHECK ((channel_id IS NULL) <> (room_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
