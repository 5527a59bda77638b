use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// A unique index or primary key rejected the write. `field` names the
    /// column that collided.
    #[error("{field} already exists")]
    Conflict { field: String },
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
            let unique = code.code == ErrorCode::ConstraintViolation
                && (code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY);
            if unique {
                return StoreError::Conflict {
                    field: conflicting_field(msg),
                };
            }
            // A referenced row vanished between the caller's read and this write.
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return StoreError::NotFound("referenced row".to_string());
            }
        }
        StoreError::Unexpected(err.into())
    }
}

/// "UNIQUE constraint failed: channels.workspace_id, channels.name" -> "name"
fn conflicting_field(msg: &str) -> String {
    msg.rsplit(['.', ' '])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("field")
        .to_string()
}
