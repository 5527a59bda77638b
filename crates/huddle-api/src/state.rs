use std::sync::Arc;

use tracing::error;

use huddle_db::Database;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_mail::Mailer;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

/// Explicitly constructed collaborators shared by every handler.
pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub mailer: Mailer,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Run blocking store work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}
