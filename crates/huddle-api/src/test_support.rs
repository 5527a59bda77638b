use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use huddle_db::Database;
use huddle_db::models::NewUser;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_mail::{Email, MailConfig, MailWorker, RecordingTransport};
use huddle_types::models::User;

use crate::services::{ChannelService, DmService, UserService, WorkspaceService};
use crate::state::{AppState, AppStateInner, AuthConfig};

/// In-memory state with a recording mail transport. Needs a tokio runtime.
pub struct Harness {
    pub state: AppState,
    transport: Arc<RecordingTransport>,
    worker: Mutex<Option<MailWorker>>,
}

impl Harness {
    pub fn new() -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let config = MailConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let (mailer, worker) = huddle_mail::spawn(config, transport.clone());
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            dispatcher: Dispatcher::new(),
            mailer,
            auth: AuthConfig {
                jwt_secret: "test-secret".into(),
                token_ttl: chrono::Duration::hours(1),
            },
        });
        Self {
            state,
            transport,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn user(&self, name: &str) -> User {
        self.state
            .db
            .create_user(&NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "unused".to_string(),
                avatar: format!("https://robohash.org/{}", name),
                verification_token: crate::credentials::verification_token(),
                verification_token_expiry: Utc::now() + chrono::Duration::hours(1),
            })
            .unwrap()
    }

    pub fn workspaces(&self) -> WorkspaceService<'_> {
        WorkspaceService::new(&self.state.db, &self.state.mailer)
    }

    pub fn dms(&self) -> DmService<'_> {
        DmService::new(&self.state.db, &self.state.dispatcher)
    }

    pub fn channels(&self) -> ChannelService<'_> {
        ChannelService::new(&self.state.db, &self.state.dispatcher)
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(&self.state.db, &self.state.mailer)
    }

    /// Stop the mail worker and return everything it delivered.
    pub async fn drain_mail(&self) -> Vec<Email> {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        self.transport.sent()
    }
}
