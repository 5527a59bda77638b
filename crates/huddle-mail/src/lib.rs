//! Best-effort notification sink.
//!
//! Business operations call [`Mailer::enqueue`], which never blocks and never
//! fails: a full or closed queue is logged and the mail is dropped. A single
//! background worker renders queued mails and hands them to a
//! [`MailTransport`], retrying with exponential backoff.

pub mod template;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use template::{Email, MailTemplate};
pub use transport::{HttpRelayTransport, LogTransport, MailTransport};
#[cfg(any(test, feature = "test-util"))]
pub use test_util::RecordingTransport;

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    /// Base URL used in verification links.
    pub app_link: String,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt.
    pub retry_backoff: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "no-reply@huddle.local".into(),
            app_link: "http://localhost:4000".into(),
            queue_capacity: 256,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Enqueue handle. Cheap to clone.
#[derive(Clone)]
pub struct Mailer {
    tx: mpsc::Sender<Email>,
    config: Arc<MailConfig>,
}

/// Owns the background delivery task.
pub struct MailWorker {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Start the delivery worker. Must be called inside a tokio runtime.
pub fn spawn(config: MailConfig, transport: Arc<dyn MailTransport>) -> (Mailer, MailWorker) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let config = Arc::new(config);

    let handle = tokio::spawn(run_worker(rx, shutdown_rx, transport, config.clone()));

    (
        Mailer { tx, config },
        MailWorker {
            handle,
            shutdown: shutdown_tx,
        },
    )
}

impl Mailer {
    /// Queue a notification for `to`. Never fails the caller.
    pub fn enqueue(&self, template: MailTemplate, to: &str) {
        let email = template.render(&self.config.from, &self.config.app_link, to);
        match self.tx.try_send(email) {
            Ok(()) => debug!(to, "mail enqueued"),
            Err(mpsc::error::TrySendError::Full(email)) => {
                warn!(to = %email.to, subject = %email.subject, "mail queue full, dropping mail");
            }
            Err(mpsc::error::TrySendError::Closed(email)) => {
                warn!(to = %email.to, subject = %email.subject, "mail queue closed, dropping mail");
            }
        }
    }
}

impl MailWorker {
    /// Stop accepting mail, deliver what is already queued, then return.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!("mail worker join error: {}", e);
        }
        info!("Mail worker stopped");
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Email>,
    mut shutdown: oneshot::Receiver<()>,
    transport: Arc<dyn MailTransport>,
    config: Arc<MailConfig>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                rx.close();
                while let Some(email) = rx.recv().await {
                    deliver(transport.as_ref(), &config, &email).await;
                }
                break;
            }
            next = rx.recv() => match next {
                Some(email) => deliver(transport.as_ref(), &config, &email).await,
                None => break,
            },
        }
    }
}

async fn deliver(transport: &dyn MailTransport, config: &MailConfig, email: &Email) {
    let attempts = config.max_attempts.max(1);
    let mut backoff = config.retry_backoff;

    for attempt in 1..=attempts {
        match transport.send(email).await {
            Ok(()) => {
                info!(to = %email.to, subject = %email.subject, attempt, "mail delivered");
                return;
            }
            Err(e) if attempt < attempts => {
                warn!(to = %email.to, attempt, "mail delivery failed, retrying: {}", e);
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                warn!(to = %email.to, attempts, "mail delivery gave up: {}", e);
            }
        }
    }
}
