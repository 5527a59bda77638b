use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::template::Email;

/// Out-of-band delivery of a rendered mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Writes mails to the log instead of delivering them. Used when no relay
/// is configured.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "mail (log transport)");
        Ok(())
    }
}

/// POSTs mails as JSON to an HTTP mail relay.
pub struct HttpRelayTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpRelayTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpRelayTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        self.client
            .post(&self.url)
            .json(email)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
