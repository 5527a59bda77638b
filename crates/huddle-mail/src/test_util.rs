//! Test doubles for code that sends mail.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::template::Email;
use crate::transport::MailTransport;

/// Keeps every delivered mail in memory. Can be told to fail the first
/// `n` attempts.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Email>>,
    failures_left: Mutex<u32>,
}

impl RecordingTransport {
    pub fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_left: Mutex::new(times),
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        {
            let mut left = self
                .failures_left
                .lock()
                .map_err(|_| anyhow!("recording transport lock poisoned"))?;
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("simulated delivery failure"));
            }
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording transport lock poisoned"))?
            .push(email.clone());
        Ok(())
    }
}
