use serde::{Deserialize, Serialize};

/// The notifications the system sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTemplate {
    /// Sent to a user an admin added to a workspace.
    WorkspaceJoin { workspace_name: String },
    /// Sent on sign-up with the single-use verification token.
    VerifyEmail { token: String },
}

/// A rendered mail ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl MailTemplate {
    pub fn render(&self, from: &str, app_link: &str, to: &str) -> Email {
        let (subject, text) = match self {
            Self::WorkspaceJoin { workspace_name } => (
                "You have been added to a workspace".to_string(),
                format!(
                    "Congratulations! You have been added to the workspace {}",
                    workspace_name
                ),
            ),
            Self::VerifyEmail { token } => (
                "Welcome to the app. Please verify your email".to_string(),
                format!(
                    "Welcome to the app. Please verify your email by clicking on the link below:\n{}/verify/{}",
                    app_link.trim_end_matches('/'),
                    token
                ),
            ),
        };

        Email {
            from: from.to_string(),
            to: to.to_string(),
            subject,
            text,
        }
    }
}
