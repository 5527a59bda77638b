use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::NewUser;
use huddle_mail::{MailTemplate, Mailer};
use huddle_types::api::SignInResponse;
use huddle_types::models::UserProfile;

use super::WorkspaceService;
use crate::credentials;
use crate::error::{ApiError, ApiResult};
use crate::state::AuthConfig;

const VERIFICATION_TTL_HOURS: i64 = 1;

pub struct UserService<'a> {
    db: &'a Database,
    mailer: &'a Mailer,
}

impl<'a> UserService<'a> {
    pub fn new(db: &'a Database, mailer: &'a Mailer) -> Self {
        Self { db, mailer }
    }

    pub fn sign_up(&self, username: &str, email: &str, password: &str) -> ApiResult<UserProfile> {
        let username = username.trim();
        let email = email.trim().to_lowercase();

        let mut errors = Vec::new();
        if username.len() < 3 || !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("Username must be at least 3 alphanumeric characters".to_string());
        }
        if !looks_like_email(&email) {
            errors.push("Email is invalid".to_string());
        }
        if password.is_empty() {
            errors.push("Password is required".to_string());
        }
        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }

        let token = credentials::verification_token();
        let user = self.db.create_user(&NewUser {
            username: username.to_string(),
            email: email.clone(),
            password_hash: credentials::hash_password(password)?,
            avatar: format!("https://robohash.org/{}", username),
            verification_token: token.clone(),
            verification_token_expiry: Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS),
        })?;

        info!(user_id = %user.id, "user signed up");
        self.mailer.enqueue(MailTemplate::VerifyEmail { token }, &user.email);
        Ok(user.profile())
    }

    pub fn sign_in(
        &self,
        auth: &AuthConfig,
        email: &str,
        password: &str,
    ) -> ApiResult<SignInResponse> {
        let user = self
            .db
            .get_user_by_email(&email.trim().to_lowercase())?
            .ok_or_else(|| {
                ApiError::not_found(
                    "No registered user found with this email",
                    "Invalid data sent from the client",
                )
            })?;

        if !credentials::verify_password(password, &user.password_hash) {
            return Err(ApiError::bad_request(
                "Invalid password, please try again",
                "Invalid data sent from the client",
            ));
        }

        let token = credentials::create_token(auth, user.id, &user.username)?;
        Ok(SignInResponse {
            user: user.profile(),
            token,
        })
    }

    /// Single use: the token is cleared once the address is verified.
    pub fn verify_email(&self, token: &str) -> ApiResult<UserProfile> {
        let user = self
            .db
            .get_user_by_verification_token(token)?
            .ok_or_else(|| {
                ApiError::not_found("Invalid token", "Invalid data sent from the client")
            })?;

        let expired = user
            .verification_token_expiry
            .is_none_or(|expiry| expiry < Utc::now());
        if expired {
            return Err(ApiError::bad_request(
                "Token has expired",
                "Invalid data sent from the client",
            ));
        }

        Ok(self.db.mark_user_verified(user.id)?.profile())
    }

    /// Remove the user from every workspace, then delete the account.
    pub fn delete_user(&self, user_id: Uuid) -> ApiResult<()> {
        if self.db.get_user_by_id(user_id)?.is_none() {
            return Err(ApiError::not_found("User not found", "Invalid data sent from the client"));
        }
        let stripped = WorkspaceService::new(self.db, self.mailer).remove_user_everywhere(user_id)?;
        self.db.delete_user(user_id)?;
        info!(user_id = %user_id, workspaces = stripped, "user deleted");
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
