use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

use huddle_mail::MailConfig;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub app_link: String,
    pub mail_from: String,
    /// When unset, mail is written to the log instead of being relayed.
    pub mail_relay_url: Option<String>,
    pub mail_queue_capacity: usize,
    pub mail_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: string("HUDDLE_HOST", "0.0.0.0"),
            port: parse(&lookup, "HUDDLE_PORT", 4000)?,
            db_path: PathBuf::from(string("HUDDLE_DB_PATH", "huddle.db")),
            jwt_secret: string("HUDDLE_JWT_SECRET", "dev-secret-change-me"),
            jwt_expiry_hours: parse(&lookup, "HUDDLE_JWT_EXPIRY_HOURS", 24)?,
            app_link: string("HUDDLE_APP_LINK", "http://localhost:4000"),
            mail_from: string("HUDDLE_MAIL_FROM", "no-reply@huddle.local"),
            mail_relay_url: lookup("HUDDLE_MAIL_RELAY_URL").filter(|url| !url.is_empty()),
            mail_queue_capacity: parse(&lookup, "HUDDLE_MAIL_QUEUE_CAPACITY", 256)?,
            mail_max_attempts: parse(&lookup, "HUDDLE_MAIL_MAX_ATTEMPTS", 3)?,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn mail(&self) -> MailConfig {
        MailConfig {
            from: self.mail_from.clone(),
            app_link: self.app_link.clone(),
            queue_capacity: self.mail_queue_capacity,
            max_attempts: self.mail_max_attempts,
            ..Default::default()
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} has an invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.db_path, PathBuf::from("huddle.db"));
        assert_eq!(config.jwt_expiry_hours, 24);
        assert!(config.mail_relay_url.is_none());
        assert_eq!(config.addr().unwrap().port(), 4000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("HUDDLE_PORT", "8080"),
            ("HUDDLE_MAIL_RELAY_URL", "http://relay.local/send"),
            ("HUDDLE_MAIL_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.mail_relay_url.as_deref(), Some("http://relay.local/send"));
        assert_eq!(config.mail().max_attempts, 5);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("HUDDLE_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("HUDDLE_PORT"));
    }
}
