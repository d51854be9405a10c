use std::env;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub database_url: String,
    pub log_level: String,
    pub session_expiry_days: u32,
    pub argon2_salt_length: u32,
    pub max_message_length: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:data/ryd_inbox.db".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            session_expiry_days: lookup("SESSION_EXPIRY_DAYS").and_then(|v| v.parse().ok()).unwrap_or(7),
            // argon2 rejects salts shorter than 8 bytes
            argon2_salt_length: lookup("ARGON2_SALT_LENGTH")
                .and_then(|v| v.parse().ok())
                .filter(|len| (8..=48).contains(len))
                .unwrap_or(16),
            max_message_length: lookup("MAX_MESSAGE_LENGTH").and_then(|v| v.parse().ok()).unwrap_or(2048),
        }
    }

    pub fn session_ttl_millis(&self) -> i64 {
        i64::from(self.session_expiry_days) * 24 * 60 * 60 * 1000
    }
}
