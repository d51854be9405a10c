use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for user search results.
    pub user_search_limit: usize,
    /// Persist the session token to `session_file` when the OS keyring is
    /// unavailable. Off unless explicitly enabled.
    pub keyring_fallback: bool,
    pub session_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            user_search_limit: lookup("USER_SEARCH_LIMIT")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(20),
            keyring_fallback: lookup("KEYRING_FALLBACK").is_some_and(|v| v.trim() == "true"),
            session_file: lookup("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data").join("session_token.txt")),
        }
    }
}
