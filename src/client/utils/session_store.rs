use crate::client::config::ClientConfig;
use keyring::Entry;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const SERVICE: &str = "ryd_inbox";
const USER: &str = "ryd_session";

/// Where the session token survives between runs.
pub trait TokenStore: Send + Sync {
    fn save(&self, token: &str) -> anyhow::Result<()>;
    fn load(&self) -> Option<String>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// OS keyring, optionally backed by a plain file when the keyring is missing.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
    user: String,
    fallback: Option<PathBuf>,
}

impl KeyringTokenStore {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            service: SERVICE.to_string(),
            user: USER.to_string(),
            fallback: config.keyring_fallback.then(|| config.session_file.clone()),
        }
    }

    fn entry(&self) -> Entry {
        Entry::new(&self.service, &self.user)
    }

    fn read_fallback(&self) -> Option<String> {
        let path = self.fallback.as_ref()?;
        let token = fs::read_to_string(path).ok()?.trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

impl TokenStore for KeyringTokenStore {
    fn save(&self, token: &str) -> anyhow::Result<()> {
        match self.entry().set_password(token) {
            Ok(()) => Ok(()),
            Err(e) => match &self.fallback {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, token)?;
                    // never log the token itself
                    warn!("[SESSION] Keyring unavailable ({}), token persisted to {}", e, path.display());
                    Ok(())
                }
                None => Err(anyhow::anyhow!("keyring unavailable and file fallback disabled: {}", e)),
            },
        }
    }

    fn load(&self) -> Option<String> {
        match self.entry().get_password() {
            Ok(t) if !t.trim().is_empty() => Some(t),
            _ => self.read_fallback(),
        }
    }

    fn clear(&self) -> anyhow::Result<()> {
        let _ = self.entry().delete_password();
        if let Some(path) = &self.fallback {
            if path.exists() {
                fs::remove_file(path)?;
                info!("[SESSION] Removed fallback token file");
            }
        }
        Ok(())
    }
}

/// Process-local store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, token: &str) -> anyhow::Result<()> {
        let mut slot = self.token.lock().map_err(|_| anyhow::anyhow!("token store poisoned"))?;
        *slot = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|slot| slot.clone())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut slot = self.token.lock().map_err(|_| anyhow::anyhow!("token store poisoned"))?;
        *slot = None;
        Ok(())
    }
}
