use crate::client::backend::AuthProvider;
use crate::client::utils::TokenStore;
use crate::common::{now_millis, AuthGrant, BackendError, Profile, Role, SignUp, UserId};
use log::{info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct SessionInner {
    user: Profile,
    token: String,
    expires_at: i64,
    started_at: i64,
    active: AtomicBool,
}

/// Handle of a signed-in user. Clones share the same active flag, so
/// invalidating one invalidates all of them.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.inner.user.id)
            .field("expires_at", &self.inner.expires_at)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn start(grant: AuthGrant) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user: grant.user,
                token: grant.token,
                expires_at: grant.expires_at,
                started_at: now_millis(),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn user(&self) -> &Profile {
        &self.inner.user
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.user.id
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn started_at(&self) -> i64 {
        self.inner.started_at
    }

    pub fn expires_at(&self) -> i64 {
        self.inner.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst) && now_millis() < self.inner.expires_at
    }

    pub fn invalidate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    pub fn is_owner(&self) -> bool {
        self.inner.user.role == Role::Owner
    }

    pub fn is_tenant(&self) -> bool {
        self.inner.user.role == Role::Tenant
    }

    pub fn is_admin(&self) -> bool {
        self.inner.user.role == Role::Admin
    }
}

/// Signs users in and out and keeps the token in a [`TokenStore`].
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    tokens: Box<dyn TokenStore>,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthProvider>, tokens: Box<dyn TokenStore>) -> Self {
        Self {
            auth,
            tokens,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub async fn sign_up(&mut self, request: SignUp) -> Result<Session, BackendError> {
        let grant = self.auth.sign_up(request).await?;
        info!("[SESSION] Signed up {}", grant.user.username);
        Ok(self.start(grant))
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, BackendError> {
        let grant = self.auth.sign_in(email, password).await?;
        info!("[SESSION] Signed in {}", grant.user.username);
        Ok(self.start(grant))
    }

    /// Resumes the session whose token was saved by a previous run. A token
    /// the backend rejects is forgotten; a transport failure keeps it.
    pub async fn restore(&mut self) -> Result<Option<Session>, BackendError> {
        let Some(token) = self.tokens.load() else {
            return Ok(None);
        };
        match self.auth.resume(&token).await {
            Ok(grant) => {
                info!("[SESSION] Restored session of {}", grant.user.username);
                Ok(Some(self.start(grant)))
            }
            Err(BackendError::Unauthorized(_)) | Err(BackendError::NotFound(_)) => {
                info!("[SESSION] Stored token rejected, clearing it");
                if let Err(e) = self.tokens.clear() {
                    warn!("[SESSION] Failed to clear stored token: {}", e);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ends the current session locally first, so no new send can start while
    /// the backend call is pending.
    pub async fn sign_out(&mut self) -> Result<(), BackendError> {
        let Some(session) = self.current.take() else {
            return Ok(());
        };
        session.invalidate();
        if let Err(e) = self.tokens.clear() {
            warn!("[SESSION] Failed to clear stored token: {}", e);
        }
        self.auth.sign_out(session.token()).await?;
        info!("[SESSION] Signed out {}", session.user().username);
        Ok(())
    }

    fn start(&mut self, grant: AuthGrant) -> Session {
        if let Some(previous) = self.current.take() {
            previous.invalidate();
        }
        if let Err(e) = self.tokens.save(&grant.token) {
            warn!("[SESSION] Token not persisted: {}", e);
        }
        let session = Session::start(grant);
        self.current = Some(session.clone());
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(expires_at: i64) -> AuthGrant {
        AuthGrant {
            user: Profile {
                id: UserId::from("u1"),
                email: "bob@ryd.test".to_string(),
                username: "bob".to_string(),
                display_name: "Bob".to_string(),
                role: Role::Tenant,
            },
            token: "secret-token".to_string(),
            expires_at,
        }
    }

    #[test]
    fn invalidate_is_shared_between_clones() {
        let session = Session::start(grant(now_millis() + 60_000));
        let clone = session.clone();
        assert!(clone.is_active());
        session.invalidate();
        assert!(!clone.is_active());
    }

    #[test]
    fn expired_grant_is_inactive() {
        let session = Session::start(grant(now_millis() - 1));
        assert!(!session.is_active());
    }

    #[test]
    fn debug_hides_token() {
        let session = Session::start(grant(now_millis() + 60_000));
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret-token"));
        assert!(session.is_tenant() && !session.is_owner() && !session.is_admin());
    }
}
