use crate::client::backend::{AuthProvider, Backend};
use crate::common::{
    AuthGrant, BackendError, ListingId, Profile, SignUp, StoredMessage, ThreadId, ThreadSummary, UserId,
};
use crate::server::config::BackendConfig;
use crate::server::database::Database;
use crate::server::{auth, messages, threads, users};
use async_trait::async_trait;
use std::sync::Arc;

/// SQLite-backed stand-in for the hosted backend.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    db: Arc<Database>,
    config: BackendConfig,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>, config: BackendConfig) -> Self {
        Self { db, config }
    }

    /// Connects to `config.database_url`, runs the migrations and drops
    /// sessions that expired while nothing was running.
    pub async fn open(config: BackendConfig) -> Result<Self, BackendError> {
        let db = Database::connect(&config.database_url).await?;
        db.migrate().await?;
        auth::cleanup_expired_sessions(&db).await?;
        Ok(Self::new(Arc::new(db), config))
    }

    pub async fn in_memory(config: BackendConfig) -> Result<Self, BackendError> {
        let db = Database::connect_in_memory().await?;
        db.migrate().await?;
        Ok(Self::new(Arc::new(db), config))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn create_thread(
        &self,
        owner: &UserId,
        counterparty: &UserId,
        listing: Option<&ListingId>,
    ) -> Result<ThreadId, BackendError> {
        threads::create_thread(&self.db, owner, counterparty, listing).await
    }

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, BackendError> {
        messages::create_message(&self.db, thread_id, sender_id, body, &self.config).await
    }

    async fn list_threads_for_user(&self, user_id: &UserId) -> Result<Vec<ThreadSummary>, BackendError> {
        threads::list_threads_for_user(&self.db, user_id).await
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, BackendError> {
        messages::list_messages(&self.db, thread_id).await
    }

    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<Profile>, BackendError> {
        users::search_users(&self.db, query, limit).await
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn sign_up(&self, request: SignUp) -> Result<AuthGrant, BackendError> {
        auth::sign_up(&self.db, &request, &self.config).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthGrant, BackendError> {
        auth::sign_in(&self.db, email, password, &self.config).await
    }

    async fn resume(&self, token: &str) -> Result<AuthGrant, BackendError> {
        auth::resume(&self.db, token).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
        auth::sign_out(&self.db, token).await
    }
}
