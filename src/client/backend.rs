//! Contracts of the hosted backend the inbox talks to.
//!
//! The inbox never assumes anything about transport or storage: it only
//! needs these calls to settle with a value or a [`BackendError`].

use crate::common::{
    AuthGrant, BackendError, ListingId, Profile, SignUp, StoredMessage, ThreadId, ThreadSummary, UserId,
};
use async_trait::async_trait;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_thread(
        &self,
        owner: &UserId,
        counterparty: &UserId,
        listing: Option<&ListingId>,
    ) -> Result<ThreadId, BackendError>;

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, BackendError>;

    async fn list_threads_for_user(&self, user_id: &UserId) -> Result<Vec<ThreadSummary>, BackendError>;

    /// Oldest first.
    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, BackendError>;

    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<Profile>, BackendError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, request: SignUp) -> Result<AuthGrant, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthGrant, BackendError>;

    /// Turns a previously issued token back into a grant if it is still valid.
    async fn resume(&self, token: &str) -> Result<AuthGrant, BackendError>;

    async fn sign_out(&self, token: &str) -> Result<(), BackendError>;
}
