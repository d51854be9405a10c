use crate::client::backend::Backend;
use crate::client::config::ClientConfig;
use crate::client::models::{ConversationKey, InboxState, PendingSend, ThreadTarget};
use crate::client::services::users_service::UsersService;
use crate::client::session::Session;
use crate::common::{BackendError, ListingId, Profile, SendError, StoredMessage, ThreadId};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type CreationGates = std::sync::Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>;

/// A caller's hold on the creation gate of one conversation. The map entry is
/// dropped with the last holder, whatever way the send ended.
struct GateHold<'a> {
    gates: &'a CreationGates,
    key: ConversationKey,
    gate: Arc<Mutex<()>>,
}

impl<'a> GateHold<'a> {
    fn acquire(gates: &'a CreationGates, key: ConversationKey) -> Self {
        let gate = match gates.lock() {
            Ok(mut map) => Arc::clone(map.entry(key).or_default()),
            Err(_) => Arc::new(Mutex::new(())),
        };
        Self { gates, key, gate }
    }
}

impl Drop for GateHold<'_> {
    fn drop(&mut self) {
        let Ok(mut map) = self.gates.lock() else {
            return;
        };
        // the map holds one reference and we hold the other
        let last_holder = map
            .get(&self.key)
            .is_some_and(|g| Arc::ptr_eq(g, &self.gate) && Arc::strong_count(&self.gate) == 2);
        if last_holder {
            map.remove(&self.key);
        }
    }
}

/// Messaging view controller of one signed-in user.
///
/// The state mutex is only held for synchronous transitions, never across a
/// backend call, so the view stays responsive while requests are pending.
pub struct InboxService {
    backend: Arc<dyn Backend>,
    session: Session,
    config: ClientConfig,
    state: Arc<Mutex<InboxState>>,
    /// Serialises thread creation per provisional conversation.
    creation_gates: CreationGates,
}

impl InboxService {
    pub fn new(backend: Arc<dyn Backend>, session: Session, config: ClientConfig) -> Self {
        Self {
            backend,
            session,
            config,
            state: Arc::new(Mutex::new(InboxState::new())),
            creation_gates: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> Arc<Mutex<InboxState>> {
        Arc::clone(&self.state)
    }

    fn ensure_session(&self) -> Result<(), BackendError> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(BackendError::Unauthorized("Session expired".to_string()))
        }
    }

    /// Initial load of the sidebar, with the loading indicator on.
    pub async fn load_threads(&self) -> Result<(), BackendError> {
        self.state.lock().await.loading_threads = true;
        let result = self.refresh_threads().await;
        let mut state = self.state.lock().await;
        state.loading_threads = false;
        if let Err(e) = &result {
            state.error_message = Some(e.to_string());
        }
        result
    }

    /// Re-reads the thread list without touching the loading indicator.
    pub async fn refresh_threads(&self) -> Result<(), BackendError> {
        self.ensure_session()?;
        let summaries = self.backend.list_threads_for_user(self.session.user_id()).await?;
        if !self.session.is_active() {
            debug!("[INBOX] Session ended during thread refresh, dropping result");
            return Ok(());
        }
        debug!("[INBOX] {} threads listed", summaries.len());
        self.state.lock().await.replace_threads(summaries);
        Ok(())
    }

    /// Activates a listed thread and fetches its messages.
    pub async fn select_thread(&self, thread_id: &ThreadId) -> Result<(), BackendError> {
        self.ensure_session()?;
        let (key, generation) = {
            let mut state = self.state.lock().await;
            let key = state
                .select_thread(thread_id)
                .ok_or_else(|| BackendError::NotFound(format!("thread {} is not listed", thread_id)))?;
            (key, state.generation())
        };
        self.fetch_messages(key, thread_id, generation).await
    }

    async fn fetch_messages(
        &self,
        key: ConversationKey,
        thread_id: &ThreadId,
        generation: u64,
    ) -> Result<(), BackendError> {
        self.state.lock().await.loading_messages = true;
        let result = self.backend.list_messages(thread_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(messages) => {
                state.apply_messages(key, generation, messages);
                Ok(())
            }
            Err(e) => {
                if state.is_current(generation) {
                    state.loading_messages = false;
                    state.error_message = Some(e.to_string());
                }
                warn!("[INBOX] Loading messages of {} failed: {}", thread_id, e);
                Err(e)
            }
        }
    }

    /// Searches other users and keeps the result for the view.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Profile>, BackendError> {
        self.ensure_session()?;
        let found = UsersService::search(
            self.backend.as_ref(),
            self.session.user_id(),
            query,
            self.config.user_search_limit,
        )
        .await?;
        self.state.lock().await.search_results = found.clone();
        Ok(found)
    }

    /// Opens the conversation with `profile`, reusing an existing thread when
    /// there is one. Otherwise the conversation stays provisional until the
    /// first send creates it.
    pub async fn open_conversation(
        &self,
        profile: Profile,
        listing: Option<ListingId>,
    ) -> Result<ConversationKey, BackendError> {
        self.ensure_session()?;
        if &profile.id == self.session.user_id() {
            return Err(BackendError::InvalidInput("cannot message yourself".to_string()));
        }
        let (key, generation, thread_id, loaded) = {
            let mut state = self.state.lock().await;
            let key = state.open_conversation(self.session.user_id(), profile, listing);
            let conv = state.conversation(key);
            let thread_id = conv.and_then(|c| c.thread_id().cloned());
            let loaded = conv.is_some_and(|c| c.loaded);
            (key, state.generation(), thread_id, loaded)
        };
        match thread_id {
            Some(thread_id) if !loaded => self.fetch_messages(key, &thread_id, generation).await?,
            _ => {}
        }
        Ok(key)
    }

    pub async fn set_draft(&self, text: &str) {
        self.state.lock().await.set_draft(text);
    }

    /// Full send: local append, then thread and message creation.
    pub async fn send_message(&self, text: &str) -> Result<StoredMessage, SendError> {
        let pending = self.begin_send(text).await?;
        self.finish_send(pending).await
    }

    /// Synchronous half of a send. When this returns the message is already
    /// visible as pending and the draft is empty.
    pub async fn begin_send(&self, text: &str) -> Result<PendingSend, SendError> {
        if !self.session.is_active() {
            return Err(SendError::SessionExpired);
        }
        let pending = self.state.lock().await.begin_send(self.session.user_id(), text)?;
        debug!("[INBOX] {} queued {}", pending.key, pending.client_id);
        Ok(pending)
    }

    /// Remote half of a send. On failure the pending message is rolled back
    /// and its text returned to the draft before the error is handed back.
    pub async fn finish_send(&self, pending: PendingSend) -> Result<StoredMessage, SendError> {
        let thread_id = match self.ensure_thread(&pending).await {
            Ok(id) => id,
            Err(err) => return Err(self.roll_back(&pending, err).await),
        };

        let stored = match self
            .backend
            .create_message(&thread_id, &pending.sender_id, &pending.body)
            .await
        {
            Ok(stored) => stored,
            Err(e) => return Err(self.roll_back(&pending, SendError::CreateMessage(e)).await),
        };

        self.state.lock().await.confirm_send(&pending, stored.clone());
        info!("[INBOX] Message {} stored in thread {}", stored.id, thread_id);

        if let Err(e) = self.refresh_threads().await {
            warn!("[INBOX] Thread list refresh after send failed: {}", e);
        }
        Ok(stored)
    }

    async fn roll_back(&self, pending: &PendingSend, err: SendError) -> SendError {
        let restored = self.state.lock().await.fail_send(pending, &err);
        warn!(
            "[INBOX] Send {} in {} rolled back (draft restored: {}): {}",
            pending.client_id, pending.key, restored, err
        );
        err
    }

    /// Resolves the thread a pending send writes into, creating it when the
    /// conversation is still provisional. Concurrent sends in the same
    /// conversation wait on one gate, so only the first creates the thread.
    async fn ensure_thread(&self, pending: &PendingSend) -> Result<ThreadId, SendError> {
        let target = self.state.lock().await.thread_target(pending.key);
        match target {
            ThreadTarget::Ready(id) => return Ok(id),
            ThreadTarget::Gone => return Err(SendError::NoActiveConversation),
            ThreadTarget::Create { .. } => {}
        }

        let hold = GateHold::acquire(&self.creation_gates, pending.key);
        let _creating = hold.gate.lock().await;

        // an earlier send may have created it while we waited
        let target = self.state.lock().await.thread_target(pending.key);
        let (owner, counterparty, listing) = match target {
            ThreadTarget::Ready(id) => return Ok(id),
            ThreadTarget::Gone => return Err(SendError::NoActiveConversation),
            ThreadTarget::Create {
                owner,
                counterparty,
                listing,
            } => (owner, counterparty, listing),
        };

        let thread_id = self
            .backend
            .create_thread(&owner, &counterparty, listing.as_ref())
            .await
            .map_err(SendError::CreateThread)?;
        self.state.lock().await.mark_persisted(pending.key, thread_id.clone());
        info!("[INBOX] {} persisted as thread {}", pending.key, thread_id);
        Ok(thread_id)
    }

    /// Applies a stored message delivered by a refresh or a push channel.
    pub async fn ingest_message(&self, stored: StoredMessage) -> bool {
        self.state.lock().await.ingest_message(stored)
    }

    /// Forgets all per-user state. Called on sign-out.
    pub async fn reset(&self) {
        self.state.lock().await.reset();
        if let Ok(mut gates) = self.creation_gates.lock() {
            gates.clear();
        }
        info!("[INBOX] State cleared");
    }
}
