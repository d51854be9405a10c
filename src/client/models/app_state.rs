use crate::client::models::messages::{MessageList, Reconciliation};
use crate::client::models::thread_store::ThreadStore;
use crate::common::{
    now_millis, ClientMessageId, ListingId, Profile, SendError, StoredMessage, ThreadId, ThreadSummary, UserId,
};
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// Client-local handle of a conversation. Unlike a [`ThreadId`] it exists
/// before the thread is persisted and does not change when it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey(u64);

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conv#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Only known to this client; created on the backend by the first send.
    Provisional,
    Persisted(ThreadId),
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub key: ConversationKey,
    pub status: ThreadStatus,
    /// Participant who started (or will start) the thread.
    pub owner_id: UserId,
    /// The other participant, from the signed-in user's point of view.
    pub counterparty: Profile,
    pub listing_id: Option<ListingId>,
    pub messages: MessageList,
    pub draft: String,
    /// Whether messages were fetched at least once.
    pub loaded: bool,
}

impl Conversation {
    pub fn thread_id(&self) -> Option<&ThreadId> {
        match &self.status {
            ThreadStatus::Provisional => None,
            ThreadStatus::Persisted(id) => Some(id),
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.status, ThreadStatus::Persisted(_))
    }

    fn matches(&self, counterparty: &UserId, listing: Option<&ListingId>) -> bool {
        &self.counterparty.id == counterparty && (listing.is_none() || self.listing_id.as_ref() == listing)
    }
}

/// Ticket for the remote half of a send, captured when the provisional
/// message was appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub key: ConversationKey,
    pub client_id: ClientMessageId,
    pub sender_id: UserId,
    pub body: String,
    /// View generation at submit time.
    pub generation: u64,
}

/// What has to happen before a message can be written into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadTarget {
    Ready(ThreadId),
    Create {
        owner: UserId,
        counterparty: UserId,
        listing: Option<ListingId>,
    },
    /// The conversation was dropped (sign-out) while the send was in flight.
    Gone,
}

/// Everything the messaging view renders.
///
/// All mutation is synchronous; async callers lock, apply one transition and
/// release before awaiting anything.
#[derive(Debug, Default)]
pub struct InboxState {
    threads: ThreadStore,
    conversations: HashMap<ConversationKey, Conversation>,
    by_thread: HashMap<ThreadId, ConversationKey>,
    active: Option<ConversationKey>,
    generation: u64,
    next_key: u64,
    in_flight: usize,
    pub loading_threads: bool,
    pub loading_messages: bool,
    pub error_message: Option<String>,
    pub search_results: Vec<Profile>,
}

impl InboxState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.active
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.and_then(|key| self.conversations.get(&key))
    }

    fn active_mut(&mut self) -> Option<&mut Conversation> {
        let key = self.active?;
        self.conversations.get_mut(&key)
    }

    pub fn conversation(&self, key: ConversationKey) -> Option<&Conversation> {
        self.conversations.get(&key)
    }

    pub fn conversation_for_thread(&self, thread_id: &ThreadId) -> Option<&Conversation> {
        self.by_thread.get(thread_id).and_then(|key| self.conversations.get(key))
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn draft(&self) -> &str {
        self.active().map(|c| c.draft.as_str()).unwrap_or("")
    }

    pub fn set_draft(&mut self, text: &str) {
        if let Some(conv) = self.active_mut() {
            conv.draft = text.to_string();
        }
    }

    fn alloc_key(&mut self) -> ConversationKey {
        let key = ConversationKey(self.next_key);
        self.next_key = self.next_key.saturating_add(1);
        key
    }

    fn activate(&mut self, key: ConversationKey) {
        self.active = Some(key);
        self.generation = self.generation.wrapping_add(1);
        self.error_message = None;
        self.loading_messages = false;
    }

    /// Replaces the sidebar and makes sure every listed thread has a
    /// conversation. A provisional conversation with the same counterparty and
    /// listing adopts the listed thread.
    pub fn replace_threads(&mut self, summaries: Vec<ThreadSummary>) {
        for summary in &summaries {
            let thread = &summary.thread;
            if let Some(key) = self.by_thread.get(&thread.id).copied() {
                if let Some(conv) = self.conversations.get_mut(&key) {
                    conv.counterparty = summary.other.clone();
                }
                continue;
            }

            let adoptable = self
                .conversations
                .values()
                .find(|c| {
                    !c.is_persisted()
                        && c.counterparty.id == summary.other.id
                        && c.listing_id == thread.listing_id
                })
                .map(|c| c.key);
            let key = match adoptable {
                Some(key) => {
                    debug!("[INBOX] {} adopts listed thread {}", key, thread.id);
                    key
                }
                None => {
                    let key = self.alloc_key();
                    self.conversations.insert(
                        key,
                        Conversation {
                            key,
                            status: ThreadStatus::Persisted(thread.id.clone()),
                            owner_id: thread.owner_id.clone(),
                            counterparty: summary.other.clone(),
                            listing_id: thread.listing_id.clone(),
                            messages: MessageList::new(),
                            draft: String::new(),
                            loaded: false,
                        },
                    );
                    key
                }
            };
            self.mark_persisted(key, thread.id.clone());
        }
        self.threads.replace(summaries);
    }

    /// Activates a listed thread.
    pub fn select_thread(&mut self, thread_id: &ThreadId) -> Option<ConversationKey> {
        let key = self.by_thread.get(thread_id).copied()?;
        self.activate(key);
        Some(key)
    }

    /// Activates the conversation with `counterparty`, creating a provisional
    /// one when none exists. Nothing is written to the backend here.
    pub fn open_conversation(
        &mut self,
        me: &UserId,
        counterparty: Profile,
        listing: Option<ListingId>,
    ) -> ConversationKey {
        // sidebar order first, so the most recent matching thread wins
        let listed = self
            .threads
            .threads()
            .iter()
            .filter(|s| s.other.id == counterparty.id)
            .filter(|s| listing.is_none() || s.thread.listing_id == listing)
            .find_map(|s| self.by_thread.get(&s.thread.id).copied());
        let existing = listed.or_else(|| {
            self.conversations
                .values()
                .filter(|c| c.matches(&counterparty.id, listing.as_ref()))
                .map(|c| c.key)
                .min()
        });

        let key = match existing {
            Some(key) => key,
            None => {
                let key = self.alloc_key();
                debug!("[INBOX] New provisional {} with {}", key, counterparty.id);
                self.conversations.insert(
                    key,
                    Conversation {
                        key,
                        status: ThreadStatus::Provisional,
                        owner_id: me.clone(),
                        counterparty,
                        listing_id: listing,
                        messages: MessageList::new(),
                        draft: String::new(),
                        loaded: true,
                    },
                );
                key
            }
        };
        self.activate(key);
        key
    }

    /// Step one of a send: validates, appends the provisional message to the
    /// active conversation and clears its draft.
    pub fn begin_send(&mut self, sender: &UserId, text: &str) -> Result<PendingSend, SendError> {
        let body = text.trim();
        if body.is_empty() {
            return Err(SendError::EmptyBody);
        }
        let generation = self.generation;
        let conv = self.active_mut().ok_or(SendError::NoActiveConversation)?;

        let client_id = ClientMessageId::new();
        conv.messages
            .push_provisional(client_id, sender.clone(), body.to_string(), now_millis());
        conv.draft.clear();
        let key = conv.key;

        self.in_flight += 1;
        self.error_message = None;
        Ok(PendingSend {
            key,
            client_id,
            sender_id: sender.clone(),
            body: body.to_string(),
            generation,
        })
    }

    pub fn thread_target(&self, key: ConversationKey) -> ThreadTarget {
        match self.conversations.get(&key) {
            None => ThreadTarget::Gone,
            Some(conv) => match &conv.status {
                ThreadStatus::Persisted(id) => ThreadTarget::Ready(id.clone()),
                ThreadStatus::Provisional => ThreadTarget::Create {
                    owner: conv.owner_id.clone(),
                    counterparty: conv.counterparty.id.clone(),
                    listing: conv.listing_id.clone(),
                },
            },
        }
    }

    /// Provisional -> persisted. Returns false if the conversation is gone.
    pub fn mark_persisted(&mut self, key: ConversationKey, thread_id: ThreadId) -> bool {
        let Some(conv) = self.conversations.get_mut(&key) else {
            return false;
        };
        if let ThreadStatus::Persisted(previous) = &conv.status {
            if previous != &thread_id {
                self.by_thread.remove(previous);
            }
        }
        conv.status = ThreadStatus::Persisted(thread_id.clone());
        self.by_thread.insert(thread_id, key);
        true
    }

    /// Successful send: swaps the provisional message for the stored copy.
    pub fn confirm_send(&mut self, pending: &PendingSend, stored: StoredMessage) -> Option<Reconciliation> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let conv = self.conversations.get_mut(&pending.key)?;
        let outcome = conv.messages.reconcile(&pending.client_id, stored);
        debug!("[INBOX] {} reconciled {}: {:?}", pending.key, pending.client_id, outcome);
        Some(outcome)
    }

    /// Failed send: removes the provisional message and gives its text back to
    /// the conversation's draft. The error banner is only raised when the
    /// conversation is still the one on screen. Returns whether the draft was
    /// restored.
    pub fn fail_send(&mut self, pending: &PendingSend, error: &SendError) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let still_viewed = self.is_current(pending.generation) && self.active == Some(pending.key);
        let Some(conv) = self.conversations.get_mut(&pending.key) else {
            return false;
        };
        let restored = match conv.messages.remove_provisional(&pending.client_id) {
            Some(body) => {
                if conv.draft.trim().is_empty() {
                    conv.draft = body;
                } else {
                    conv.draft = format!("{} {}", body, conv.draft);
                }
                true
            }
            None => false,
        };
        if still_viewed {
            self.error_message = Some(error.to_string());
        }
        restored
    }

    /// Applies a message fetch started at `generation`. Stale results (the
    /// user switched conversation meanwhile) are dropped.
    pub fn apply_messages(&mut self, key: ConversationKey, generation: u64, fetched: Vec<StoredMessage>) -> bool {
        if !self.is_current(generation) {
            debug!("[INBOX] Dropping stale fetch for {}", key);
            return false;
        }
        self.loading_messages = false;
        match self.conversations.get_mut(&key) {
            Some(conv) => {
                conv.messages.merge_fetched(fetched);
                conv.loaded = true;
                true
            }
            None => false,
        }
    }

    /// A stored message delivered outside the send pipeline.
    pub fn ingest_message(&mut self, stored: StoredMessage) -> bool {
        let Some(key) = self.by_thread.get(&stored.thread_id).copied() else {
            return false;
        };
        self.conversations
            .get_mut(&key)
            .map(|conv| conv.messages.ingest(stored))
            .unwrap_or(false)
    }

    /// Drops everything tied to the signed-in user. Sends still in flight keep
    /// their count until they settle.
    pub fn reset(&mut self) {
        self.threads.clear();
        self.conversations.clear();
        self.by_thread.clear();
        self.active = None;
        self.generation = self.generation.wrapping_add(1);
        self.loading_threads = false;
        self.loading_messages = false;
        self.error_message = None;
        self.search_results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BackendError, MessageId, Role, Thread};

    fn me() -> UserId {
        UserId::from("bob")
    }

    fn profile(id: &str) -> Profile {
        Profile {
            id: UserId::from(id),
            email: format!("{}@ryd.test", id),
            username: id.to_string(),
            display_name: String::new(),
            role: Role::Owner,
        }
    }

    fn listed(thread: &str, other: &str) -> ThreadSummary {
        ThreadSummary {
            thread: Thread {
                id: ThreadId::from(thread),
                owner_id: me(),
                counterparty_id: UserId::from(other),
                listing_id: None,
                last_message: None,
                created_at: 1,
                updated_at: 1,
            },
            other: profile(other),
        }
    }

    fn stored(id: &str, thread: &str, body: &str) -> StoredMessage {
        StoredMessage {
            id: MessageId::from(id),
            thread_id: ThreadId::from(thread),
            sender_id: me(),
            body: body.to_string(),
            created_at: 5,
        }
    }

    fn bodies(state: &InboxState) -> Vec<String> {
        state
            .active()
            .map(|c| c.messages.items().iter().map(|m| m.body().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn send_without_conversation_is_rejected() {
        let mut state = InboxState::new();
        assert_eq!(state.begin_send(&me(), "hi"), Err(SendError::NoActiveConversation));
        state.open_conversation(&me(), profile("alice"), None);
        assert_eq!(state.begin_send(&me(), "   \n"), Err(SendError::EmptyBody));
        assert_eq!(state.in_flight(), 0);
    }

    #[test]
    fn begin_send_appends_pending_and_clears_draft() {
        let mut state = InboxState::new();
        state.open_conversation(&me(), profile("alice"), None);
        state.set_draft("  Hi Alice ");
        let typed = state.draft().to_string();
        let pending = state.begin_send(&me(), &typed).unwrap();

        assert_eq!(pending.body, "Hi Alice");
        assert_eq!(state.draft(), "");
        assert!(state.is_sending());
        let conv = state.active().unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.messages.items()[0].is_pending());
        assert_eq!(state.thread_target(pending.key), ThreadTarget::Create {
            owner: me(),
            counterparty: UserId::from("alice"),
            listing: None,
        });
    }

    #[test]
    fn opening_same_counterparty_reuses_conversation() {
        let mut state = InboxState::new();
        let first = state.open_conversation(&me(), profile("alice"), None);
        let gen = state.generation();
        let second = state.open_conversation(&me(), profile("alice"), None);
        assert_eq!(first, second);
        assert!(state.generation() > gen);
        assert_eq!(state.conversation_count(), 1);
    }

    #[test]
    fn open_prefers_listed_thread() {
        let mut state = InboxState::new();
        state.replace_threads(vec![listed("t1", "alice")]);
        let key = state.open_conversation(&me(), profile("alice"), None);
        assert_eq!(state.conversation(key).unwrap().thread_id(), Some(&ThreadId::from("t1")));
    }

    #[test]
    fn listing_adopts_provisional_conversation() {
        let mut state = InboxState::new();
        let key = state.open_conversation(&me(), profile("alice"), None);
        state.replace_threads(vec![listed("t9", "alice")]);
        assert_eq!(state.conversation_count(), 1);
        assert_eq!(state.thread_target(key), ThreadTarget::Ready(ThreadId::from("t9")));
        assert_eq!(state.conversation_for_thread(&ThreadId::from("t9")).unwrap().key, key);
    }

    #[test]
    fn failure_restores_draft_and_raises_banner() {
        let mut state = InboxState::new();
        state.open_conversation(&me(), profile("alice"), None);
        let pending = state.begin_send(&me(), "Hi Alice").unwrap();

        let err = SendError::CreateThread(BackendError::Network("offline".into()));
        assert!(state.fail_send(&pending, &err));

        assert!(bodies(&state).is_empty());
        assert_eq!(state.draft(), "Hi Alice");
        assert!(state.error_message.as_deref().unwrap().contains("offline"));
        assert!(!state.is_sending());
    }

    #[test]
    fn failure_after_switching_only_touches_offscreen_state() {
        let mut state = InboxState::new();
        let alice = state.open_conversation(&me(), profile("alice"), None);
        let pending = state.begin_send(&me(), "Hi Alice").unwrap();
        state.open_conversation(&me(), profile("carol"), None);

        let err = SendError::CreateMessage(BackendError::Network("offline".into()));
        state.fail_send(&pending, &err);

        assert!(state.error_message.is_none());
        assert_eq!(state.draft(), "");
        assert_eq!(state.conversation(alice).unwrap().draft, "Hi Alice");
    }

    #[test]
    fn restored_text_keeps_newer_typing() {
        let mut state = InboxState::new();
        state.open_conversation(&me(), profile("alice"), None);
        let pending = state.begin_send(&me(), "first").unwrap();
        state.set_draft("second");
        state.fail_send(&pending, &SendError::CreateMessage(BackendError::Network("x".into())));
        assert_eq!(state.draft(), "first second");
    }

    #[test]
    fn confirm_replaces_pending_message() {
        let mut state = InboxState::new();
        let key = state.open_conversation(&me(), profile("alice"), None);
        let pending = state.begin_send(&me(), "Hi Alice").unwrap();
        assert!(state.mark_persisted(key, ThreadId::from("t1")));

        let outcome = state.confirm_send(&pending, stored("m1", "t1", "Hi Alice"));
        assert_eq!(outcome, Some(Reconciliation::Replaced));
        let conv = state.active().unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(!conv.messages.items()[0].is_pending());
        assert!(conv.is_persisted());
    }

    #[test]
    fn stale_fetch_is_dropped() {
        let mut state = InboxState::new();
        state.replace_threads(vec![listed("t1", "alice"), listed("t2", "carol")]);
        let k1 = state.select_thread(&ThreadId::from("t1")).unwrap();
        let gen = state.generation();
        state.select_thread(&ThreadId::from("t2"));

        assert!(!state.apply_messages(k1, gen, vec![stored("m1", "t1", "old")]));
        assert!(state.conversation(k1).unwrap().messages.is_empty());
    }

    #[test]
    fn ingest_routes_by_thread() {
        let mut state = InboxState::new();
        state.replace_threads(vec![listed("t1", "alice")]);
        assert!(state.ingest_message(stored("m1", "t1", "ping")));
        assert!(!state.ingest_message(stored("m1", "t1", "ping")));
        assert!(!state.ingest_message(stored("m2", "unknown", "ping")));
    }

    #[test]
    fn reset_forgets_conversations_but_not_in_flight() {
        let mut state = InboxState::new();
        state.open_conversation(&me(), profile("alice"), None);
        let pending = state.begin_send(&me(), "Hi").unwrap();
        state.reset();

        assert_eq!(state.thread_target(pending.key), ThreadTarget::Gone);
        assert!(state.is_sending());
        assert_eq!(state.confirm_send(&pending, stored("m1", "t1", "Hi")), None);
        assert!(!state.is_sending());
    }
}
