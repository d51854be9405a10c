use crate::common::{ClientMessageId, MessageId, StoredMessage, UserId};

/// A message as the conversation view holds it.
///
/// `Provisional` exists only on this client, between the user pressing send
/// and the backend acknowledging the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Provisional {
        client_id: ClientMessageId,
        sender_id: UserId,
        body: String,
        created_at: i64,
    },
    Confirmed(StoredMessage),
}

impl ChatMessage {
    pub fn body(&self) -> &str {
        match self {
            ChatMessage::Provisional { body, .. } => body,
            ChatMessage::Confirmed(m) => &m.body,
        }
    }

    pub fn sender_id(&self) -> &UserId {
        match self {
            ChatMessage::Provisional { sender_id, .. } => sender_id,
            ChatMessage::Confirmed(m) => &m.sender_id,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            ChatMessage::Provisional { created_at, .. } => *created_at,
            ChatMessage::Confirmed(m) => m.created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ChatMessage::Provisional { .. })
    }

    pub fn server_id(&self) -> Option<&MessageId> {
        match self {
            ChatMessage::Provisional { .. } => None,
            ChatMessage::Confirmed(m) => Some(&m.id),
        }
    }

    fn has_client_id(&self, id: &ClientMessageId) -> bool {
        matches!(self, ChatMessage::Provisional { client_id, .. } if client_id == id)
    }
}

/// Outcome of reconciling a provisional message with its stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The provisional entry was replaced in place.
    Replaced,
    /// The stored copy was already present; the provisional entry was dropped.
    AlreadyPresent,
    /// The provisional entry was gone (list reset); the stored copy was appended.
    Appended,
}

/// Ordered messages of one thread.
///
/// Every operation that touches a provisional entry is keyed by its
/// [`ClientMessageId`], never by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    items: Vec<ChatMessage>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ChatMessage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|m| m.is_pending()).count()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.items.last()
    }

    pub fn push_provisional(&mut self, client_id: ClientMessageId, sender_id: UserId, body: String, created_at: i64) {
        self.items.push(ChatMessage::Provisional {
            client_id,
            sender_id,
            body,
            created_at,
        });
    }

    fn contains_server_id(&self, id: &MessageId) -> bool {
        self.items.iter().any(|m| m.server_id() == Some(id))
    }

    fn position_of(&self, client_id: &ClientMessageId) -> Option<usize> {
        self.items.iter().position(|m| m.has_client_id(client_id))
    }

    /// Swaps the provisional entry `client_id` for `stored`, keeping its slot.
    pub fn reconcile(&mut self, client_id: &ClientMessageId, stored: StoredMessage) -> Reconciliation {
        let already_present = self.contains_server_id(&stored.id);
        match (self.position_of(client_id), already_present) {
            (Some(pos), false) => {
                self.items[pos] = ChatMessage::Confirmed(stored);
                Reconciliation::Replaced
            }
            (Some(pos), true) => {
                self.items.remove(pos);
                Reconciliation::AlreadyPresent
            }
            (None, true) => Reconciliation::AlreadyPresent,
            (None, false) => {
                self.items.push(ChatMessage::Confirmed(stored));
                Reconciliation::Appended
            }
        }
    }

    /// Drops the provisional entry and hands back its body for the draft.
    pub fn remove_provisional(&mut self, client_id: &ClientMessageId) -> Option<String> {
        let pos = self.position_of(client_id)?;
        match self.items.remove(pos) {
            ChatMessage::Provisional { body, .. } => Some(body),
            ChatMessage::Confirmed(_) => None,
        }
    }

    /// Adds a message that arrived from elsewhere unless it is already listed.
    /// Returns whether the list changed.
    pub fn ingest(&mut self, stored: StoredMessage) -> bool {
        if self.contains_server_id(&stored.id) {
            return false;
        }
        self.items.push(ChatMessage::Confirmed(stored));
        true
    }

    /// Merges a fetched snapshot into the list. Confirmed messages the
    /// snapshot does not contain yet (confirmed or ingested while the fetch
    /// was in flight) are kept; duplicates collapse on the server id. The
    /// confirmed part ends up in `created_at` order with provisional entries
    /// after it, in their original order.
    pub fn merge_fetched(&mut self, fetched: Vec<StoredMessage>) {
        let mut confirmed: Vec<StoredMessage> = fetched;
        let mut pending = Vec::new();
        for item in self.items.drain(..) {
            match item {
                ChatMessage::Provisional { .. } => pending.push(item),
                ChatMessage::Confirmed(local) => {
                    if !confirmed.iter().any(|m| m.id == local.id) {
                        confirmed.push(local);
                    }
                }
            }
        }
        // stable: equal timestamps keep snapshot order first
        confirmed.sort_by_key(|m| m.created_at);
        self.items = confirmed.into_iter().map(ChatMessage::Confirmed).collect();
        self.items.extend(pending);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
