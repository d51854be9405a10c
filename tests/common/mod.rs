#![allow(dead_code)]

use async_trait::async_trait;
use ryd_inbox::client::backend::Backend;
use ryd_inbox::client::{ClientConfig, InboxService, Session};
use ryd_inbox::common::{
    now_millis, AuthGrant, BackendError, LastMessage, ListingId, MessageId, Profile, Role, StoredMessage, Thread,
    ThreadId, ThreadSummary, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn profile(id: &str) -> Profile {
    Profile {
        id: UserId::from(id),
        email: format!("{}@ryd.test", id),
        username: id.to_string(),
        display_name: id.to_uppercase(),
        role: Role::Tenant,
    }
}

pub fn session_for(user: &Profile) -> Session {
    Session::start(AuthGrant {
        user: user.clone(),
        token: format!("token-{}", user.id),
        expires_at: now_millis() + 3_600_000,
    })
}

/// Inbox of `me` over `backend`.
pub fn inbox(backend: &Arc<ScriptedBackend>, me: &str) -> InboxService {
    let session = session_for(&profile(me));
    InboxService::new(backend.clone(), session, ClientConfig::default())
}

#[derive(Default)]
struct Script {
    threads: Vec<Thread>,
    messages: Vec<StoredMessage>,
    next_id: u64,
    create_thread_calls: usize,
    create_message_calls: usize,
    fail_create_thread: bool,
    fail_create_message: bool,
    thread_gate: Option<Arc<Notify>>,
    /// Held before the message is stored.
    send_gates: HashMap<String, Arc<Notify>>,
    /// Held after the message is stored, before the call returns.
    ack_gates: HashMap<String, Arc<Notify>>,
    /// Held after the snapshot is taken, before the call returns.
    list_gates: HashMap<ThreadId, Arc<Notify>>,
}

/// In-process backend with failure injection and gates to hold individual
/// calls until a test releases them.
pub struct ScriptedBackend {
    users: Vec<Profile>,
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new(people: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            users: people.iter().map(|p| profile(p)).collect(),
            script: Mutex::new(Script::default()),
        })
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn profile_of(&self, id: &UserId) -> Option<Profile> {
        self.users.iter().find(|p| &p.id == id).cloned()
    }

    pub fn fail_create_thread(&self, fail: bool) {
        self.script().fail_create_thread = fail;
    }

    pub fn fail_create_message(&self, fail: bool) {
        self.script().fail_create_message = fail;
    }

    pub fn gate_thread_creation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().thread_gate = Some(gate.clone());
        gate
    }

    pub fn gate_send(&self, body: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().send_gates.insert(body.to_string(), gate.clone());
        gate
    }

    pub fn gate_ack(&self, body: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().ack_gates.insert(body.to_string(), gate.clone());
        gate
    }

    pub fn gate_list(&self, thread_id: &ThreadId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().list_gates.insert(thread_id.clone(), gate.clone());
        gate
    }

    pub fn seed_thread(&self, owner: &str, counterparty: &str) -> ThreadId {
        let mut script = self.script();
        script.next_id += 1;
        let now = script.next_id as i64;
        let id = ThreadId::new(format!("thread-{}", script.next_id));
        script.threads.push(Thread {
            id: id.clone(),
            owner_id: UserId::from(owner),
            counterparty_id: UserId::from(counterparty),
            listing_id: None,
            last_message: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn thread_count(&self) -> usize {
        self.script().threads.len()
    }

    pub fn create_thread_calls(&self) -> usize {
        self.script().create_thread_calls
    }

    pub fn create_message_calls(&self) -> usize {
        self.script().create_message_calls
    }

    pub fn stored_bodies(&self, thread_id: &ThreadId) -> Vec<String> {
        self.script()
            .messages
            .iter()
            .filter(|m| &m.thread_id == thread_id)
            .map(|m| m.body.clone())
            .collect()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn create_thread(
        &self,
        owner: &UserId,
        counterparty: &UserId,
        listing: Option<&ListingId>,
    ) -> Result<ThreadId, BackendError> {
        let gate = {
            let mut script = self.script();
            script.create_thread_calls += 1;
            script.thread_gate.take()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut script = self.script();
        if script.fail_create_thread {
            return Err(BackendError::Network("connection reset".to_string()));
        }
        script.next_id += 1;
        let now = script.next_id as i64;
        let id = ThreadId::new(format!("thread-{}", script.next_id));
        script.threads.push(Thread {
            id: id.clone(),
            owner_id: owner.clone(),
            counterparty_id: counterparty.clone(),
            listing_id: listing.cloned(),
            last_message: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, BackendError> {
        let gate = {
            let mut script = self.script();
            script.create_message_calls += 1;
            script.send_gates.remove(body)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (stored, ack) = {
            let mut script = self.script();
            if script.fail_create_message {
                return Err(BackendError::Network("timeout".to_string()));
            }
            script.next_id += 1;
            let stored = StoredMessage {
                id: MessageId::new(format!("msg-{}", script.next_id)),
                thread_id: thread_id.clone(),
                sender_id: sender_id.clone(),
                body: body.to_string(),
                created_at: script.next_id as i64,
            };
            let Some(thread) = script.threads.iter_mut().find(|t| &t.id == thread_id) else {
                return Err(BackendError::NotFound(format!("thread {}", thread_id)));
            };
            thread.last_message = Some(LastMessage {
                body: stored.body.clone(),
                sent_at: stored.created_at,
                sender_id: stored.sender_id.clone(),
            });
            thread.updated_at = stored.created_at;
            script.messages.push(stored.clone());
            let ack = script.ack_gates.remove(body);
            (stored, ack)
        };
        if let Some(ack) = ack {
            ack.notified().await;
        }
        Ok(stored)
    }

    async fn list_threads_for_user(&self, user_id: &UserId) -> Result<Vec<ThreadSummary>, BackendError> {
        let threads: Vec<Thread> = self
            .script()
            .threads
            .iter()
            .filter(|t| t.involves(user_id))
            .cloned()
            .collect();
        Ok(threads
            .into_iter()
            .filter_map(|thread| {
                let other = self.profile_of(thread.other_participant(user_id))?;
                Some(ThreadSummary { thread, other })
            })
            .collect())
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, BackendError> {
        // the snapshot is taken before the gate, like a response still on the wire
        let (snapshot, gate) = {
            let mut script = self.script();
            let snapshot: Vec<StoredMessage> = script
                .messages
                .iter()
                .filter(|m| &m.thread_id == thread_id)
                .cloned()
                .collect();
            (snapshot, script.list_gates.remove(thread_id))
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(snapshot)
    }

    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<Profile>, BackendError> {
        let query = query.to_lowercase();
        Ok(self
            .users
            .iter()
            .filter(|p| p.username.contains(&query) || p.email.contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }
}
