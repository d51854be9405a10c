use crate::common::{ThreadId, ThreadSummary, UserId};

/// Sidebar list of the signed-in user's threads.
///
/// Only ever replaced wholesale from a backend listing; the store keeps it
/// ordered most recent first.
#[derive(Debug, Clone, Default)]
pub struct ThreadStore {
    threads: Vec<ThreadSummary>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, mut threads: Vec<ThreadSummary>) {
        // stable sort keeps the backend's order among equal timestamps
        threads.sort_by(|a, b| b.thread.activity_at().cmp(&a.thread.activity_at()));
        self.threads = threads;
    }

    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn get(&self, id: &ThreadId) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| &t.thread.id == id)
    }

    /// First (most recent) thread whose other participant is `user`.
    pub fn find_by_counterparty(&self, user: &UserId) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| &t.other.id == user)
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}
