//! In-process mailbox. Backs tests and offline replays of a captured inbox.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::channels::transport::{FetchedMessage, MailTransport, MessageRef};
use crate::error::TransportError;
use crate::pipeline::composer::ComposedMessage;

#[derive(Default)]
struct Mailbox {
    /// Insertion-ordered messages; the key is a sequence number.
    messages: BTreeMap<u64, FetchedMessage>,
    next_seq: u64,
    unread: HashSet<String>,
    /// How many times each id was marked read.
    mark_counts: HashMap<String, usize>,
    sent: Vec<ComposedMessage>,
    fail_list: bool,
    fail_send: bool,
    fail_fetch: HashSet<String>,
}

/// A mailbox held entirely in memory.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Mailbox>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message as unread.
    pub fn deliver(&self, message: FetchedMessage) {
        let mut inner = self.lock();
        inner.unread.insert(message.id.clone());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.insert(seq, message);
    }

    /// Every message handed to `send`, in order.
    pub fn sent(&self) -> Vec<ComposedMessage> {
        self.lock().sent.clone()
    }

    /// Ids still flagged unread.
    pub fn unread_ids(&self) -> Vec<String> {
        let inner = self.lock();
        inner
            .messages
            .values()
            .filter(|m| inner.unread.contains(&m.id))
            .map(|m| m.id.clone())
            .collect()
    }

    /// How many times `mark_read` was called for an id.
    pub fn mark_count(&self, id: &str) -> usize {
        self.lock().mark_counts.get(id).copied().unwrap_or(0)
    }

    pub fn fail_listing(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_send = fail;
    }

    pub fn fail_fetch_of(&self, id: impl Into<String>) {
        self.lock().fail_fetch.insert(id.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mailbox> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_unread(&self) -> Result<Vec<MessageRef>, TransportError> {
        if self.lock().fail_list {
            return Err(TransportError::Command {
                command: "list".into(),
                reason: "injected failure".into(),
            });
        }
        Ok(self.unread_ids().into_iter().map(MessageRef::new).collect())
    }

    async fn fetch(&self, id: &str) -> Result<FetchedMessage, TransportError> {
        let inner = self.lock();
        if inner.fail_fetch.contains(id) {
            return Err(TransportError::Command {
                command: format!("fetch {id}"),
                reason: "injected failure".into(),
            });
        }
        inner
            .messages
            .values()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }

    async fn mark_read(&self, id: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.messages.values().any(|m| m.id == id) {
            return Err(TransportError::NotFound(id.to_string()));
        }
        inner.unread.remove(id);
        *inner.mark_counts.entry(id.to_string()).or_default() += 1;
        Ok(())
    }

    async fn send(&self, message: &ComposedMessage) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.fail_send {
            return Err(TransportError::SendFailed {
                to: message.to.clone(),
                reason: "injected failure".into(),
            });
        }
        inner.sent.push(message.clone());
        Ok(())
    }
}
