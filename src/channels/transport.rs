//! Mail transport abstraction: pure I/O, no business logic.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::pipeline::composer::ComposedMessage;

/// Opaque handle to an unread message, as listed by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub id: String,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A single raw header as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// A fetched message: its id and raw headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub id: String,
    pub headers: Vec<MessageHeader>,
}

impl FetchedMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(MessageHeader {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Mailbox operations the poll loop needs.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logging (e.g. "imap", "memory").
    fn name(&self) -> &str;

    /// List unread messages in the configured mailbox.
    async fn list_unread(&self) -> Result<Vec<MessageRef>, TransportError>;

    /// Fetch a message's headers without changing its read state.
    async fn fetch(&self, id: &str) -> Result<FetchedMessage, TransportError>;

    /// Clear the unread flag.
    async fn mark_read(&self, id: &str) -> Result<(), TransportError>;

    /// Transmit a fully composed message.
    async fn send(&self, message: &ComposedMessage) -> Result<(), TransportError>;
}
