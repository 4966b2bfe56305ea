//! Mail transports.

pub mod imap;
pub mod memory;
pub mod transport;

pub use imap::ImapSmtpTransport;
pub use memory::MemoryTransport;
pub use transport::{FetchedMessage, MailTransport, MessageHeader, MessageRef};
