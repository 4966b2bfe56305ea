//! Error types for the mailbot.
//!
//! Only `ConfigError`, `AuthError`, `SourceError` and `DataFormatError` are
//! fatal, and only at startup. Everything else is contained at the message
//! boundary (`MessageError`) or the cycle boundary (`CycleError`).

use std::time::Duration;

/// Top-level error type for the mailbot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Table source error: {0}")]
    Source(#[from] SourceError),

    #[error("Table format error: {0}")]
    DataFormat(#[from] DataFormatError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// The credential collaborator could not produce a usable credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credential: {0}")]
    Missing(String),

    #[error("Credential rejected by {service}: {reason}")]
    Rejected { service: String, reason: String },
}

/// The tabular source could not be fetched at all.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Sheet request failed: {0}")]
    Request(String),

    #[error("Sheet returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to read table file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid table JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

/// The table was fetched but is malformed. The process must not start.
#[derive(Debug, thiserror::Error)]
pub enum DataFormatError {
    #[error("Table is empty (no header row)")]
    MissingHeader,

    #[error("Header has {found} columns, at least {required} required")]
    ShortHeader { found: usize, required: usize },

    #[error("Row {row} has {found} columns, at least {required} required")]
    ShortRow {
        row: usize,
        found: usize,
        required: usize,
    },

    #[error("Row {row} has {found} columns, header only names {named}")]
    LongRow { row: usize, found: usize, named: usize },

    #[error("Row {row} has an empty identifier")]
    EmptyIdentifier { row: usize },

    #[error("Row {row} has role bot but no alias")]
    MissingAlias { row: usize },
}

/// A message's metadata or subject could not be interpreted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Unparseable date: {0}")]
    Date(String),

    #[error("Malformed command: {0}")]
    MalformedCommand(String),
}

/// The sender may not have this command answered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Unknown sender: {0}")]
    UnknownSender(String),

    #[error("Ignoring message sent by our own address")]
    SelfSent,

    #[error("Cooldown active for {sender}, {remaining:?} remaining")]
    CooldownActive { sender: String, remaining: Duration },

    #[error("Role {role} may not request infodump")]
    InfodumpForbidden { role: String },

    #[error("Role {role} may not run {task}:{parameter}")]
    Rejected {
        role: String,
        task: String,
        parameter: String,
    },
}

/// A mail transport operation failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Message {0} not found")]
    NotFound(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send to {to} failed: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport task panicked: {0}")]
    Panicked(String),
}

/// Everything that can end processing of a single message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A whole poll cycle could not run.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Listing unread messages failed: {0}")]
    List(#[source] TransportError),
}

/// Result type alias for the mailbot.
pub type Result<T> = std::result::Result<T, Error>;
