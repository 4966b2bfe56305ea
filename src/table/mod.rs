//! Credential and catalog tables, loaded once at startup.
//!
//! The credential store is the only mutable state in the process. It is
//! owned by the poll loop and lent to the gate by `&mut`.

pub mod loader;
pub mod source;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

pub use loader::load_tables;
pub use source::{GoogleSheetSource, JsonFileSource, SheetSource};

/// Attribute name → value, ordered for stable output.
pub type Attributes = BTreeMap<String, String>;

/// Bot alias → attributes. Read-only after load.
pub type BotCatalog = BTreeMap<String, Attributes>;

/// Entity identifier → attributes (including `title`). Read-only after load.
pub type EntityCatalog = BTreeMap<String, Attributes>;

/// Sender role, determining visibility and side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Bot,
    Lead,
    Eng,
}

impl Role {
    /// Parse a normalized role cell. Anything else is not a sender role.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bot" => Some(Self::Bot),
            "lead" => Some(Self::Lead),
            "eng" => Some(Self::Eng),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Lead => "lead",
            Self::Eng => "eng",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-sender authorization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub role: Role,
    /// Timestamp of the last answered request, if any.
    pub last_query: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            last_query: None,
        }
    }
}

/// Normalized sender address → credential record.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    records: HashMap<String, CredentialRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a sender. Returns the previous record, if any.
    pub fn insert(&mut self, sender: String, role: Role) -> Option<CredentialRecord> {
        self.records.insert(sender, CredentialRecord::new(role))
    }

    pub fn remove(&mut self, sender: &str) -> Option<CredentialRecord> {
        self.records.remove(sender)
    }

    pub fn get(&self, sender: &str) -> Option<&CredentialRecord> {
        self.records.get(sender)
    }

    /// Record an answered request. `last_query` never moves backward.
    pub fn record_query(&mut self, sender: &str, at: DateTime<Utc>) {
        if let Some(record) = self.records.get_mut(sender) {
            record.last_query = Some(match record.last_query {
                Some(prev) if prev > at => prev,
                _ => at,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The three maps produced by the table loader.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub credentials: CredentialStore,
    pub bots: BotCatalog,
    pub entities: EntityCatalog,
}
