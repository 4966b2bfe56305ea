//! Authorization & cooldown gate.
//!
//! Checks run against the message's own `Date`, not the wall clock, so a
//! backlog drained late is still rate-limited by when it was sent.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::error::AuthorizationError;
use crate::pipeline::command::Request;
use crate::pipeline::normalize::{InboundMessage, normalize};
use crate::table::{CredentialStore, Role};

/// Admits known senders whose cooldown has elapsed.
#[derive(Debug, Clone)]
pub struct Gate {
    cooldown: Duration,
    own_address: String,
}

impl Gate {
    pub fn new(cooldown: Duration, own_address: &str) -> Self {
        Self {
            cooldown,
            own_address: normalize(own_address),
        }
    }

    /// Return the sender's role if the request may proceed to dispatch.
    ///
    /// `infodump` skips the cooldown check but not the sender check.
    pub fn admit(
        &self,
        store: &CredentialStore,
        message: &InboundMessage,
        request: &Request,
    ) -> Result<Role, AuthorizationError> {
        if message.sender == self.own_address {
            return Err(AuthorizationError::SelfSent);
        }

        let record = store
            .get(&message.sender)
            .ok_or_else(|| AuthorizationError::UnknownSender(message.sender.clone()))?;

        if matches!(request, Request::InfoDump) {
            return Ok(record.role);
        }

        if let Some(last) = record.last_query {
            if let Some(remaining) = self.remaining(last, message.timestamp) {
                return Err(AuthorizationError::CooldownActive {
                    sender: message.sender.clone(),
                    remaining,
                });
            }
        }

        Ok(record.role)
    }

    /// Consume the sender's cooldown window. Call only once a response exists.
    pub fn commit(&self, store: &mut CredentialStore, message: &InboundMessage) {
        debug!(sender = %message.sender, at = %message.timestamp, "Cooldown started");
        store.record_query(&message.sender, message.timestamp);
    }

    /// Time left in the window opened at `last`, or `None` if it has elapsed.
    fn remaining(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        let window = TimeDelta::from_std(self.cooldown).unwrap_or(TimeDelta::MAX);
        let elapsed = now.signed_duration_since(last);
        if elapsed >= window {
            return None;
        }
        Some((window - elapsed).to_std().unwrap_or(self.cooldown))
    }
}
