//! Poll loop: drains unread messages through
//! normalize → parse → gate → dispatch → compose, one at a time.
//!
//! Cycles never overlap: each one runs to completion, including per-message
//! error handling, before the loop sleeps and lists again. A failed message
//! is logged and skipped; a failed cycle is logged and retried after sleeping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::channels::{MailTransport, MessageRef};
use crate::config::BotConfig;
use crate::error::{CycleError, MessageError};
use crate::pipeline::command::parse;
use crate::pipeline::composer::{Composer, Delivery};
use crate::pipeline::dispatch::{Action, Dispatcher};
use crate::pipeline::gate::Gate;
use crate::pipeline::normalize::extract;
use crate::table::{CredentialStore, Tables};

/// How a message left the pipeline when it produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Replied,
    Forwarded,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unread messages listed at the start of the cycle.
    pub listed: usize,
    pub replied: usize,
    pub forwarded: usize,
    /// Malformed, unauthorized or rate-limited: silently dropped.
    pub dropped: usize,
    /// Transport failures (fetch, mark-read or send).
    pub failed: usize,
}

/// Owns the credential store and drives the pipeline.
pub struct PollLoop {
    transport: Arc<dyn MailTransport>,
    credentials: CredentialStore,
    gate: Gate,
    dispatcher: Dispatcher,
    composer: Composer,
    poll_interval: Duration,
}

impl PollLoop {
    pub fn new(config: &BotConfig, tables: Tables, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            credentials: tables.credentials,
            gate: Gate::new(config.cooldown, &config.from_address),
            dispatcher: Dispatcher::new(&config.operator_address, tables.bots, tables.entities),
            composer: Composer::new(&config.from_address, config.mode),
            poll_interval: config.poll_interval,
        }
    }

    /// Current per-sender state.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Poll forever. Only external termination stops this.
    pub async fn run(&mut self) {
        info!(
            transport = self.transport.name(),
            interval_secs = self.poll_interval.as_secs(),
            dry_run = self.composer.mode().is_dry_run(),
            "Poll loop started"
        );

        loop {
            let span = info_span!("poll_cycle", cycle = %Uuid::new_v4());
            match self.run_cycle().instrument(span).await {
                Ok(report) if report.listed > 0 => {
                    info!(
                        listed = report.listed,
                        replied = report.replied,
                        forwarded = report.forwarded,
                        dropped = report.dropped,
                        failed = report.failed,
                        "Poll cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Poll cycle failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Process every currently-unread message once.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let unread = self.transport.list_unread().await.map_err(CycleError::List)?;

        let mut report = CycleReport {
            listed: unread.len(),
            ..CycleReport::default()
        };
        if unread.is_empty() {
            return Ok(report);
        }
        debug!(count = unread.len(), "Fetched unread messages");

        for message_ref in &unread {
            match self.process_message(message_ref).await {
                Ok(MessageOutcome::Replied) => report.replied += 1,
                Ok(MessageOutcome::Forwarded) => report.forwarded += 1,
                Err(MessageError::Parse(e)) => {
                    info!(id = %message_ref.id, reason = %e, "Dropping message");
                    report.dropped += 1;
                }
                Err(MessageError::Authorization(e)) => {
                    info!(id = %message_ref.id, reason = %e, "Ignoring request");
                    report.dropped += 1;
                }
                Err(MessageError::Transport(e)) => {
                    warn!(id = %message_ref.id, error = %e, "Transport failure while handling message");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run one message through the pipeline.
    ///
    /// The message is marked read right after its headers are extracted,
    /// before anything can reject it, so it is never seen twice.
    pub async fn process_message(
        &mut self,
        message_ref: &MessageRef,
    ) -> Result<MessageOutcome, MessageError> {
        let fetched = self.transport.fetch(&message_ref.id).await?;
        let extracted = extract(&fetched);
        self.transport.mark_read(&message_ref.id).await?;
        let inbound = extracted?;

        info!(
            id = %inbound.id,
            subject = %inbound.subject,
            sender = %inbound.sender,
            "Trying request"
        );

        let request = parse(&inbound.subject)?;
        let role = self.gate.admit(&self.credentials, &inbound, &request)?;
        let decision = self.dispatcher.dispatch(role, &inbound, &request)?;

        // Committed before sending; a failed send does not refund the window.
        if decision.consumes_cooldown {
            self.gate.commit(&mut self.credentials, &inbound);
        }

        let delivery = self
            .composer
            .deliver(self.transport.as_ref(), decision.action.response())
            .await?;
        if let Delivery::DryRun(message) = &delivery {
            debug!(to = %message.to, "Dry run, message not transmitted");
        }

        Ok(match decision.action {
            Action::Reply(_) => MessageOutcome::Replied,
            Action::Forward(_) => MessageOutcome::Forwarded,
        })
    }
}
