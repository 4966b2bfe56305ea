//! Response composer: builds the outbound MIME message and, in live mode,
//! hands it to the transport.
//!
//! Dry-run and live share every step up to the final `send` call, so a
//! dry run exercises exactly the formatting a live run would transmit.

use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use tracing::info;

use crate::channels::MailTransport;
use crate::config::Mode;
use crate::error::TransportError;
use crate::pipeline::dispatch::Response;

/// A fully built plain-text message.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    message: Message,
}

impl ComposedMessage {
    /// The underlying MIME message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The message rendered as RFC 5322 bytes.
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// What happened to a composed message.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Built and logged, deliberately not transmitted.
    DryRun(ComposedMessage),
    /// Handed to the transport successfully.
    Sent(ComposedMessage),
}

impl Delivery {
    pub fn message(&self) -> &ComposedMessage {
        match self {
            Self::DryRun(m) | Self::Sent(m) => m,
        }
    }
}

/// Builds outbound messages from a fixed bot identity.
#[derive(Debug, Clone)]
pub struct Composer {
    from: String,
    mode: Mode,
}

impl Composer {
    pub fn new(from: impl Into<String>, mode: Mode) -> Self {
        Self {
            from: from.into(),
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Build the MIME message for a response.
    pub fn compose(&self, response: &Response) -> Result<ComposedMessage, TransportError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| TransportError::Build(format!("invalid from address {}: {e}", self.from)))?;
        let to: Mailbox = response
            .to
            .parse()
            .map_err(|e| TransportError::Build(format!("invalid to address {}: {e}", response.to)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(response.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(response.body.clone())
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(ComposedMessage {
            to: response.to.clone(),
            from: self.from.clone(),
            subject: response.subject.clone(),
            body: response.body.clone(),
            message,
        })
    }

    /// Compose, log, and transmit unless in dry-run mode.
    pub async fn deliver(
        &self,
        transport: &dyn MailTransport,
        response: &Response,
    ) -> Result<Delivery, TransportError> {
        let composed = self.compose(response)?;

        info!(
            to = %composed.to,
            subject = %composed.subject,
            dry_run = self.mode.is_dry_run(),
            "Composed message:\n{}",
            String::from_utf8_lossy(&composed.formatted())
        );

        match self.mode {
            Mode::DryRun => Ok(Delivery::DryRun(composed)),
            Mode::Live => {
                transport.send(&composed).await?;
                info!(to = %composed.to, transport = transport.name(), "Message sent");
                Ok(Delivery::Sent(composed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MemoryTransport;

    fn response() -> Response {
        Response {
            to: "eng1@x.com".into(),
            subject: "hp_bot:status = ok".into(),
            body: "hp_bot:status = ok".into(),
        }
    }

    #[test]
    fn compose_sets_headers() {
        let composer = Composer::new("robot-db@gmail.com", Mode::DryRun);
        let composed = composer.compose(&response()).unwrap();
        assert_eq!(composed.from, "robot-db@gmail.com");
        assert_eq!(composed.to, "eng1@x.com");

        let rendered = String::from_utf8(composed.formatted()).unwrap();
        assert!(rendered.contains("From: robot-db@gmail.com"));
        assert!(rendered.contains("To: eng1@x.com"));
        assert!(rendered.contains("Subject: hp_bot:status = ok"));
        assert!(rendered.contains("Content-Type: text/plain"));
        assert!(rendered.contains("hp_bot:status = ok"));
    }

    #[test]
    fn compose_rejects_bad_recipient() {
        let composer = Composer::new("robot-db@gmail.com", Mode::DryRun);
        let mut bad = response();
        bad.to = "not an address".into();
        assert!(matches!(
            composer.compose(&bad),
            Err(TransportError::Build(_))
        ));
    }

    #[tokio::test]
    async fn dry_run_never_transmits() {
        let transport = MemoryTransport::new();
        let composer = Composer::new("robot-db@gmail.com", Mode::DryRun);

        let delivery = composer.deliver(&transport, &response()).await.unwrap();
        assert!(matches!(delivery, Delivery::DryRun(_)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn dry_run_matches_live_composition() {
        let dry = Composer::new("robot-db@gmail.com", Mode::DryRun);
        let live = Composer::new("robot-db@gmail.com", Mode::Live);
        let transport = MemoryTransport::new();

        let a = dry.deliver(&transport, &response()).await.unwrap();
        let b = live.deliver(&transport, &response()).await.unwrap();
        assert!(matches!(b, Delivery::Sent(_)));

        let (a, b) = (a.message(), b.message());
        assert_eq!(a.to, b.to);
        assert_eq!(a.from, b.from);
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.body, b.body);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn live_send_failure_is_reported() {
        let transport = MemoryTransport::new();
        transport.fail_sends(true);
        let composer = Composer::new("robot-db@gmail.com", Mode::Live);

        let err = composer.deliver(&transport, &response()).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed { .. }));
    }
}
