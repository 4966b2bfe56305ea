//! IMAP (inbound) + SMTP via lettre (outbound).
//!
//! IMAP is spoken directly over rustls. One logged-in session is kept
//! across calls and reopened only after the connection drops. Blocking I/O
//! runs in `spawn_blocking`.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::auth::{Credential, CredentialProvider};
use crate::channels::transport::{FetchedMessage, MailTransport, MessageRef};
use crate::config::MailServerConfig;
use crate::error::TransportError;
use crate::pipeline::composer::ComposedMessage;

/// Headers the pipeline reads from every message.
const WANTED_HEADERS: [&str; 3] = ["Subject", "Date", "From"];

const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Transport backed by an IMAP mailbox and an SMTP relay.
pub struct ImapSmtpTransport {
    server: MailServerConfig,
    mailbox: String,
    credentials: Arc<dyn CredentialProvider>,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapSmtpTransport {
    pub fn new(
        server: MailServerConfig,
        mailbox: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            server,
            mailbox: mailbox.into(),
            credentials,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `op` on the shared session, opening it first if needed.
    ///
    /// If a reused session turns out to be dead, `op` is retried once on a
    /// fresh connection. Every IMAP operation here is idempotent.
    async fn with_session<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: Fn(&mut ImapSession) -> Result<T, TransportError> + Send + 'static,
    {
        let credential = self.credentials.valid_credential().await?;
        let server = self.server.clone();
        let mailbox = self.mailbox.clone();
        let shared = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let mut slot = shared.lock().unwrap_or_else(|e| e.into_inner());
            let reused = slot.is_some();
            match run_in_session(&mut slot, &server, &credential, &mailbox, &op) {
                Err(e) if reused && is_connection_lost(&e) => {
                    debug!(host = %server.imap_host, error = %e, "IMAP session lost, reconnecting");
                    run_in_session(&mut slot, &server, &credential, &mailbox, &op)
                }
                result => result,
            }
        })
        .await
        .map_err(|e| TransportError::Panicked(e.to_string()))?
    }
}

/// Take the cached session (or open one), run `op`, and put the session
/// back unless its connection failed.
fn run_in_session<T>(
    slot: &mut Option<ImapSession>,
    server: &MailServerConfig,
    credential: &Credential,
    mailbox: &str,
    op: &dyn Fn(&mut ImapSession) -> Result<T, TransportError>,
) -> Result<T, TransportError> {
    let mut session = match slot.take() {
        Some(session) => session,
        None => ImapSession::open(server, credential, mailbox)?,
    };
    let result = op(&mut session);
    match &result {
        Err(e) if is_connection_lost(e) => {}
        _ => *slot = Some(session),
    }
    result
}

#[async_trait]
impl MailTransport for ImapSmtpTransport {
    fn name(&self) -> &str {
        "imap"
    }

    async fn list_unread(&self) -> Result<Vec<MessageRef>, TransportError> {
        self.with_session(|session| {
            let response = session.command("UID SEARCH UNSEEN")?;
            Ok(parse_search(&response.lines)
                .into_iter()
                .map(MessageRef::new)
                .collect())
        })
        .await
    }

    async fn fetch(&self, id: &str) -> Result<FetchedMessage, TransportError> {
        let uid = checked_uid(id)?;
        self.with_session(move |session| {
            let response = session.command(&format!("UID FETCH {uid} BODY.PEEK[HEADER]"))?;
            let raw = response
                .literals
                .into_iter()
                .next()
                .ok_or_else(|| TransportError::NotFound(uid.clone()))?;
            Ok(headers_to_message(&uid, &raw))
        })
        .await
    }

    async fn mark_read(&self, id: &str) -> Result<(), TransportError> {
        let uid = checked_uid(id)?;
        self.with_session(move |session| {
            session.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))?;
            Ok(())
        })
        .await
    }

    async fn send(&self, message: &ComposedMessage) -> Result<(), TransportError> {
        let credential = self.credentials.valid_credential().await?;
        let server = self.server.clone();
        let to = message.to.clone();
        let email = message.message().clone();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                credential.username.clone(),
                credential.secret.expose_secret().to_string(),
            );
            let relay = if server.smtp_port == 465 {
                SmtpTransport::relay(&server.smtp_host)
            } else {
                SmtpTransport::starttls_relay(&server.smtp_host)
            };
            let builder = relay.map_err(|e| TransportError::Connect {
                host: server.smtp_host.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?;

            let transport = builder.port(server.smtp_port).credentials(creds).build();
            transport
                .send(&email)
                .map_err(|e| TransportError::SendFailed {
                    to: to.clone(),
                    reason: format!("SMTP send failed: {e}"),
                })?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Panicked(e.to_string()))?
    }
}

// ── IMAP session ────────────────────────────────────────────────────

/// Untagged lines and literals returned by one tagged command.
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapSession {
    tls: TlsStream,
    host: String,
    next_tag: u32,
}

impl ImapSession {
    fn connect(server: &MailServerConfig) -> Result<Self, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            host: server.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((&*server.imap_host, server.imap_port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| connect_err(e.to_string()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(server.imap_host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            host: server.imap_host.clone(),
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") {
            return Err(connect_err(format!("unexpected greeting: {}", greeting.trim())));
        }
        Ok(session)
    }

    fn open(
        server: &MailServerConfig,
        credential: &Credential,
        mailbox: &str,
    ) -> Result<Self, TransportError> {
        let mut session = Self::connect(server)?;
        session.login(credential)?;
        session.select(mailbox)?;
        debug!(host = %server.imap_host, mailbox, "IMAP session opened");
        Ok(session)
    }

    fn login(&mut self, credential: &Credential) -> Result<(), TransportError> {
        let cmd = format!(
            "LOGIN {} {}",
            quote(&credential.username),
            quote(credential.secret.expose_secret())
        );
        self.command(&cmd).map(|_| ()).map_err(|e| match e {
            TransportError::Command { reason, .. } => TransportError::Auth(
                crate::error::AuthError::Rejected {
                    service: format!("imap {}", self.host),
                    reason,
                },
            ),
            other => other,
        })
    }

    fn select(&mut self, mailbox: &str) -> Result<(), TransportError> {
        self.command(&format!("SELECT {}", quote(mailbox))).map(|_| ())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(self.io_err("connection closed")),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(self.io_err(&e.to_string())),
            }
        }
    }

    /// Send a tagged command and collect everything up to its completion line.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, TransportError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        // Never log LOGIN arguments.
        let verb = cmd.split_whitespace().next().unwrap_or_default().to_string();
        let full = format!("{tag} {cmd}\r\n");
        self.tls
            .write_all(full.as_bytes())
            .and_then(|()| self.tls.flush())
            .map_err(|e| self.io_err(&e.to_string()))?;

        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.tls
                    .read_exact(&mut literal)
                    .map_err(|e| self.io_err(&e.to_string()))?;
                response.literals.push(literal);
                response.lines.push(line);
                continue;
            }
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(TransportError::Command {
                    command: verb,
                    reason: status.trim().to_string(),
                });
            }
            response.lines.push(line);
        }
    }

    fn io_err(&self, reason: &str) -> TransportError {
        TransportError::Connect {
            host: self.host.clone(),
            reason: reason.to_string(),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Socket or TLS failure; the session cannot be reused. A tagged `NO`/`BAD`
/// leaves the connection usable.
fn is_connection_lost(err: &TransportError) -> bool {
    matches!(err, TransportError::Connect { .. })
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Length of a trailing `{n}` literal marker, if the line announces one.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let open = trimmed.rfind('{')?;
    let inner = trimmed[open + 1..].strip_suffix('}')?;
    inner.parse().ok()
}

/// Collect UIDs from `* SEARCH` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// UIDs are digits only; anything else would let an id smuggle IMAP syntax.
fn checked_uid(id: &str) -> Result<String, TransportError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id.to_string())
    } else {
        Err(TransportError::NotFound(id.to_string()))
    }
}

/// Turn a raw header block into a `FetchedMessage`. The subject is decoded
/// (RFC 2047); `Date` and `From` are kept raw for the normalizer.
fn headers_to_message(uid: &str, raw: &[u8]) -> FetchedMessage {
    let mut message = FetchedMessage::new(uid);
    let Some(parsed) = MessageParser::default().parse_headers(raw) else {
        return message;
    };

    for name in WANTED_HEADERS {
        let value = if name == "Subject" {
            parsed.subject().map(str::to_string)
        } else {
            parsed.header_raw(name).map(|v| v.trim().to_string())
        };
        if let Some(value) = value {
            message = message.with_header(name, value);
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_failures_discard_the_session() {
        assert!(is_connection_lost(&TransportError::Connect {
            host: "imap.x.com".into(),
            reason: "connection closed".into(),
        }));
        assert!(!is_connection_lost(&TransportError::Command {
            command: "UID".into(),
            reason: "NO no such message".into(),
        }));
        assert!(!is_connection_lost(&TransportError::NotFound("7".into())));
    }

    #[test]
    fn new_transport_starts_without_session() {
        let server = MailServerConfig {
            imap_host: "imap.x.com".into(),
            imap_port: 993,
            smtp_host: "smtp.x.com".into(),
            smtp_port: 587,
        };
        let provider = Arc::new(crate::auth::StaticCredentialProvider::new("bot@x.com", "pw"));
        let transport = ImapSmtpTransport::new(server, "INBOX", provider);
        assert!(transport.session.lock().unwrap().is_none());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("INBOX"), "\"INBOX\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn literal_marker_detected() {
        assert_eq!(
            literal_len("* 1 FETCH (UID 7 BODY[HEADER] {342}\r\n"),
            Some(342)
        );
        assert_eq!(literal_len("* SEARCH 1 2 3\r\n"), None);
        assert_eq!(literal_len("* OK {not a number}\r\n"), None);
    }

    #[test]
    fn search_lines_parsed() {
        let lines = vec![
            "* SEARCH 4 8 15\r\n".to_string(),
            "* 3 EXISTS\r\n".to_string(),
        ];
        assert_eq!(parse_search(&lines), vec!["4", "8", "15"]);
        assert!(parse_search(&["* SEARCH\r\n".to_string()]).is_empty());
    }

    #[test]
    fn uids_must_be_numeric() {
        assert!(checked_uid("42").is_ok());
        assert!(checked_uid("").is_err());
        assert!(checked_uid("1 STORE 2").is_err());
    }

    #[test]
    fn headers_extracted_from_raw_block() {
        let raw = b"From: Eng One <Eng1@X.com>\r\n\
Date: Mon, 1 Jan 2024 10:00:00 +0000\r\n\
Subject: =?utf-8?q?hp=5Fbot:status?=\r\n\
Message-ID: <abc@x.com>\r\n\r\n";
        let msg = headers_to_message("7", raw);

        assert_eq!(msg.id, "7");
        assert_eq!(msg.header("Subject"), Some("hp_bot:status"));
        assert_eq!(msg.header("From"), Some("Eng One <Eng1@X.com>"));
        assert_eq!(msg.header("Date"), Some("Mon, 1 Jan 2024 10:00:00 +0000"));
        assert_eq!(msg.header("Message-ID"), None);
    }
}
