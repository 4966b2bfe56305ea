//! Message normalizer: pulls sender, subject and timestamp out of a fetched
//! message in canonical form.
//!
//! Pure: marking the message read is the poll loop's job.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::channels::FetchedMessage;
use crate::error::ParseError;

/// `Display Name <addr@host>` → `addr@host`.
static ANGLE_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]*)>").expect("static regex"));

/// Trailing RFC 2822 comment such as `(UTC)` or `(Pacific Standard Time)`.
static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("static regex"));

/// Case-fold and strip all whitespace. Applied identically to table cells,
/// sender addresses and subjects so they compare equal.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A fetched message reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    /// Normalized bare address.
    pub sender: String,
    pub subject_raw: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Extract and normalize `From`, `Subject` and `Date`.
///
/// A missing subject is treated as empty (it will fail command parsing
/// later); a missing or unparseable `From` or `Date` is a `ParseError`.
pub fn extract(message: &FetchedMessage) -> Result<InboundMessage, ParseError> {
    let from = message
        .header("From")
        .ok_or(ParseError::MissingHeader("From"))?;
    let sender = normalize(bare_address(from));
    if sender.is_empty() {
        return Err(ParseError::MissingHeader("From"));
    }

    let subject_raw = message.header("Subject").unwrap_or_default().to_string();
    let subject = normalize(&subject_raw);

    let date = message
        .header("Date")
        .ok_or(ParseError::MissingHeader("Date"))?;
    let timestamp = parse_date(date)?;

    Ok(InboundMessage {
        id: message.id.clone(),
        sender,
        subject_raw,
        subject,
        timestamp,
    })
}

/// Content inside the address delimiters, or the whole value if there are none.
pub fn bare_address(from: &str) -> &str {
    ANGLE_ADDR
        .captures(from)
        .and_then(|c| c.get(1))
        .map_or(from, |m| m.as_str())
}

/// Parse an email `Date` header: RFC 2822 (with or without a trailing
/// comment), falling back to RFC 3339.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = value.trim();
    let without_comment = TRAILING_COMMENT.replace(value, "");

    DateTime::parse_from_rfc2822(&without_comment)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::Date(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(from: &str, subject: &str, date: &str) -> FetchedMessage {
        FetchedMessage::new("m1")
            .with_header("From", from)
            .with_header("Subject", subject)
            .with_header("Date", date)
    }

    #[test]
    fn normalize_folds_case_and_strips_whitespace() {
        assert_eq!(normalize("  HP_Bot : Status\t"), "hp_bot:status");
        assert_eq!(normalize("Eng1@X.COM"), "eng1@x.com");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["Eng1 @X.com", "Robot Kill:3", "İnfo Dump", "\u{a0}A B\u{2003}C"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn variants_normalize_identically() {
        assert_eq!(normalize("Eng1@X.com"), normalize(" eng1@x.COM "));
        assert_eq!(normalize("HP_BOT:STATUS"), normalize("hp_bot : status"));
    }

    #[test]
    fn bare_address_from_display_form() {
        assert_eq!(bare_address("Eng One <eng1@x.com>"), "eng1@x.com");
        assert_eq!(bare_address("<eng1@x.com>"), "eng1@x.com");
        assert_eq!(bare_address("eng1@x.com"), "eng1@x.com");
        assert_eq!(bare_address("\"Doe, J\" <j@x.com>"), "j@x.com");
    }

    #[test]
    fn extract_normalizes_fields() {
        let msg = message(
            "Eng One <Eng1@X.com>",
            "HP_Bot: Status",
            "Mon, 1 Jan 2024 10:00:00 +0000",
        );
        let inbound = extract(&msg).unwrap();
        assert_eq!(inbound.id, "m1");
        assert_eq!(inbound.sender, "eng1@x.com");
        assert_eq!(inbound.subject_raw, "HP_Bot: Status");
        assert_eq!(inbound.subject, "hp_bot:status");
        assert_eq!(
            inbound.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn extract_missing_subject_is_empty() {
        let msg = FetchedMessage::new("m1")
            .with_header("From", "a@x.com")
            .with_header("Date", "Mon, 1 Jan 2024 10:00:00 +0000");
        assert_eq!(extract(&msg).unwrap().subject, "");
    }

    #[test]
    fn extract_requires_from_and_date() {
        let no_from = FetchedMessage::new("m1")
            .with_header("Subject", "x:y")
            .with_header("Date", "Mon, 1 Jan 2024 10:00:00 +0000");
        assert_eq!(extract(&no_from), Err(ParseError::MissingHeader("From")));

        let no_date = FetchedMessage::new("m1")
            .with_header("From", "a@x.com")
            .with_header("Subject", "x:y");
        assert_eq!(extract(&no_date), Err(ParseError::MissingHeader("Date")));
    }

    #[test]
    fn bad_date_is_parse_error() {
        let msg = message("a@x.com", "x:y", "yesterday-ish");
        assert!(matches!(extract(&msg), Err(ParseError::Date(_))));
    }

    #[test]
    fn date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            parse_date("Mon, 1 Jan 2024 10:00:00 +0000 (UTC)").unwrap(),
            expected
        );
        assert_eq!(
            parse_date("Mon, 1 Jan 2024 05:00:00 -0500").unwrap(),
            expected
        );
        assert_eq!(parse_date("2024-01-01T10:00:00Z").unwrap(), expected);
    }
}
