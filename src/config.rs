//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default identity used as the `From` of every outbound message.
pub const DEFAULT_FROM_ADDRESS: &str = "robot-db@gmail.com";

/// Default recipient of forwarded robot-control requests.
pub const DEFAULT_OPERATOR_ADDRESS: &str = "gamemaster@gmail.com";

/// Default minimum interval between answered requests per sender.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Default sleep between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Whether outbound messages are actually transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compose and log, never transmit.
    DryRun,
    /// Compose, log and transmit.
    Live,
}

impl Mode {
    /// Interpret the single optional CLI argument. Only `live` disables dry-run.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("live") => Self::Live,
            _ => Self::DryRun,
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == Self::DryRun
    }
}

/// Core bot behavior settings.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Our own address, used as `From` on every outbound message.
    pub from_address: String,
    /// Where bot-role robot-control requests are forwarded.
    pub operator_address: String,
    /// Mailbox (label) polled for unread messages.
    pub mailbox: String,
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Minimum interval between answered requests from one sender.
    pub cooldown: Duration,
    pub mode: Mode,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            operator_address: DEFAULT_OPERATOR_ADDRESS.to_string(),
            mailbox: "INBOX".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            mode: Mode::DryRun,
        }
    }
}

impl BotConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env(mode: Mode) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval = match parse_env::<u64>("MAILBOT_POLL_INTERVAL_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        let cooldown = match parse_env::<u64>("MAILBOT_COOLDOWN_MINUTES")? {
            Some(mins) => cooldown_from_minutes(mins)?,
            None => defaults.cooldown,
        };

        Ok(Self {
            from_address: std::env::var("MAILBOT_FROM_ADDRESS")
                .unwrap_or(defaults.from_address),
            operator_address: std::env::var("MAILBOT_OPERATOR_ADDRESS")
                .unwrap_or(defaults.operator_address),
            mailbox: std::env::var("MAILBOT_MAILBOX").unwrap_or(defaults.mailbox),
            poll_interval,
            cooldown,
            mode,
        })
    }
}

/// IMAP/SMTP server settings.
#[derive(Debug, Clone)]
pub struct MailServerConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl MailServerConfig {
    /// Build config from environment variables. `MAILBOT_IMAP_HOST` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = std::env::var("MAILBOT_IMAP_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("MAILBOT_IMAP_HOST".into()))?;

        let imap_port = parse_env::<u16>("MAILBOT_IMAP_PORT")?.unwrap_or(993);

        let smtp_host = std::env::var("MAILBOT_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port = parse_env::<u16>("MAILBOT_SMTP_PORT")?.unwrap_or(587);

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
        })
    }
}

/// Where the credential/catalog table is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableConfig {
    /// A local JSON file shaped like a Sheets `values` response.
    File(PathBuf),
    /// A Google Sheets range.
    Sheet { spreadsheet_id: String, range: String },
}

impl TableConfig {
    /// `MAILBOT_TABLE_PATH` wins over `MAILBOT_SPREADSHEET_ID`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("MAILBOT_TABLE_PATH") {
            return Ok(Self::File(PathBuf::from(path)));
        }

        let spreadsheet_id = std::env::var("MAILBOT_SPREADSHEET_ID").map_err(|_| {
            ConfigError::MissingEnvVar("MAILBOT_TABLE_PATH or MAILBOT_SPREADSHEET_ID".into())
        })?;
        let range = std::env::var("MAILBOT_SHEET_RANGE").unwrap_or_else(|_| "db!A:I".into());

        Ok(Self::Sheet {
            spreadsheet_id,
            range,
        })
    }
}

/// Parse an optional numeric environment variable.
fn cooldown_from_minutes(mins: u64) -> Result<Duration, ConfigError> {
    mins.checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "MAILBOT_COOLDOWN_MINUTES".into(),
            message: format!("{mins} minutes is out of range"),
        })
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_only_live_disables_dry_run() {
        assert_eq!(Mode::from_arg(Some("live")), Mode::Live);
        assert_eq!(Mode::from_arg(Some("LIVE")), Mode::DryRun);
        assert_eq!(Mode::from_arg(Some("dry")), Mode::DryRun);
        assert_eq!(Mode::from_arg(None), Mode::DryRun);
        assert!(Mode::DryRun.is_dry_run());
        assert!(!Mode::Live.is_dry_run());
    }

    #[test]
    fn bot_config_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.from_address, "robot-db@gmail.com");
        assert_eq!(config.operator_address, "gamemaster@gmail.com");
        assert_eq!(config.cooldown, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.mode, Mode::DryRun);
    }

    #[test]
    fn cooldown_minutes_overflow_is_invalid() {
        assert_eq!(cooldown_from_minutes(45).unwrap(), Duration::from_secs(45 * 60));
        assert!(matches!(
            cooldown_from_minutes(u64::MAX),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn parse_env_rejects_garbage() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("MAILBOT_TEST_PARSE_GARBAGE", "soon") };
        let err = parse_env::<u64>("MAILBOT_TEST_PARSE_GARBAGE").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        unsafe { std::env::remove_var("MAILBOT_TEST_PARSE_GARBAGE") };
    }

    #[test]
    fn parse_env_missing_is_none() {
        assert_eq!(parse_env::<u64>("MAILBOT_TEST_PARSE_UNSET").unwrap(), None);
    }
}
