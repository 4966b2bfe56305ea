use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mailbot::auth::{CredentialProvider, EnvCredentialProvider};
use mailbot::channels::{ImapSmtpTransport, MailTransport};
use mailbot::config::{BotConfig, MailServerConfig, Mode, TableConfig};
use mailbot::pipeline::PollLoop;
use mailbot::table::{GoogleSheetSource, JsonFileSource, SheetSource, Tables, load_tables};

/// Poll a mailbox and answer `task:parameter` subject lines.
#[derive(Debug, Parser)]
#[command(about, disable_version_flag = true)]
struct Cli {
    /// `live` to actually send mail; anything else is a dry run.
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage. Err means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let _log_guard = init_tracing();

    let cli = Cli::parse();
    let mode = Mode::from_arg(cli.mode.as_deref());

    let config = BotConfig::from_env(mode)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        from = %config.from_address,
        operator = %config.operator_address,
        mailbox = %config.mailbox,
        dry_run = mode.is_dry_run(),
        "Mailbot starting"
    );

    // ── Credentials (fatal if unavailable) ──────────────────────────────
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentialProvider::new());
    credentials
        .valid_credential()
        .await
        .context("acquiring mail credential")?;

    // ── Tables (fatal if unreadable or malformed) ───────────────────────
    let tables = load_table(TableConfig::from_env()?, Arc::clone(&credentials))
        .await
        .context("table is unavailable or malformed, refusing to start")?;

    // ── Transport ───────────────────────────────────────────────────────
    let server = MailServerConfig::from_env()?;
    tracing::info!(imap = %server.imap_host, smtp = %server.smtp_host, "Mail server");
    let transport: Arc<dyn MailTransport> = Arc::new(ImapSmtpTransport::new(
        server,
        config.mailbox.clone(),
        Arc::clone(&credentials),
    ));

    let mut poller = PollLoop::new(&config, tables, transport);
    tokio::select! {
        () = poller.run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }

    Ok(())
}

async fn load_table(
    config: TableConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> mailbot::error::Result<Tables> {
    let source: Box<dyn SheetSource> = match config {
        TableConfig::File(path) => {
            tracing::info!(path = %path.display(), "Reading table from file");
            Box::new(JsonFileSource::new(path))
        }
        TableConfig::Sheet {
            spreadsheet_id,
            range,
        } => Box::new(GoogleSheetSource::new(credentials, spreadsheet_id, range)),
    };
    let rows = source.load_table().await?;
    Ok(load_tables(&rows)?)
}

/// Console logging, plus a daily-rotated file when `MAILBOT_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match std::env::var("MAILBOT_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mailbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}
