mod archive;
mod checkpoint;
mod config;
mod constants;
mod credentials;
mod mail;
mod sync;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::archive::ArchiveWriter;
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::mail::ImapClient;
use crate::sync::{SyncEngine, SyncMode, SyncOptions};

/// Incrementally archive an IMAP folder to a directory tree
#[derive(Debug, Parser)]
#[command(name = "mailkeep", version, about)]
struct Args {
    /// IMAP server host name
    #[arg(long)]
    server: Option<String>,

    /// IMAP server port [default: 993]
    #[arg(long)]
    port: Option<u16>,

    /// Connect over plain TCP instead of TLS
    #[arg(long)]
    no_tls: bool,

    #[arg(long)]
    username: Option<String>,

    /// Falls back to $MAILKEEP_PASSWORD, then the OS keyring
    #[arg(long)]
    password: Option<String>,

    /// Directory messages are archived into [default: emails]
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Seconds to sleep between passes in daemon mode [default: 60]
    #[arg(long)]
    sleep_timeout: Option<u64>,

    /// Mailbox folder to archive [default: INBOX]
    #[arg(long)]
    folder: Option<String>,

    /// Keep polling for new mail instead of exiting after one pass
    #[arg(long, env = "DAEMON")]
    daemon: bool,

    /// Ignore the stored checkpoint and archive every message again
    #[arg(long)]
    no_resume: bool,

    /// Checkpoint file [default: <directory>/.mailkeep-checkpoint]
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Give up on a message after this many failed passes
    #[arg(long)]
    retry_limit: Option<u32>,

    /// Directory for per-run log files [default: <directory>/../logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Config file [default: ~/.config/mailkeep/config.toml if present]
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Command line values win over the config file.
    fn apply(self, config: &mut Config) {
        let account = &mut config.account;
        if let Some(server) = self.server {
            account.imap.server = server;
        }
        if let Some(port) = self.port {
            account.imap.port = port;
        }
        if self.no_tls {
            account.imap.tls = false;
        }
        if let Some(username) = self.username {
            account.username = username;
        }
        if self.password.is_some() {
            account.password = self.password;
        }
        if let Some(folder) = self.folder {
            account.folder = folder;
        }

        let archive = &mut config.archive;
        if let Some(directory) = self.directory {
            archive.output_dir = directory;
        }
        if self.checkpoint.is_some() {
            archive.checkpoint_path = self.checkpoint;
        }
        if self.log_dir.is_some() {
            archive.log_dir = self.log_dir;
        }

        let sync = &mut config.sync;
        if self.daemon {
            sync.daemon = true;
        }
        if let Some(secs) = self.sleep_timeout {
            sync.poll_interval_secs = secs;
        }
        if self.no_resume {
            sync.resume = false;
        }
        if self.retry_limit.is_some() {
            sync.retry_limit = self.retry_limit;
        }
    }
}

fn setup_logging(log_dir: &Path, username: &str) -> Option<PathBuf> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mailkeep=info"));

    let file_name = format!(
        "{}_{}.log",
        chrono::Local::now().format(constants::DIR_TIMESTAMP_FORMAT),
        archive::naming::sanitize_component(username)
    );
    let log_path = log_dir.join(file_name);

    // Per-run log file next to the archive, if the directory is writable
    let log_file = fs::create_dir_all(log_dir).ok().and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok()
    });

    let opened = log_file.is_some();
    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    opened.then_some(log_path)
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let log_path = setup_logging(&config.log_dir(), &config.account.username);
    if let Some(path) = &log_path {
        tracing::info!("Logging to {}", path.display());
    }

    let account = &config.account;
    let password = CredentialStore::new(&account.username, &account.imap.server)
        .get_password(account.password.as_deref())?;

    tracing::info!(
        "Archiving {} from {} as {} into {}",
        account.folder,
        account.imap.server,
        account.username,
        config.archive.output_dir.display()
    );

    let mut client = ImapClient::new(
        account.imap.clone(),
        account.username.clone(),
        password,
        account.folder.clone(),
    );
    client
        .connect_and_select()
        .await
        .with_context(|| format!("Failed to connect to {}", account.imap.server))?;

    let options = SyncOptions {
        folder: account.folder.clone(),
        resume: config.sync.resume,
        retry_limit: config.sync.retry_limit,
    };
    let mut engine = SyncEngine::new(
        client,
        CheckpointStore::new(config.checkpoint_path()),
        ArchiveWriter::new(config.archive.output_dir.clone()),
        options,
    );

    let mode = if config.sync.daemon {
        tracing::info!(
            "Running as daemon, polling every {}s",
            config.sync.poll_interval_secs
        );
        SyncMode::Continuous(config.poll_interval())
    } else {
        SyncMode::OneShot
    };

    engine.run(mode, shutdown_signal()).await?;
    tracing::info!("Done");
    Ok(())
}
