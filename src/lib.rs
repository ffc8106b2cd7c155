//! Terminal viewer for a command-line credential vault.
//!
//! The vault CLI is the only source of truth; this crate signs in through it,
//! caches what it returns for a while, indexes record titles for fuzzy search
//! and renders everything in a ratatui interface.

pub mod cache;
pub mod clipboard;
pub mod clock;
pub mod config;
pub mod model;
pub mod op;
pub mod search;
pub mod session;
pub mod store;
pub mod ui;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use model::Record;
use op::OpCli;
use session::{Authenticator, Session, SessionError, env_token};
use store::StoreOptions;

static LONG_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "{}\ntarget: {}\nbuilt:  {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
    )
});

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "vaultview",
    version,
    long_version = LONG_VERSION.as_str(),
    about = "Search and read vault records from the terminal"
)]
pub struct Cli {
    /// Where log files go (defaults to platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch interactive TUI (default)
    Tui,
    /// Print every record title, restoring the last vault session
    List {
        #[arg(long)]
        json: bool,
    },
    /// Fuzzy search record titles
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one record with its details
    Get {
        id: String,
        #[arg(long)]
        json: bool,
        /// Print the password instead of a mask
        #[arg(long)]
        reveal: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let command = cli.command.unwrap_or(Commands::Tui);
    let _log_guard = init_logging(&config.data_dir, matches!(command, Commands::Tui));

    match command {
        Commands::Tui => ui::tui::run_tui(config),
        Commands::List { json } => {
            let session = restore_session(&config)?;
            let collection = session.records()?;
            print_records(collection.records(), json)
        }
        Commands::Search { query, json } => {
            let session = restore_session(&config)?;
            let hits = session.search(&query)?;
            print_records(&hits, json)
        }
        Commands::Get { id, json, reveal } => {
            let session = restore_session(&config)?;
            let record = session.get(&id)?;
            print_record(&record, json, reveal)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "vaultview", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

/// The TUI owns the terminal, so it logs to a daily file under `data_dir`;
/// headless commands log to stderr. Keep the guard alive until exit.
pub fn init_logging(data_dir: &Path, to_file: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vaultview=info"));

    if !to_file {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return None;
    }
    if std::fs::create_dir_all(data_dir).is_err() {
        return None;
    }
    let appender = tracing_appender::rolling::daily(data_dir, "vaultview.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    Some(guard)
}

pub fn authenticator(config: &AppConfig) -> Authenticator {
    authenticator_with(config, config.store_options())
}

fn authenticator_with(config: &AppConfig, store_options: StoreOptions) -> Authenticator {
    Authenticator::new(
        Arc::new(OpCli::new(config.op_bin.clone())),
        clock::system(),
        store_options,
        config.session_lifetime,
    )
}

fn restore_session(config: &AppConfig) -> Result<Session> {
    let path = config.op_config_path().context("locating vault config")?;
    // One-shot commands exit long before a sweep would matter.
    let auth = authenticator_with(
        config,
        StoreOptions {
            sweep_interval: None,
            ..config.store_options()
        },
    );
    auth.restore_from_config(&path, env_token)
        .map_err(|e| match e {
            SessionError::NoPriorSession(_) => anyhow!(
                "{e}; sign in with `vaultview tui` or export OP_SESSION_<shorthand> first"
            ),
            other => anyhow::Error::new(other).context("restoring vault session"),
        })
}

#[derive(Serialize)]
struct Listing<'a> {
    fetched_at: DateTime<Utc>,
    count: usize,
    records: &'a [Record],
}

fn print_records(records: &[Record], json: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        let listing = Listing {
            fetched_at: Utc::now(),
            count: records.len(),
            records,
        };
        serde_json::to_writer_pretty(&mut out, &listing)?;
        writeln!(out)?;
        return Ok(());
    }
    for record in records {
        if record.overview.ainfo.is_empty() {
            writeln!(out, "{}  {}", record.id, record.title())?;
        } else {
            writeln!(
                out,
                "{}  {}  ({})",
                record.id,
                record.title(),
                record.overview.ainfo
            )?;
        }
    }
    Ok(())
}

fn print_record(record: &Record, json: bool, reveal: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, record)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "{}", record.title())?;
    let Some(detail) = record.details.as_ref() else {
        return Ok(());
    };
    if let Some(user) = detail.username() {
        writeln!(out, "username: {user}")?;
    }
    if let Some(password) = detail.password() {
        let shown = if reveal { password } else { "********" };
        writeln!(out, "password: {shown}")?;
    }
    if !detail.notes.is_empty() {
        writeln!(out, "\n{}", detail.notes)?;
    }
    Ok(())
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "vaultview", "vaultview")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("vaultview"))
}
