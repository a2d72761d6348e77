//! # rbfeed
//!
//! Streams newly played tracks from an encrypted DJ library database as
//! JSON lines, and offers one-shot reads of the catalog and history log.

#![deny(unsafe_code)]

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rbfeed_core::{FeedSignal, LogRecord};
use rbfeed_engine::{EngineState, HistorySource, LibraryProvider, PollEngine, SourceProvider};
use rbfeed_settings::FeedSettings;
use rbfeed_telemetry::{LogFormat, TelemetryConfig};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// DJ library history feed.
#[derive(Parser, Debug)]
#[command(name = "rbfeed", about = "Stream DJ library play history as JSON lines")]
struct Cli {
    /// Path to the library database (default: from the agent's options.json).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Database password (default: decrypted from the agent's options.json).
    #[arg(long, global = true)]
    password: Option<String>,

    /// JSON settings file merged over the defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Agent options file consulted when path or password are not given.
    #[arg(long, global = true)]
    options_file: Option<PathBuf>,

    /// Poll interval in milliseconds.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: Option<u64>,

    /// Maximum new history rows per poll.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    history_rows: Option<u32>,

    /// Maximum catalog rows per track load.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    max_rows: Option<u32>,

    /// Open the database writable and allow pop/push of history rows.
    #[arg(long, global = true)]
    dangerously_modify_history: bool,

    #[arg(long, global = true, value_enum, default_value_t = CliLogFormat::Json)]
    log_format: CliLogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll for new plays and print each signal until interrupted.
    Watch {
        /// Also print the catalog right after `ready`.
        #[arg(long)]
        tracks: bool,
    },
    /// Print the track catalog.
    Tracks,
    /// Print the newest history sequence number.
    Latest,
    /// Remove the newest history row and print it.
    Pop,
    /// Re-insert a row printed by `pop`, read from FILE or stdin.
    Push { file: Option<PathBuf> },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Json => Self::Json,
            CliLogFormat::Pretty => Self::Pretty,
        }
    }
}

impl Cli {
    /// Settings file (or defaults) plus env, then flags on top.
    fn settings(&self) -> Result<FeedSettings> {
        let mut settings = match &self.settings {
            Some(path) => rbfeed_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => rbfeed_settings::load_settings(),
        };
        if let Some(path) = &self.db_path {
            settings.db_path = Some(path.clone());
        }
        if let Some(password) = &self.password {
            settings.db_password = Some(password.clone());
        }
        if let Some(ms) = self.interval_ms {
            settings.poll_interval_ms = ms;
        }
        if let Some(rows) = self.history_rows {
            settings.history_max_rows = rows;
        }
        if let Some(rows) = self.max_rows {
            settings.max_rows = rows;
        }
        if self.dangerously_modify_history {
            settings.dangerously_modify_history = true;
        }
        if let Command::Watch { tracks: true } = self.command {
            settings.emit_tracks = true;
        }
        Ok(settings)
    }

    fn provider(&self, settings: &FeedSettings) -> LibraryProvider {
        let provider = LibraryProvider::from_settings(settings);
        match &self.options_file {
            Some(path) => provider.with_options_file(path),
            None => provider,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to serialize output")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

/// Resolve and open a source for a one-shot command.
fn open_source(provider: &LibraryProvider, mutable: bool) -> Result<impl HistorySource> {
    let mut source = provider.provide(mutable)?;
    source.open()?;
    Ok(source)
}

async fn watch(provider: LibraryProvider, settings: FeedSettings) -> Result<()> {
    let mut engine = PollEngine::new(provider, settings);
    let mut rx = engine.subscribe();
    engine.start();

    if engine.state() != EngineState::Running {
        while let Ok(signal) = rx.try_recv() {
            print_json(&signal)?;
        }
        bail!("history feed failed to start");
    }

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for ctrl-c")?;
                info!("shutting down");
                break;
            }
            signal = rx.recv() => match signal {
                Ok(FeedSignal::Poll) => {}
                Ok(signal) => print_json(&signal)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "signal consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop();
    Ok(())
}

fn read_record(file: Option<&PathBuf>) -> Result<LogRecord> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(raw.trim()).context("Input is not a history record")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    rbfeed_telemetry::init_telemetry(&TelemetryConfig {
        format: cli.log_format.into(),
        ..TelemetryConfig::default()
    })?;

    let settings = cli.settings()?;
    let provider = cli.provider(&settings);

    match &cli.command {
        Command::Watch { .. } => watch(provider, settings).await,
        Command::Tracks => {
            let source = open_source(&provider, false)?;
            print_json(&source.load_tracks(settings.max_rows)?)
        }
        Command::Latest => {
            let source = open_source(&provider, false)?;
            print_json(&json!({ "lastRowId": source.latest_sequence() }))
        }
        Command::Pop => {
            if !settings.dangerously_modify_history {
                bail!("pop rewrites the history log; pass --dangerously-modify-history");
            }
            let mut source = open_source(&provider, true)?;
            match source.remove_last() {
                Some(record) => print_json(&record),
                None => bail!("no history row removed"),
            }
        }
        Command::Push { file } => {
            if !settings.dangerously_modify_history {
                bail!("push rewrites the history log; pass --dangerously-modify-history");
            }
            let record = read_record(file.as_ref())?;
            let mut source = open_source(&provider, true)?;
            if !source.insert_record(&record) {
                bail!("history row {} was not inserted", record.sequence);
            }
            print_json(&json!({ "inserted": record.sequence }))
        }
    }
}
