//! CLI entry point for the remote mirror.
//!
//! Runs the remote change pipeline against a local directory that stands in
//! for the remote device, materializing placeholders under a second directory.
//!
//! # Usage
//!
//! ```bash
//! mirror [OPTIONS] <COMMAND>
//!
//! # Mirror changes until Ctrl-C
//! mirror run --remote /mnt/device --local ~/Device
//!
//! # Show the effective configuration
//! mirror --config mirror.json config
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use mirror_core::{Config, DrainPolicy};
use mirror_fs::{LocalEventSource, local_collaborators};
use mirror_pipeline::{RemotePipeline, StatsSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Mirror a remote filesystem into local placeholders.
#[derive(Parser)]
#[command(name = "mirror", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "MIRROR_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Mirror changes until interrupted.
    Run {
        /// Directory standing in for the remote device.
        #[arg(long, env = "MIRROR_REMOTE")]
        remote: Option<Utf8PathBuf>,

        /// Directory where placeholders are written.
        #[arg(long, env = "MIRROR_LOCAL")]
        local: Option<Utf8PathBuf>,

        /// Debounce window for renames and deletes, in milliseconds.
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// What to do with queued mutations on shutdown.
        #[arg(long, value_enum)]
        drain: Option<DrainArg>,
    },

    /// Print the effective configuration as JSON.
    Config,
}

/// Shutdown behavior for queued mutations.
#[derive(Clone, Copy, ValueEnum)]
enum DrainArg {
    /// Run every queued mutation before exiting.
    Drain,
    /// Drop queued mutations.
    Discard,
}

impl From<DrainArg> for DrainPolicy {
    fn from(arg: DrainArg) -> Self {
        match arg {
            DrainArg::Drain => Self::Drain,
            DrainArg::Discard => Self::Discard,
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects `RUST_LOG` if set. Otherwise uses `debug` with `--verbose` and
/// `info` by default, with `notify` held at `warn`.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn,mio=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file, if any, and applies command-line overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Commands::Run {
        remote,
        local,
        debounce_ms,
        drain,
    } = &cli.command
    {
        if let Some(remote) = remote {
            config.mirror.remote_root.clone_from(remote);
        }
        if let Some(local) = local {
            config.mirror.local_root.clone_from(local);
        }
        if let Some(debounce_ms) = debounce_ms {
            config.pipeline.debounce_ms = *debounce_ms;
        }
        if let Some(drain) = drain {
            config.pipeline.drain_policy = (*drain).into();
        }
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the pipeline until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if a root is missing or the pipeline stops with an error.
async fn run_mirror(config: Config) -> color_eyre::Result<()> {
    config.require_roots()?;
    info!(
        remote = %config.mirror.remote_root,
        local = %config.mirror.local_root,
        "Starting mirror"
    );

    let cancel = CancellationToken::new();
    let source = LocalEventSource::new(&config.mirror.remote_root)?;
    let pipeline = RemotePipeline::start(
        source,
        local_collaborators(&config)?,
        &config.pipeline,
        &cancel,
    );

    wait_for_shutdown_signal().await?;

    let stats = pipeline.shutdown().await?;
    info!(stats = %serde_json::to_string(&stats)?, "Mirror stopped");
    print_stats_summary(&stats);
    Ok(())
}

/// Resolves when the process is asked to stop.
async fn wait_for_shutdown_signal() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

/// Prints the effective configuration.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
fn run_config(config: &Config) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints a summary of pipeline statistics.
fn print_stats_summary(stats: &StatsSnapshot) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    let _ = writeln!(handle);
    let _ = writeln!(handle, "Mirror Summary");
    let _ = writeln!(handle, "==============");
    let _ = writeln!(handle, "Events received:   {}", stats.received);
    let _ = writeln!(handle, "  Skipped:         {}", stats.skipped);
    let _ = writeln!(handle, "Mutations queued:  {}", stats.enqueued);
    let _ = writeln!(handle, "  Succeeded:       {}", stats.succeeded);
    let _ = writeln!(handle, "  Failed:          {}", stats.failed);
    let _ = writeln!(handle, "  Entry failures:  {}", stats.entry_failures);
    let _ = writeln!(
        handle,
        "Discarded:         {} tasks, {} events",
        stats.discarded_tasks, stats.discarded_events
    );
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let config = build_config(&cli)?;
    match cli.command {
        Commands::Run { .. } => run_mirror(config).await,
        Commands::Config => run_config(&config),
    }
}
