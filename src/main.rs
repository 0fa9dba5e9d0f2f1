#![forbid(unsafe_code)]

//! `netwatch`: single-target process supervisor binary.
//!
//! Starts the control channel listener and the supervision loop side by
//! side, and exits once a `STOP` command has ended supervision.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use netwatch::config::GlobalConfig;
use netwatch::ipc::server::spawn_control_server;
use netwatch::supervisor::ProcessSupervisor;
use netwatch::{AppError, Result, StopFlag};

/// How long to wait for the control channel task after supervision ends.
const SERVER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "netwatch", about = "Keep one program running until told to stop", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the target executable.
    #[arg(long)]
    target: Option<PathBuf>,

    /// Override the control channel name.
    #[arg(long)]
    ipc_name: Option<String>,

    /// Validate config and print resolved settings, don't run.
    #[arg(long)]
    dry_run: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("netwatch bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(ipc_name) = args.ipc_name {
        config.ipc_name = ipc_name;
    }
    config.validate()?;

    let target = config.resolve_target()?;
    info!(target_path = %target.display(), ipc_name = %config.ipc_name, "configuration loaded");

    if args.dry_run {
        println!("target:    {}", target.display());
        println!("ipc_name:  {}", config.ipc_name);
        println!("timing:    {:?}", config.timing);
        return Ok(());
    }

    // ── Start control channel ───────────────────────────
    let stop = StopFlag::new();
    let ct = CancellationToken::new();
    let server_handle =
        spawn_control_server(&config.ipc_name, &config.timing, stop.clone(), ct.clone())?;

    // ── Supervise until STOP ────────────────────────────
    let supervisor = ProcessSupervisor::new(target, config.timing.clone(), stop);
    let report = tokio::spawn(supervisor.run())
        .await
        .map_err(|err| AppError::Io(format!("supervisor task failed: {err}")))?;
    info!(launches = report.launches, outcome = ?report.outcome, "supervisor finished");

    // ── Stop listening and wait briefly for the channel ─
    ct.cancel();
    match tokio::time::timeout(SERVER_JOIN_TIMEOUT, server_handle).await {
        Ok(Ok(exit)) => info!(?exit, "control channel finished"),
        Ok(Err(err)) => error!(%err, "control channel task failed"),
        Err(_) => warn!("control channel did not finish in time"),
    }

    info!("netwatch shut down");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
