mod check_commands;
mod relay;
mod shell;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand, ValueEnum},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "taskrelay", about = "taskrelay: chat commands to a task bus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./taskrelay.toml and the user
    /// config dir).
    #[arg(long, global = true, env = "TASKRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default when no subcommand is provided).
    Run {
        #[arg(long, value_enum, default_value_t = Adapter::Slack)]
        adapter: Adapter,
    },
    /// Validate the configuration and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
        /// Also connect and authenticate to the bus.
        #[arg(long)]
        probe: bool,
    },
    /// Publish one task as the local operator.
    Publish {
        target: String,
        #[arg(long, default_value = "mtr")]
        keyword: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Adapter {
    /// Slack Socket Mode.
    Slack,
    /// Commands from stdin, replies on stdout.
    Shell,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the config and refuse to go on unless every required parameter is set.
fn resolve(cli: &Cli) -> anyhow::Result<taskrelay_config::ResolvedConfig> {
    let (config, path) = taskrelay_config::discover_and_load(cli.config.as_deref())
        .context("failed to load configuration")?;
    match &path {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file found, using defaults and environment"),
    }
    match taskrelay_config::ensure_startup(&config) {
        Ok(resolved) => Ok(resolved),
        Err(e) => {
            error!(error = %e, "refusing to start");
            Err(e.into())
        },
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            return;
        }
        info!("shutting down");
        token.cancel();
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None => run(&cli, Adapter::Slack).await,
        Some(Commands::Run { adapter }) => run(&cli, adapter).await,
        Some(Commands::Check { verbose, probe }) => {
            check_commands::check(cli.config.as_deref(), verbose, probe).await
        },
        Some(Commands::Publish {
            ref target,
            ref keyword,
        }) => {
            let config = resolve(&cli)?;
            relay::publish_once(&config, keyword, target).await
        },
    }
}

async fn run(cli: &Cli, adapter: Adapter) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "taskrelay starting");
    let config = resolve(cli)?;
    let cancel = shutdown_on_ctrl_c();
    match adapter {
        Adapter::Slack => relay::run_slack(&config, cancel).await,
        Adapter::Shell => relay::run_shell(&config, cancel).await,
    }
}
