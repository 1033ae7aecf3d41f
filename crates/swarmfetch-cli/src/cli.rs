//! Argument parsing, configuration layering and error mapping.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use swarmfetch_config::validate::validate;
use swarmfetch_config::{AppConfig, ConfigLoader};
use swarmfetch_engine::session::create_transport;
use swarmfetch_engine::{FetchEngine, TransportOptions};
use swarmfetch_telemetry::{LogFormat, LoggingConfig, init_logging};

use crate::commands::get::handle_get;

const BUILD_SHA: &str = match option_env!("SWARMFETCH_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Parses arguments, runs the requested command and returns the process
/// exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: &Cli) -> CliResult<()> {
    let config = resolve_config(cli)?;
    install_logging(&config)?;

    match &cli.command {
        Command::Get(args) => {
            let transport = create_transport(&transport_options(&config))
                .await
                .context("failed to start swarm client")
                .map_err(CliError::failure)?;
            let engine = FetchEngine::with_policy(transport, config.fetch_policy());
            handle_get(&engine, &config.fetch, args).await
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "swarmfetch",
    version,
    about = "Fetch content from BitTorrent swarms by magnet link"
)]
pub(crate) struct Cli {
    /// JSON configuration file layered under `SWARMFETCH_*` variables.
    #[arg(long, global = true, env = "SWARMFETCH_CONFIG", value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Log filter directive, e.g. `debug` or `swarmfetch_engine=trace`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub(crate) log_level: Option<String>,
    /// Log output format.
    #[arg(long, global = true, value_enum)]
    pub(crate) log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Download one or more magnet links.
    Get(GetArgs),
}

#[derive(Args, Debug)]
pub(crate) struct GetArgs {
    /// Magnet links to fetch.
    #[arg(required = true, value_name = "MAGNET")]
    pub(crate) magnets: Vec<String>,
    /// Directory the content is written under.
    #[arg(
        short,
        long = "dest",
        env = "SWARMFETCH_DEST",
        default_value = ".",
        value_name = "DIR"
    )]
    pub(crate) destination: PathBuf,
    /// Seconds to wait for swarm metadata.
    #[arg(long, value_name = "SECS")]
    pub(crate) metadata_timeout: Option<u64>,
    /// Progress sampling interval in milliseconds.
    #[arg(long, value_name = "MS")]
    pub(crate) tick_ms: Option<u64>,
    /// Fail a transfer that receives nothing for this many seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) stall_timeout: Option<u64>,
    /// Fetches allowed to run at once.
    #[arg(short = 'j', long, value_name = "N")]
    pub(crate) parallel: Option<usize>,
    /// Resubmissions after a retryable failure.
    #[arg(long, value_name = "N")]
    pub(crate) retries: Option<u32>,
    /// Suppress progress output.
    #[arg(short, long)]
    pub(crate) quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatArg {
    Pretty,
    Json,
}

impl LogFormatArg {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Defaults, then the file, then the environment, then flags.
fn resolve_config(cli: &Cli) -> CliResult<AppConfig> {
    let mut loader = ConfigLoader::from_process_env();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().map_err(config_error)?;
    apply_flags(&mut config, cli);
    validate(&config).map_err(config_error)?;
    Ok(config)
}

fn apply_flags(config: &mut AppConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = Some(format.as_str().to_string());
    }
    let Command::Get(args) = &cli.command;
    if let Some(secs) = args.metadata_timeout {
        config.fetch.metadata_timeout_secs = secs;
    }
    if let Some(ms) = args.tick_ms {
        config.fetch.tick_interval_ms = ms;
    }
    if let Some(secs) = args.stall_timeout {
        config.fetch.stall_timeout_secs = Some(secs);
    }
    if let Some(parallel) = args.parallel {
        config.fetch.max_concurrent_fetches = parallel;
    }
    if let Some(retries) = args.retries {
        config.fetch.retry_attempts = retries;
    }
}

fn install_logging(config: &AppConfig) -> CliResult<()> {
    let format = match config.logging.format.as_deref() {
        Some(raw) => raw.parse::<LogFormat>().map_err(CliError::failure)?,
        None => LogFormat::infer(),
    };
    init_logging(&LoggingConfig {
        level: &config.logging.level,
        format,
        build_sha: BUILD_SHA,
    })
    .map_err(CliError::failure)
}

fn transport_options(config: &AppConfig) -> TransportOptions {
    let transport = &config.transport;
    TransportOptions {
        max_peers_per_swarm: transport.max_peers_per_swarm,
        disable_upload: transport.disable_upload,
        disable_ipv6: transport.disable_ipv6,
        enable_dht: transport.enable_dht,
        listen_port: transport.listen_port,
    }
}

fn config_error(err: swarmfetch_config::ConfigError) -> CliError {
    CliError::validation(format!("{:#}", anyhow::Error::new(err)))
}

#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
    Cancelled,
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
            Self::Cancelled => 130,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
            Self::Cancelled => "interrupted".to_string(),
        }
    }
}
