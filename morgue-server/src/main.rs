//! # Morgue Server
//!
//! Queue-driven ingestion of movie death catalogs.
//!
//! - `serve` (default): poll the queue on a fixed interval and accept insert
//!   events over HTTP
//! - `process-once`: drain the queue a single time and exit
//! - `enqueue`: insert a request the way the intake layer would
//! - `db migrate`: apply migrations and exit

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use morgue_core::database::{EnqueueOutcome, IngestionQueue};
use morgue_server::{
    AppState, create_app,
    infra::{
        bootstrap::{build_pipeline, connect_database, run_migrations},
        config::{Config, ConfigLoad, ConfigLoader},
        telemetry::init_tracing,
    },
};
use tracing::{info, warn};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "morgue-server")]
#[command(about = "Movie death-catalog ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Path to a morgue.toml configuration file
    #[arg(long, env = "MORGUE_CONFIG_PATH", global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the poller and HTTP event endpoint (default)
    Serve(ServeArgs),
    /// Drain the pending queue once and exit
    ProcessOnce,
    /// Enqueue a movie request
    Enqueue(EnqueueArgs),
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Accept events only; do not poll the queue
    #[arg(long, default_value_t = false)]
    no_poll: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct EnqueueArgs {
    /// Free-text title, optionally ending in a four-digit year
    query: String,

    /// Release year hint
    #[arg(long)]
    year: Option<i32>,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_server(config, args).await,
        Command::ProcessOnce => run_process_once(config).await,
        Command::Enqueue(args) => run_enqueue(config, args).await,
        Command::Db(DbCommand::Migrate) => {
            let pool = connect_database(&config).await?;
            run_migrations(&pool).await
        }
    }
}

fn load_config(args: &GlobalArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    init_tracing();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(config)
}

async fn run_server(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let pool = connect_database(&config).await?;
    run_migrations(&pool).await?;

    let pipeline = build_pipeline(&config, pool)?;
    let state = AppState::from_config(pipeline, &config);

    let poller_handle = if args.no_poll {
        info!("queue polling disabled; serving events only");
        None
    } else {
        let poller = state.poller.clone();
        let shutdown = state.shutdown.clone();
        Some(tokio::spawn(poller.run(shutdown)))
    };

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "morgue server listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    if let Some(handle) = poller_handle {
        handle.await.context("poller task panicked")?;
    }
    Ok(())
}

async fn run_process_once(config: Config) -> anyhow::Result<()> {
    let pool = connect_database(&config).await?;
    run_migrations(&pool).await?;

    let state = AppState::from_config(build_pipeline(&config, pool)?, &config);
    let processed = state.poller.drain(&state.shutdown).await;
    info!(processed, "queue drained");
    Ok(())
}

async fn run_enqueue(config: Config, args: EnqueueArgs) -> anyhow::Result<()> {
    let pool = connect_database(&config).await?;
    run_migrations(&pool).await?;

    let pipeline = build_pipeline(&config, pool)?;
    let outcome = pipeline
        .queue
        .enqueue(&args.query, args.year)
        .await
        .context("failed to enqueue request")?;

    match outcome {
        EnqueueOutcome::Created(id) => info!(job_id = %id, query = %args.query, "job enqueued"),
        EnqueueOutcome::Duplicate(id) => {
            info!(job_id = %id, query = %args.query, "an identical request is already queued")
        }
    }
    println!("{}", outcome.job_id());
    Ok(())
}
