use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_config::{ConfigLoader, SentinelConfig};
use sentinel_core::AlertSink;
use sentinel_scheduler::{CalendarBuilder, CalendarFile, CalendarStore, JsonCalendarStore};
use sentinel_server::{api, logging, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing sentinel.toml
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the alert service (default)
    Run,

    /// Replace one year of the release calendar from a TOML file
    GenerateCalendar {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new(&args.config_dir)
        .load()
        .with_context(|| format!("failed to load config from {}", args.config_dir.display()))?;
    logging::init_tracing(&config.logging)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::GenerateCalendar { year, input } => generate_calendar(&config, year, &input).await,
    }
}

async fn run(config: SentinelConfig) -> Result<()> {
    let addr = config.server.bind_addr();
    let scheduler_enabled = config.scheduler.enabled;

    let state = Arc::new(AppState::from_config(config).await?);

    let scheduler_handle = if scheduler_enabled {
        let sink: Arc<dyn AlertSink> = state.pipeline.clone();
        state.scheduler.clone().start(sink).await
    } else {
        warn!("Release scheduler disabled");
        None
    };
    let flush_handle = state.delivery.clone().start_flush_loop().await;

    let app = api::create_router(state.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Sentinel server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.stop().await;
    state.delivery.stop().await;
    // 停止前把免费用户队列投递完
    state.delivery.flush_deferred().await;

    for handle in [scheduler_handle, flush_handle].into_iter().flatten() {
        handle.abort();
    }

    info!("Sentinel server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn generate_calendar(config: &SentinelConfig, year: i32, input: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let file = CalendarFile::parse(&content)?;
    let releases = CalendarBuilder::build_year(year, &file.releases)?;
    let count = releases.len();

    let store = JsonCalendarStore::new(config.storage.calendar_path());
    store.replace_year(year, releases).await?;

    info!(year, releases = count, path = %store.path().display(), "Release calendar generated");
    Ok(())
}
