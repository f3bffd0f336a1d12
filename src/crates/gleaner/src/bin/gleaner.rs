//! Gleaner service binary: HTTP surface, background worker, and the
//! stuck-task monitor.

use anyhow::Context;
use clap::Parser;
use gleaner::api::create_router;
use gleaner::config::Config;
use gleaner::context::AppContext;
use gleaner::queue::heartbeat::{run_stuck_monitor, DEFAULT_STUCK_THRESHOLD_MINUTES, MONITOR_INTERVAL};
use gleaner::queue::worker::run_worker_loop;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gleaner", about = "Knowledge-graph ingestion control plane")]
struct Args {
    /// Bind address for the HTTP surface (overrides BIND_ADDR).
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Disable the background worker (serve the API only).
    #[arg(long)]
    no_worker: bool,

    /// Stuck-task threshold in minutes.
    #[arg(long, default_value_t = DEFAULT_STUCK_THRESHOLD_MINUTES)]
    stuck_threshold_minutes: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tooling::logging::init_logging();
    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let bind_addr = config.bind_addr.clone();

    let ctx = AppContext::new(config).await.context("failed to initialize")?;
    info!(bind = %bind_addr, "Gleaner starting");

    let mut background = Vec::new();
    if !args.no_worker {
        background.push(tokio::spawn(run_worker_loop(ctx.clone(), None)));
        background.push(tokio::spawn(run_stuck_monitor(
            ctx.clone(),
            MONITOR_INTERVAL,
            args.stuck_threshold_minutes,
            true,
        )));
    }

    let router = create_router(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    for task in background {
        task.abort();
    }
    info!("Gleaner stopped");
    Ok(())
}
