//! kiln-server binary: wires the stub runtime, the scheduler, and the
//! HTTP gateway together.

use clap::Parser;
use kiln_scheduler::{InferenceScheduler, StubRuntime};
use kiln_server::{build_router, AppState};
use kiln_types::{GenerationParams, SchedulerConfig, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln-server")]
#[command(about = "Chat gateway with a request-serialized inference scheduler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Bind host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Number of execution slots (concurrent generations)
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Maximum number of queued requests before admission rejects
    #[arg(long, default_value_t = 32)]
    queue_depth: usize,

    /// Default per-request deadline in seconds; 0 disables it
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// Artificial delay between stub tokens, in milliseconds
    #[arg(long, default_value_t = 20)]
    token_delay_ms: u64,

    /// Default token cap for requests that do not set one
    #[arg(long, default_value_t = 256)]
    max_tokens: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(err) = run(cli).await {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler_config = SchedulerConfig {
        concurrency: cli.concurrency,
        max_queue_depth: cli.queue_depth,
        default_timeout: match cli.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        ..Default::default()
    };
    let server_config = ServerConfig {
        host: cli.host,
        port: cli.port,
    };

    let runtime = Arc::new(StubRuntime::new(Duration::from_millis(cli.token_delay_ms)));
    let scheduler = InferenceScheduler::spawn(scheduler_config, runtime)?;

    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        defaults: GenerationParams::default().with_max_tokens(cli.max_tokens),
        started_at: chrono::Utc::now(),
    };
    let app = build_router(state);

    let addr = server_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, concurrency = cli.concurrency, queue_depth = cli.queue_depth, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight generations finish and resolve everything queued.
    info!("draining scheduler");
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
