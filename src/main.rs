// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use kube::Client;
use redis_sentinel_operator::{
    cluster_api::KubeApi,
    constants::{
        DEFAULT_METRICS_PORT, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKERS,
        SEED_POLL_INITIAL_MILLIS, SEED_POLL_STEPS, TOKIO_WORKER_THREADS,
    },
    context::{Context, Settings},
    informers::{run_resync, wait_for_caches, Informers},
    metrics::run_metrics_server,
    queue::WorkQueue,
    reconcilers::Engine,
    sentinel::SentinelDiscovery,
    shutdown::ShutdownSignal,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Kubernetes operator running Redis with Sentinel-managed failover.
#[derive(Parser, Debug)]
#[command(name = "redis-sentinel-operator", version, about)]
struct Args {
    /// Only watch this namespace (default: all namespaces)
    #[arg(long)]
    namespace: Option<String>,

    /// Seconds between periodic re-enqueues of every cluster
    #[arg(long, default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
    resync_interval: u64,

    /// Number of worker loops draining the reconciliation queue
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port serving /metrics and /healthz
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Seed master readiness checks per reconcile pass
    #[arg(long, default_value_t = SEED_POLL_STEPS)]
    seed_poll_steps: u32,

    /// Delay before the second seed master readiness check, in milliseconds
    #[arg(long, default_value_t = SEED_POLL_INITIAL_MILLIS)]
    seed_poll_initial_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("redis-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing(log_level: &str) {
    // Format: timestamp file:line LEVEL message
    //
    // RUST_LOG wins over --log-level; RUST_LOG_FORMAT=json switches to JSON output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing(&args.log_level);

    info!(
        namespace = args.namespace.as_deref().unwrap_or("<all>"),
        workers = args.workers,
        resync_interval_secs = args.resync_interval,
        "Starting Redis Sentinel Operator"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let shutdown = ShutdownSignal::new();
    let queue = Arc::new(WorkQueue::default());

    let informers = Informers::start(&client, args.namespace.as_deref(), &queue, &shutdown);

    let ctx = Arc::new(Context {
        api: Arc::new(KubeApi::new(client)),
        discovery: Arc::new(SentinelDiscovery::default()),
        stores: informers.stores.clone(),
        settings: Settings {
            seed_poll_steps: args.seed_poll_steps,
            seed_poll_initial: Duration::from_millis(args.seed_poll_initial_ms),
        },
        shutdown: shutdown.clone(),
    });

    let metrics_shutdown = shutdown.clone();
    let metrics = tokio::spawn(run_metrics_server(args.metrics_port, async move {
        metrics_shutdown.wait().await;
    }));

    tokio::select! {
        result = wait_for_caches(&ctx.stores) => result?,
        () = wait_for_signal() => {
            shutdown.trigger();
            return Ok(());
        }
    }

    let engine = Arc::new(Engine::new(Arc::clone(&ctx), Arc::clone(&queue)));
    let workers: Vec<_> = (0..args.workers.max(1))
        .map(|id| tokio::spawn(Arc::clone(&engine).run_worker(id)))
        .collect();

    let resync = tokio::spawn(run_resync(
        ctx.stores.redis_clusters.clone(),
        Arc::clone(&queue),
        Duration::from_secs(args.resync_interval.max(1)),
        shutdown.clone(),
    ));

    info!("Operator running");
    wait_for_signal().await;

    info!("Shutdown requested, draining in-flight reconciliations");
    shutdown.trigger();
    queue.shut_down_with_drain().await;

    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Worker task failed");
        }
    }
    for handle in informers.handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Watch task failed");
        }
    }
    if let Err(e) = resync.await {
        error!(error = %e, "Resync task failed");
    }
    match metrics.await {
        Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
        Err(e) => error!(error = %e, "Metrics task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
