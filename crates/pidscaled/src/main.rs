//! pidscaled — the pidscale daemon.
//!
//! Assembles the control-loop subsystems:
//! - Control registry and worker manager
//! - Burrow lag sampler
//! - Replica ledger (decision sink)
//! - Definitions file reloader
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! pidscaled run --config /etc/pidscale/targets.toml --listen 0.0.0.0:9090
//! pidscaled check --config /etc/pidscale/targets.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use pidscale_api::ApiState;
use pidscale_autoscale::{ReplicaLedger, WorkerContext, WorkerManager};
use pidscale_core::DefinitionsFile;
use pidscale_lag::BurrowSamplerFactory;
use pidscale_metrics::MetricsRegistry;
use pidscale_state::ControlRegistry;
use pidscaled::{DefinitionSource, LogFormat, telemetry};

#[derive(Parser)]
#[command(name = "pidscaled", about = "PID autoscaler driven by consumer-group lag")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loops and the HTTP API.
    Run {
        /// Target definitions file (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Address for the HTTP API.
        #[arg(long, default_value = "0.0.0.0:9090")]
        listen: SocketAddr,

        /// Seconds between definitions file reloads.
        #[arg(long, default_value = "30")]
        reload_interval: u64,
    },
    /// Validate a definitions file and print its targets.
    Check {
        /// Target definitions file (TOML).
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            listen,
            reload_interval,
        } => run(&config, listen, Duration::from_secs(reload_interval)).await,
        Command::Check { config } => check(&config),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let file = DefinitionsFile::from_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let targets = file.targets().context("invalid target definitions")?;

    match &file.sampler {
        Some(s) => {
            println!(
                "sampler: {:?} {} (default cluster {})",
                s.kind,
                s.url,
                s.cluster.as_deref().unwrap_or("none")
            );
            for route in &s.clusters {
                println!("  cluster {}: {}", route.name, route.brokers.join(","));
            }
        }
        None => println!("sampler: none (required by `run`)"),
    }
    for (key, t) in &targets {
        let cluster = file
            .sampler
            .as_ref()
            .and_then(|s| s.resolve_cluster(&t.kafka).ok())
            .unwrap_or("-");
        println!(
            "{key}: {} replicas {}..={} interval {}s cooldown {}s topic {} group {} cluster {cluster}",
            t.target.workload(),
            t.target.min_replicas,
            t.target.max_replicas,
            t.interval,
            t.cooldown,
            t.kafka.topic,
            t.kafka.group,
        );
    }
    println!("{} target(s) OK", targets.len());
    Ok(())
}

async fn run(path: &Path, listen: SocketAddr, reload_interval: Duration) -> anyhow::Result<()> {
    info!(path = %path.display(), "pidscaled starting");

    // ── Initialize subsystems ──────────────────────────────────

    let file = DefinitionsFile::from_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let sampler = file
        .sampler
        .as_ref()
        .context("definitions file has no [sampler] section")?;
    let samplers = BurrowSamplerFactory::new(sampler).context("invalid [sampler] section")?;
    info!(
        url = %sampler.url,
        default_cluster = ?sampler.cluster,
        routes = sampler.clusters.len(),
        "burrow sampler configured"
    );

    let metrics = MetricsRegistry::new();
    let ledger = ReplicaLedger::new();
    let manager = Arc::new(WorkerManager::new(WorkerContext {
        registry: ControlRegistry::new(),
        samplers: Arc::new(samplers),
        sink: Arc::new(ledger.clone()),
        metrics: Arc::new(metrics.clone()),
    }));

    // Initial pass; an invalid file at startup is fatal.
    let source = DefinitionSource::new(path, manager.clone());
    let report = source
        .reconcile()
        .await
        .context("initial definitions load failed")?;
    info!(targets = report.started.len(), "control loops started");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let source_handle = tokio::spawn(source.run(reload_interval, shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = pidscale_api::build_router(ApiState {
        manager: manager.clone(),
        metrics,
        ledger,
    });
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(addr = %listen, "API server starting");

    let shutdown_manager = manager.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            shutdown_manager.shutdown();
        })
        .await?;

    // Wait for background tasks.
    let _ = source_handle.await;
    manager.wait_for_all().await;

    info!("pidscaled stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
