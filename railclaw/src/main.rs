//! Railclaw — policy-gated crypto-payment orchestrator.
//!
//! Loads the payment policy and chain configuration, then serves the
//! payment API (`create_payment_link` / `check_payment` / `list_payments`)
//! and a separate health/metrics server, while owning the monitor
//! registry that every spawned direct/bridge monitor is guarded by.

use std::sync::Arc;
use std::time::Duration;

use railclaw::api;
use railclaw::config::Config;
use railclaw::metrics::Metrics;
use railclaw::orchestrator::Orchestrator;
use railclaw::registry::MonitorRegistry;
use railclaw::store::RecordStore;
use tracing::{info, warn};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("starting railclaw");

    let config = Config::load()?;
    info!(data_dir = %config.data_dir, chains = config.chains.len(), "configuration loaded");

    let store = RecordStore::new(config.data_dir.clone())?;
    let registry = MonitorRegistry::new();
    let metrics = Arc::new(Metrics::new());

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        store,
        registry,
        metrics.clone(),
    ));

    orchestrator.resume_pending_monitors().await;

    let api_addr = config.api.listen_addr.clone();
    let metrics_addr = config.api.metrics_listen_addr.clone();

    let payment_api = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { api::start_payment_api(&api_addr, orchestrator).await })
    };
    let metrics_server = {
        let metrics = metrics.clone();
        tokio::spawn(async move { api::start_metrics_server(&metrics_addr, metrics).await })
    };

    tokio::select! {
        result = payment_api => {
            result.map_err(|e| eyre::eyre!("payment API task panicked: {e}"))??;
        }
        result = metrics_server => {
            result.map_err(|e| eyre::eyre!("metrics server task panicked: {e}"))??;
        }
        _ = wait_for_shutdown_signal() => {
            info!("shutdown requested, no longer accepting new orchestrator requests");
        }
    }

    wait_for_monitors_to_drain(&orchestrator).await;

    info!("railclaw stopped");
    Ok(())
}

/// Detached monitors are allowed to keep running to their own deadline
/// (spec §9: monitors outlive the request). We poll instead of blocking
/// forever so a stuck monitor cannot hang shutdown indefinitely.
async fn wait_for_monitors_to_drain(orchestrator: &Orchestrator) {
    const POLL: Duration = Duration::from_secs(2);

    loop {
        let active = orchestrator.active_monitor_count().await;
        if active == 0 {
            break;
        }
        warn!(active, "waiting for in-flight monitors to reach a terminal state");
        tokio::time::sleep(POLL).await;
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,railclaw=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}
