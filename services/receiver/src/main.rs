use anyhow::{Context, Result};
use frame_receiver::api::{start_api_server, AppState};
use frame_receiver::config::{Config, ServiceConfig};
use frame_receiver::{Ingestor, StatsRegister};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    // Initialize metrics
    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    let stats = Arc::new(StatsRegister::new());
    let ingestor = Arc::new(
        Ingestor::new(&config.ingest, stats.clone())
            .context("Failed to initialize frame store")?,
    );

    print_banner(&config, &stats);

    let api_state = AppState {
        ingestor,
        stats: stats.clone(),
        service_name: config.service.name.clone(),
    };

    // Spawn API server task
    let server_config = config.server.clone();
    let mut api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &server_config).await {
            error!(error = %e, "API server error");
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down frame receiver");
        }
        _ = &mut api_handle => {
            warn!("API server exited");
        }
    }

    api_handle.abort();

    stats.snapshot().log_summary();
    info!("Frame receiver stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Log where the device should send its frames
fn print_banner(config: &Config, stats: &StatsRegister) {
    let ip = local_ip();
    let output_directory = if config.ingest.save_images {
        config.ingest.output_directory.display().to_string()
    } else {
        "N/A".to_string()
    };

    info!(
        service = %config.service.name,
        started_at = %stats.started_at().format("%Y-%m-%d %H:%M:%S"),
        save_images = config.ingest.save_images,
        output_directory = %output_directory,
        "Starting frame receiver"
    );
    info!(
        device_target_ip = %ip,
        upload_url = %format!("http://{}:{}/upload", ip, config.server.port),
        "Point the camera at this address"
    );
}

/// Address of the interface that routes outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
