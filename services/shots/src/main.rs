use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use shot_service::config::{Config, StoreBackend};
use shot_service::shot_store::{DynamoShotStore, MemoryShotStore, ShotRepository};
use shot_service::stitcher::{DisabledStitchNotifier, LambdaStitchNotifier, StitchNotifier};
use shot_service::{api, AppState, ShotService};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set by the Lambda runtime in every function container
const LAMBDA_RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    let on_lambda = std::env::var_os(LAMBDA_RUNTIME_API_VAR).is_some();

    info!(
        service = %config.service.name,
        table = %config.dynamodb.table_name,
        lambda = on_lambda,
        "Starting Tikee Shot Service"
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.aws.region.clone()))
        .load()
        .await;

    let store: Arc<dyn ShotRepository> = match config.dynamodb.backend {
        StoreBackend::Dynamodb => {
            let store = DynamoShotStore::new(&sdk_config, &config.aws, &config.dynamodb);
            if config.dynamodb.create_table {
                store
                    .ensure_table()
                    .await
                    .context("Failed to create shot table")?;
            }
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory shot store, shots are lost on restart");
            Arc::new(MemoryShotStore::new())
        }
    };

    let notifier: Arc<dyn StitchNotifier> = match config.stitcher_function() {
        Some(function) => Arc::new(LambdaStitchNotifier::new(&sdk_config, &config.aws, function)),
        None => {
            warn!("No stitcher function configured, stitching is disabled");
            Arc::new(DisabledStitchNotifier)
        }
    };

    let state = AppState {
        service: ShotService::new(store, notifier),
    };

    if on_lambda {
        let app = api::create_router(state, &config.api);
        lambda_http::run(app)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Lambda runtime error")?;
    } else {
        // Initialize metrics
        init_metrics(config.service.metrics_port)?;

        api::start_api_server(state, &config.api, shutdown_signal()).await?;
    }

    info!("Shot service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
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

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
