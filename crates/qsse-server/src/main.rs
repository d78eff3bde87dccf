//! qssed - Qlik Server-Side Extension plugin daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qsse_core::FunctionRegistry;
use qsse_maps::{GoogleDirectionsClient, RouteService};
use qsse_script::SqlScriptEvaluator;
use qsse_server::health::{spawn_health_server, HealthState};
use qsse_server::{build_service, builtin_table, Cli, ServerMetrics, SseServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config()?;
    info!("Starting qssed {}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(
        FunctionRegistry::load(&config.definition_file)
            .context("Failed to load function definitions")?,
    );

    let routes: Option<Arc<dyn RouteService>> = match &config.maps_api_key {
        Some(key) => Some(Arc::new(
            GoogleDirectionsClient::new(key.clone(), &config.maps_base_url)
                .context("Invalid GOOGLE_MAPS_BASE_URL")?,
        )),
        None => None,
    };
    let table = builtin_table(&registry, routes).map_err(|errors| {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        anyhow::anyhow!("Function handlers are incomplete:\n{}", lines.join("\n"))
    })?;

    let metrics = ServerMetrics::new();
    let ready = Arc::new(AtomicBool::new(false));
    if let Some(port) = config.metrics_port {
        spawn_health_server(
            port,
            Arc::new(HealthState {
                metrics: metrics.clone(),
                ready: ready.clone(),
            }),
        )
        .await
        .context("Failed to start metrics server")?;
    }

    let service = build_service(
        &config,
        registry,
        table,
        Arc::new(SqlScriptEvaluator::new()),
        metrics,
    );
    let server = SseServer::bind(&config, service).await?;
    info!("Listening on {}", server.local_addr()?);
    ready.store(true, Ordering::Relaxed);

    server.serve().await
}
