use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry as MetricsRegistry;
use tokio::task::JoinSet;
use tracing::{error, info};

use ai_gateway::admission::AdmissionController;
use ai_gateway::client::{ClientConfig, UpstreamClient};
use ai_gateway::config::{Args, GatewayConfig};
use ai_gateway::health::HealthChecker;
use ai_gateway::images::{ImagesConfig, ImagesPipeline};
use ai_gateway::metrics::{self, Metrics, MetricsState};
use ai_gateway::registry::Registry;
use ai_gateway::state::AppState;
use ai_gateway::tools::{ToolBus, ToolLog, ToolRegistry};
use ai_gateway::{app, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
	telemetry::init();

	let args = Args::parse();
	let config = GatewayConfig::load(&args).unwrap_or_else(|e| {
		error!(error = %e, "invalid configuration, exiting");
		std::process::exit(1);
	});

	let registry_yaml = tokio::fs::read_to_string(&config.registry_path)
		.await
		.with_context(|| format!("failed to read backend registry at {}", config.registry_path.display()))?;
	let registry = Registry::load(&registry_yaml).unwrap_or_else(|e| {
		error!(error = %e, "backend registry failed to validate, exiting");
		std::process::exit(1);
	});
	let registry = Arc::new(registry);

	let client_config = ClientConfig {
		danger_accept_invalid_certs: !config.backend_verify_tls,
		ca_bundle_path: config.backend_ca_bundle.clone(),
		client_cert_path: config.backend_client_cert.clone(),
		client_key_path: config.backend_client_key.clone(),
		..Default::default()
	};
	let client = UpstreamClient::new(client_config).context("failed to build upstream HTTP client")?;

	let admission = Arc::new(AdmissionController::from_registry(&registry));
	let health = HealthChecker::new(&registry, client.clone(), config.health_probe_interval);

	let tool_log = ToolLog::new(config.tools_log_mode, config.tools_log_path.clone(), config.tools_log_dir.clone());
	let tools = Arc::new(ToolBus::new(ToolRegistry::default(), tool_log));

	let images_config = ImagesConfig {
		backend_family: config.images_backend,
		base_url: config.images_http_base_url.clone(),
		default_model: config.images_openai_model.clone(),
		image_dir: config.ui_image_dir.clone(),
		allow_base64: registry
			.lookup(&config.images_backend_class)
			.map(|b| b.payload_policy.images_allow_base64)
			.unwrap_or(false),
	};
	let images = Arc::new(ImagesPipeline::new(client.clone(), images_config));

	let mut metrics_registry = MetricsRegistry::default();
	let gateway_metrics = Arc::new(Metrics::new(&mut metrics_registry));
	let metrics_registry = Arc::new(std::sync::Mutex::new(metrics_registry));

	let state = AppState::new(
		Arc::clone(&registry),
		Arc::clone(&admission),
		Arc::clone(&health),
		client,
		Arc::clone(&tools),
		Arc::clone(&images),
		Arc::clone(&gateway_metrics),
		&config,
	);

	let mut tasks = JoinSet::new();

	{
		let health = Arc::clone(&health);
		let registry = Arc::clone(&registry);
		tasks.spawn(async move {
			health.run(registry).await;
		});
	}

	let bind_addr: SocketAddr = config.bind_addr.parse().context("invalid GATEWAY_BIND_ADDR")?;
	let api_router = app::router(state);
	tasks.spawn(async move {
		let listener = tokio::net::TcpListener::bind(bind_addr).await.expect("failed to bind API listener");
		info!(%bind_addr, "gateway API listening");
		axum::serve(listener, api_router.into_make_service_with_connect_info::<SocketAddr>())
			.await
			.expect("API server exited unexpectedly");
	});

	let metrics_addr: SocketAddr = config.metrics_bind_addr.parse().context("invalid GATEWAY_METRICS_BIND_ADDR")?;
	let metrics_router = metrics::router(MetricsState { registry: metrics_registry });
	tasks.spawn(async move {
		let listener = tokio::net::TcpListener::bind(metrics_addr).await.expect("failed to bind metrics listener");
		info!(%metrics_addr, "metrics listening");
		axum::serve(listener, metrics_router).await.expect("metrics server exited unexpectedly");
	});

	while let Some(result) = tasks.join_next().await {
		result.context("background task panicked")?;
	}

	Ok(())
}
