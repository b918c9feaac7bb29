//! Shared application state threaded through axum's `State` extractor.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::auth::IpAllowlist;
use crate::client::UpstreamClient;
use crate::config::GatewayConfig;
use crate::health::HealthChecker;
use crate::images::ImagesPipeline;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::tools::ToolBus;

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<Registry>,
	pub admission: Arc<AdmissionController>,
	pub health: Arc<HealthChecker>,
	pub client: UpstreamClient,
	pub tools: Arc<ToolBus>,
	pub images: Arc<ImagesPipeline>,
	pub metrics: Arc<Metrics>,
	pub bearer_token: Arc<str>,
	pub ui_ip_allowlist: IpAllowlist,
	pub images_backend_class: Arc<str>,
	pub build_info: Arc<str>,
}

impl AppState {
	pub fn new(
		registry: Arc<Registry>,
		admission: Arc<AdmissionController>,
		health: Arc<HealthChecker>,
		client: UpstreamClient,
		tools: Arc<ToolBus>,
		images: Arc<ImagesPipeline>,
		metrics: Arc<Metrics>,
		config: &GatewayConfig,
	) -> Self {
		AppState {
			registry,
			admission,
			health,
			client,
			tools,
			images,
			metrics,
			bearer_token: Arc::from(config.bearer_token.as_str()),
			ui_ip_allowlist: IpAllowlist::new(config.ui_ip_allowlist.clone()),
			images_backend_class: Arc::from(config.images_backend_class.as_str()),
			build_info: Arc::from(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
		}
	}
}
