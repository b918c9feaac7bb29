//! Ambient `/metrics` sub-registry, grounded in the teacher's `metrics.rs`/`mtrcs.rs`
//! pattern of a small prometheus-client sub-registry and a dedicated axum router.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tracing::error;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct RouteLabels {
	pub backend: String,
	pub route_kind: String,
	pub outcome: String,
}

pub struct Metrics {
	pub requests_total: Family<RouteLabels, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let sub = sub_registry(registry);
		let requests_total = Family::default();
		sub.register(
			"gateway_requests",
			"Total requests handled, labeled by backend, route kind, and outcome.",
			requests_total.clone(),
		);
		Metrics { requests_total }
	}

	pub fn record(&self, backend: &str, route_kind: &str, outcome: &str) {
		self.requests_total
			.get_or_create(&RouteLabels {
				backend: backend.to_string(),
				route_kind: route_kind.to_string(),
				outcome: outcome.to_string(),
			})
			.inc();
	}
}

/// Creates a metrics sub registry for ai-gateway.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("ai_gateway")
}

#[derive(Clone)]
pub struct MetricsState {
	pub registry: Arc<Mutex<Registry>>,
}

pub fn router(state: MetricsState) -> Router {
	Router::new().route("/metrics", get(metrics_handler)).with_state(state)
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
	let mut buffer = String::new();
	let registry = state.registry.lock().expect("metrics registry mutex poisoned");
	match encode(&mut buffer, &registry) {
		Ok(()) => (StatusCode::OK, buffer).into_response(),
		Err(e) => {
			error!(error = %e, "failed to encode metrics");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		},
	}
}
