//! `POST /v1/embeddings`: non-streaming proxy, same gate order as chat (§6.1).

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::registry::Capability;
use crate::router;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
	#[serde(default)]
	pub model: Option<String>,
	#[serde(flatten)]
	pub rest: Map<String, Value>,
}

pub async fn embeddings(State(state): State<AppState>, Json(req): Json<EmbeddingsRequest>) -> Result<Response, GatewayError> {
	let decision = router::route(&state.registry, Capability::Embeddings, req.model.as_deref())?;

	if !state.health.is_routable(&decision.backend_name).await {
		let health_error = state.health.last_error(&decision.backend_name).await;
		return Err(GatewayError::NotReady { backend: decision.backend_name, health_error });
	}

	let slot = state
		.admission
		.try_acquire(&decision.backend_name, Capability::Embeddings)
		.map_err(|reason| GatewayError::from_reject(&decision.backend_name, &decision.backend_class, Capability::Embeddings, reason))?;

	let backend = state
		.registry
		.lookup(&decision.backend_name)
		.expect("routed backend must exist in registry");

	let mut upstream_body = req.rest;
	if let Some(model) = &decision.upstream_model {
		upstream_body.insert("model".to_string(), Value::String(model.clone()));
	}

	let url = backend
		.base_url
		.join("/v1/embeddings")
		.map_err(|e| GatewayError::Internal(e.into()))?;

	let resp = state
		.client
		.post_json(url, &Value::Object(upstream_body))
		.await
		.map_err(GatewayError::Client)?;
	drop(slot);

	if resp.status().is_client_error() {
		let status = resp.status();
		let message = resp.text().await.unwrap_or_default();
		return Err(GatewayError::UpstreamHttp { status, message });
	}
	if resp.status().is_server_error() {
		let message = resp.text().await.unwrap_or_default();
		return Err(GatewayError::UpstreamHttp { status: axum::http::StatusCode::BAD_GATEWAY, message });
	}

	let body: Value = resp.json().await.map_err(|e| GatewayError::Client(e.into()))?;
	state.metrics.record(&decision.backend_name, "embeddings", "ok");

	let mut response = Json(body).into_response();
	let headers = response.headers_mut();
	if let Ok(v) = decision.backend_name.parse() {
		headers.insert("X-Backend-Used", v);
	}
	if let Some(model) = &decision.upstream_model {
		if let Ok(v) = model.parse() {
			headers.insert("X-Model-Used", v);
		}
	}
	if let Ok(v) = decision.reason.parse() {
		headers.insert("X-Router-Reason", v);
	}
	Ok(response)
}
