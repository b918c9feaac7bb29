//! `POST /v1/images/generations` and the IP-allowlisted `GET /ui/images/{filename}`
//! static serve (§4.7, §4.10).

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::response::{IntoResponse, Response};

use crate::error::GatewayError;
use crate::images::{self, ImageGenerationRequest};
use crate::registry::Capability;
use crate::router;
use crate::state::AppState;

pub async fn generate(State(state): State<AppState>, Json(req): Json<ImageGenerationRequest>) -> Result<Response, GatewayError> {
	let decision = router::route(&state.registry, Capability::Images, Some(state.images_backend_class.as_ref()))?;

	if !state.health.is_routable(&decision.backend_name).await {
		let health_error = state.health.last_error(&decision.backend_name).await;
		return Err(GatewayError::NotReady { backend: decision.backend_name, health_error });
	}

	let slot = state
		.admission
		.try_acquire(&decision.backend_name, Capability::Images)
		.map_err(|reason| GatewayError::from_reject(&decision.backend_name, &decision.backend_class, Capability::Images, reason))?;

	let result = state.images.generate(&req, &decision.backend_name, &decision.backend_class).await;
	drop(slot);
	let body = result?;

	state.metrics.record(&decision.backend_name, "images", "ok");

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

pub async fn serve_image(
	State(state): State<AppState>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	Path(filename): Path<String>,
) -> Result<Response, GatewayError> {
	state.ui_ip_allowlist.check(addr.ip()).map_err(GatewayError::Auth)?;

	let dir = state.images.image_dir();
	let path = images::image_path(dir, &filename)
		.ok_or_else(|| GatewayError::InvalidArguments("invalid image filename".into()))?;
	let bytes = tokio::fs::read(&path).await.map_err(|_| GatewayError::Internal(anyhow::anyhow!("image not found: {filename}")))?;
	let mime = mime_guess_from_filename(&filename);
	Ok(([(axum::http::header::CONTENT_TYPE, mime)], bytes).into_response())
}

fn mime_guess_from_filename(filename: &str) -> &'static str {
	if filename.ends_with(".png") {
		"image/png"
	} else if filename.ends_with(".jpg") || filename.ends_with(".jpeg") {
		"image/jpeg"
	} else if filename.ends_with(".webp") {
		"image/webp"
	} else if filename.ends_with(".svg") {
		"image/svg+xml"
	} else {
		"application/octet-stream"
	}
}
