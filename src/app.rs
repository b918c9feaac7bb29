//! Axum router wiring: public `/health`, bearer-protected `/v1/*`, IP-allowlisted
//! `/ui/images/*` (gated inside its handler since it needs the caller's socket addr).

use axum::extract::State;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::GatewayError;
use crate::handlers;
use crate::state::AppState;

async fn require_bearer(State(state): State<AppState>, request: axum::extract::Request, next: Next) -> Response {
	match crate::auth::check_bearer(request.headers(), &state.bearer_token) {
		Ok(()) => next.run(request).await,
		Err(err) => GatewayError::Auth(err).into_response(),
	}
}

async fn health() -> Json<serde_json::Value> {
	Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
	let protected = Router::new()
		.route("/v1/models", get(handlers::models::list_models))
		.route("/v1/chat/completions", post(handlers::chat::chat_completions))
		.route("/v1/embeddings", post(handlers::embeddings::embeddings))
		.route("/v1/images/generations", post(handlers::images::generate))
		.route("/v1/tools", get(handlers::tools::list_tools))
		.route("/v1/tools/{name}", post(handlers::tools::invoke_tool))
		.route("/v1/gateway/status", get(handlers::status::gateway_status))
		.route("/ui/images/{filename}", get(handlers::images::serve_image))
		.layer(middleware::from_fn_with_state(state.clone(), require_bearer));

	Router::new()
		.route("/health", get(health))
		.merge(protected)
		.layer(CorsLayer::permissive())
		.with_state(state)
}
