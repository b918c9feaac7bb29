//! Thin axum wrapper around [`crate::proxy::handle_chat_completions`].

use axum::Json;
use axum::extract::State;
use axum::response::Response;

use crate::error::GatewayError;
use crate::proxy::{self, ChatCompletionRequest};
use crate::state::AppState;

pub async fn chat_completions(State(state): State<AppState>, Json(req): Json<ChatCompletionRequest>) -> Result<Response, GatewayError> {
	proxy::handle_chat_completions(state, req).await
}
