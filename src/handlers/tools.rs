//! `GET /v1/tools` and `POST /v1/tools/{name}` (§4.8).

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::state::AppState;

pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
	let tools: Vec<Value> = state
		.tools
		.list()
		.map(|spec| {
			json!({
				"name": spec.name,
				"description": spec.description,
				"schema": (spec.schema)(),
				"enabled": spec.enabled_by_default,
			})
		})
		.collect();
	Json(json!({ "tools": tools }))
}

pub async fn invoke_tool(
	State(state): State<AppState>,
	Path(name): Path<String>,
	body: Option<Json<Value>>,
) -> Result<Response, GatewayError> {
	let args = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
	let result = state.tools.invoke(&name, args).await?;
	// `denied`/`not_found`/`invalid_arguments` surface as the `?` above via GatewayError;
	// everything that reaches here ran, so 200 with `outcome` carrying the verdict (§4.8).
	Ok((
		axum::http::StatusCode::OK,
		Json(json!({
			"replay_id": result.replay_id,
			"request_hash": result.request_hash,
			"outcome": result.outcome,
			"result": result.result,
			"error": result.error,
		})),
	)
		.into_response())
}
