//! `GET /v1/gateway/status`: aggregates admission and health state (§4.9). Bearer
//! protected but does not take admission, so it stays observable under load.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn gateway_status(State(state): State<AppState>) -> Json<Value> {
	let admission = state.admission.stats();
	let health = state.health.snapshot_all().await;
	Json(json!({
		"admission_control": admission,
		"backend_health": health,
		"build": state.build_info.as_ref(),
	}))
}
