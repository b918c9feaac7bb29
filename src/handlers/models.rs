//! `GET /v1/models`: union of client-visible model ids across backends, aliases
//! included (§6.1).

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::registry::Capability;
use crate::state::AppState;

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
	let mut ids = std::collections::BTreeSet::new();
	for backend in state.registry.iter() {
		if backend.supported_capabilities.contains(&Capability::Chat) || backend.supported_capabilities.contains(&Capability::Embeddings) {
			if let Some(default_model) = &backend.default_model {
				ids.insert(default_model.clone());
			}
			for client_visible in backend.model_aliases.keys() {
				ids.insert(client_visible.clone());
			}
		}
	}

	let data: Vec<Value> = ids
		.into_iter()
		.map(|id| json!({ "id": id, "object": "model" }))
		.collect();
	Json(json!({ "object": "list", "data": data }))
}
