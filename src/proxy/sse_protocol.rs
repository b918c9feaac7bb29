//! The gateway's own fixed SSE event protocol (§4.6): `route`, `thinking`, `delta`,
//! `error`, `done`, terminated by a `[DONE]` sentinel line.

use axum::response::sse::Event;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
	#[serde(rename = "route")]
	Route { backend: String, model: Option<String>, reason: &'static str },
	#[serde(rename = "thinking")]
	Thinking { thinking: String },
	#[serde(rename = "delta")]
	Delta { delta: String },
	#[serde(rename = "error")]
	Error { error: serde_json::Value },
	#[serde(rename = "done")]
	Done,
}

impl GatewayEvent {
	pub fn to_sse_event(&self) -> Event {
		Event::default().data(serde_json::to_string(self).expect("gateway event always serializes"))
	}

	pub fn error(token: &'static str, message: impl Into<String>) -> Self {
		GatewayEvent::Error { error: json!({ "error": token, "message": message.into() }) }
	}
}

/// The literal terminal sentinel line emitted once, after the last `GatewayEvent`.
pub fn done_sentinel() -> Event {
	Event::default().data("[DONE]")
}
