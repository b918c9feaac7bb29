//! Chat completions endpoint: non-streaming passthrough and SSE streaming proxy (§4.6).

use std::time::Duration;

use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::registry::{Capability, ChatProtocol};
use crate::router::{self, RouteDecision};
use crate::state::AppState;

use super::sse_protocol::{done_sentinel, GatewayEvent};
use super::translate::{translate_line_json, translate_openai_sse_data, UpstreamChunk};

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub stream: bool,
	#[serde(flatten)]
	pub rest: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct GatewayDecisionEcho<'a> {
	backend: &'a str,
	model: &'a Option<String>,
	reason: &'static str,
}

pub async fn handle_chat_completions(state: AppState, req: ChatCompletionRequest) -> Result<Response, GatewayError> {
	let decision = router::route(&state.registry, Capability::Chat, req.model.as_deref())?;

	if !state.health.is_routable(&decision.backend_name).await {
		let health_error = state.health.last_error(&decision.backend_name).await;
		return Err(GatewayError::NotReady { backend: decision.backend_name, health_error });
	}

	let slot = state
		.admission
		.try_acquire(&decision.backend_name, Capability::Chat)
		.map_err(|reason| GatewayError::from_reject(&decision.backend_name, &decision.backend_class, Capability::Chat, reason))?;

	let backend = state
		.registry
		.lookup(&decision.backend_name)
		.expect("routed backend must exist in registry")
		.clone();

	let mut upstream_body = req.rest.clone();
	if let Some(model) = &decision.upstream_model {
		upstream_body.insert("model".to_string(), Value::String(model.clone()));
	}
	let upstream_body = Value::Object(upstream_body);

	let url = backend
		.base_url
		.join(&backend.chat_path)
		.map_err(|e| GatewayError::Internal(e.into()))?;

	if req.stream {
		stream_chat(state, slot, decision, backend, url, upstream_body).await
	} else {
		non_streaming_chat(state, slot, decision, url, upstream_body).await
	}
}

async fn non_streaming_chat(
	state: AppState,
	slot: crate::admission::Slot,
	decision: RouteDecision,
	url: url::Url,
	upstream_body: Value,
) -> Result<Response, GatewayError> {
	let resp = state.client.post_json(url, &upstream_body).await.map_err(GatewayError::Client)?;
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

	let mut body: Value = resp.json().await.map_err(|e| GatewayError::Client(e.into()))?;
	if let Value::Object(map) = &mut body {
		map.insert(
			"_gateway".to_string(),
			serde_json::to_value(GatewayDecisionEcho {
				backend: &decision.backend_name,
				model: &decision.upstream_model,
				reason: decision.reason,
			})
			.expect("decision echo always serializes"),
		);
	}

	state.metrics.record(&decision.backend_name, "chat", "ok");

	let mut response = axum::Json(body).into_response();
	insert_instrumentation_headers(&mut response, &decision);
	Ok(response)
}

fn insert_instrumentation_headers(response: &mut Response, decision: &RouteDecision) {
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
}

async fn stream_chat(
	state: AppState,
	slot: crate::admission::Slot,
	decision: RouteDecision,
	backend: crate::registry::BackendConfig,
	url: url::Url,
	upstream_body: Value,
) -> Result<Response, GatewayError> {
	let (tx, rx) = mpsc::channel::<axum::response::sse::Event>(CHANNEL_CAPACITY);

	let route_event = GatewayEvent::Route {
		backend: decision.backend_name.clone(),
		model: decision.upstream_model.clone(),
		reason: decision.reason,
	};
	// Header instrumentation must be set before the first body byte; we build the SSE
	// response (headers) before the background task has produced anything, then hand it
	// the `route` event as the first item sent through the channel.
	if tx.send(route_event.to_sse_event()).await.is_err() {
		return Err(GatewayError::Internal(anyhow::anyhow!("gateway event channel closed before route event")));
	}

	let backend_name = decision.backend_name.clone();
	let metrics = state.metrics.clone();
	let emit_thinking = backend.emit_thinking;
	let chat_protocol = backend.chat_protocol;

	tokio::spawn(async move {
		// `slot` and `tx` are moved in; dropping either (task completion or early
		// `return`) releases the admission slot and closes the SSE channel.
		let _slot = slot;
		let outcome = run_upstream_stream(&state, url, upstream_body, chat_protocol, emit_thinking, &tx).await;
		match outcome {
			Ok(()) => metrics.record(&backend_name, "chat", "ok"),
			Err(err) => {
				warn!(backend = %backend_name, error = %err, "chat stream ended with error");
				let _ = tx.send(GatewayEvent::error(err.token(), err.to_string()).to_sse_event()).await;
				metrics.record(&backend_name, "chat", "error");
			},
		}
		let _ = tx.send(done_sentinel()).await;
	});

	let mut response = Sse::new(ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>))
		.keep_alive(KeepAlive::default())
		.into_response();
	insert_instrumentation_headers(&mut response, &decision);
	Ok(response)
}

#[derive(Debug, thiserror::Error)]
enum StreamError {
	#[error("upstream request failed: {0}")]
	Client(#[from] crate::client::ClientError),
	#[error("upstream returned status {0}")]
	Status(axum::http::StatusCode),
	#[error("no upstream bytes received for over {0:?}")]
	Idle(Duration),
	#[error("upstream stream protocol error: {0}")]
	Protocol(String),
}

impl StreamError {
	fn token(&self) -> &'static str {
		match self {
			StreamError::Client(_) | StreamError::Status(_) => "upstream_http_error",
			StreamError::Idle(_) => "upstream_timeout",
			StreamError::Protocol(_) => "upstream_protocol_error",
		}
	}
}

async fn run_upstream_stream(
	state: &AppState,
	url: url::Url,
	body: Value,
	protocol: ChatProtocol,
	emit_thinking: bool,
	tx: &mpsc::Sender<axum::response::sse::Event>,
) -> Result<(), StreamError> {
	let resp = state.client.post_json_streaming(url, &body).await?;
	if !resp.status().is_success() {
		return Err(StreamError::Status(resp.status()));
	}

	let mut byte_stream = resp.bytes_stream();

	match protocol {
		ChatProtocol::OpenaiSse => {
			let mut events = byte_stream.eventsource();
			loop {
				let next = tokio::time::timeout(IDLE_TIMEOUT, events.next())
					.await
					.map_err(|_| StreamError::Idle(IDLE_TIMEOUT))?;
				let Some(event) = next else { break };
				let event = event.map_err(|e| StreamError::Protocol(e.to_string()))?;
				for chunk in translate_openai_sse_data(&event.data) {
					if emit_and_check_done(tx, chunk, emit_thinking).await? {
						return Ok(());
					}
				}
			}
		},
		ChatProtocol::LineJson => {
			let mut buffer = Vec::new();
			loop {
				let next = tokio::time::timeout(IDLE_TIMEOUT, byte_stream.next())
					.await
					.map_err(|_| StreamError::Idle(IDLE_TIMEOUT))?;
				let Some(bytes) = next else { break };
				let bytes = bytes.map_err(|e| StreamError::Client(crate::client::ClientError::Request(e)))?;
				buffer.extend_from_slice(&bytes);
				while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
					let line: Vec<u8> = buffer.drain(..=pos).collect();
					let line = String::from_utf8_lossy(&line);
					for chunk in translate_line_json(&line) {
						if emit_and_check_done(tx, chunk, emit_thinking).await? {
							return Ok(());
						}
					}
				}
			}
		},
	}

	Ok(())
}

async fn emit_and_check_done(
	tx: &mpsc::Sender<axum::response::sse::Event>,
	chunk: UpstreamChunk,
	emit_thinking: bool,
) -> Result<bool, StreamError> {
	let event = match chunk {
		UpstreamChunk::Delta(delta) => GatewayEvent::Delta { delta },
		UpstreamChunk::Thinking(thinking) => {
			if !emit_thinking {
				return Ok(false);
			}
			GatewayEvent::Thinking { thinking }
		},
		UpstreamChunk::Done => {
			if tx.send(GatewayEvent::Done.to_sse_event()).await.is_err() {
				info!("client disconnected before done event");
			}
			return Ok(true);
		},
	};
	if tx.send(event.to_sse_event()).await.is_err() {
		// receiver dropped: client disconnected. Treat as a clean stop, not an error.
		return Ok(true);
	}
	Ok(false)
}
