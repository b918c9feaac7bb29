//! Umbrella error type. Centralizes the §7 error-kind → HTTP-status mapping in one
//! `IntoResponse` impl, matching the teacher's pattern in `sse.rs`'s `AuthError` rather
//! than scattering `StatusCode` literals through handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::admission::RejectReason;
use crate::auth::AuthError;
use crate::client::ClientError;
use crate::router::RouteError;
use crate::tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
	#[error(transparent)]
	Auth(#[from] AuthError),
	#[error(transparent)]
	Route(#[from] RouteError),
	#[error("backend '{backend}' is overloaded for route kind '{route_kind}'")]
	Overloaded { backend: String, backend_class: String, route_kind: &'static str },
	#[error("backend '{backend}' is not ready: {health_error:?}")]
	NotReady { backend: String, health_error: Option<String> },
	#[error("invalid arguments: {0}")]
	InvalidArguments(String),
	#[error(transparent)]
	Tool(#[from] ToolError),
	#[error("upstream returned an error: {status}: {message}")]
	UpstreamHttp { status: StatusCode, message: String },
	#[error("upstream request timed out")]
	UpstreamTimeout,
	#[error("upstream protocol violation: {0}")]
	UpstreamProtocol(String),
	#[error(transparent)]
	Client(#[from] ClientError),
	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl GatewayError {
	pub fn overloaded(backend: impl Into<String>, backend_class: impl Into<String>, route_kind: &'static str) -> Self {
		GatewayError::Overloaded { backend: backend.into(), backend_class: backend_class.into(), route_kind }
	}

	pub fn from_reject(backend: &str, backend_class: &str, route_kind: crate::registry::RouteKind, reason: RejectReason) -> Self {
		match reason {
			RejectReason::Overloaded => GatewayError::overloaded(backend, backend_class, route_kind.as_str()),
			RejectReason::NotAdmitted => GatewayError::InvalidArguments(format!(
				"route kind '{}' is not admitted for backend '{backend}'",
				route_kind.as_str()
			)),
		}
	}

	fn error_token(&self) -> &'static str {
		match self {
			GatewayError::Auth(_) => "auth_failed",
			GatewayError::Route(_) => "capability_not_supported",
			GatewayError::Overloaded { .. } => "backend_overloaded",
			GatewayError::NotReady { .. } => "backend_not_ready",
			GatewayError::InvalidArguments(_) => "invalid_arguments",
			GatewayError::Tool(e) => e.error_token(),
			GatewayError::UpstreamHttp { .. } => "upstream_http_error",
			GatewayError::UpstreamTimeout => "upstream_timeout",
			GatewayError::UpstreamProtocol(_) => "upstream_protocol_error",
			GatewayError::Client(_) => "upstream_http_error",
			GatewayError::Internal(_) => "internal_error",
		}
	}
}

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		let message = self.to_string();
		let token = self.error_token();
		let (status, retry_after): (StatusCode, Option<u64>) = match &self {
			GatewayError::Auth(AuthError::IpNotAllowed) => (StatusCode::FORBIDDEN, None),
			GatewayError::Auth(_) => (StatusCode::UNAUTHORIZED, None),
			GatewayError::Route(_) => (StatusCode::BAD_REQUEST, None),
			GatewayError::Overloaded { .. } => (StatusCode::TOO_MANY_REQUESTS, Some(5)),
			GatewayError::NotReady { .. } => (StatusCode::SERVICE_UNAVAILABLE, Some(30)),
			GatewayError::InvalidArguments(_) => (StatusCode::BAD_REQUEST, None),
			GatewayError::Tool(e) => (e.status(), None),
			GatewayError::UpstreamHttp { status, .. } => {
				if status.is_client_error() {
					(*status, None)
				} else {
					(StatusCode::BAD_GATEWAY, None)
				}
			},
			GatewayError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, None),
			GatewayError::UpstreamProtocol(_) => (StatusCode::BAD_GATEWAY, None),
			GatewayError::Client(_) => (StatusCode::BAD_GATEWAY, None),
			GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
		};

		let mut body = json!({ "error": token, "message": message });
		if let GatewayError::Overloaded { backend_class, route_kind, .. } = &self {
			body["backend_class"] = json!(backend_class);
			body["route_kind"] = json!(route_kind);
		}
		if let Some(seconds) = retry_after {
			body["retry_after"] = json!(seconds);
		}
		if let GatewayError::NotReady { health_error, .. } = &self {
			body["health_error"] = json!(health_error);
		}
		if let GatewayError::Route(RouteError::CapabilityNotSupported { backend_class, supported_capabilities, .. }) = &self {
			body["backend_class"] = json!(backend_class);
			body["supported_capabilities"] = json!(supported_capabilities);
		}

		let mut response = (status, Json(body)).into_response();
		if let Some(seconds) = retry_after {
			response
				.headers_mut()
				.insert("Retry-After", seconds.to_string().parse().unwrap());
		}
		response
	}
}


