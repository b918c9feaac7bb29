//! Tool bus: deterministic request hashing, replay IDs, and logging around the small
//! built-in tool set (§4.8).

pub mod canonical;
pub mod log;
pub mod registry;

use axum::http::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub use log::{LogMode, ToolLog, ToolLogRecord};
pub use registry::{ToolRegistry, ToolSpec};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
	#[error("unknown tool '{0}'")]
	NotFound(String),
	#[error("tool denied: {0}")]
	Denied(String),
	#[error("invalid arguments: {0}")]
	InvalidArguments(String),
}

impl ToolError {
	pub fn error_token(&self) -> &'static str {
		match self {
			ToolError::NotFound(_) => "not_found",
			ToolError::Denied(_) => "tool_denied",
			ToolError::InvalidArguments(_) => "invalid_arguments",
		}
	}

	pub fn status(&self) -> StatusCode {
		match self {
			ToolError::NotFound(_) => StatusCode::NOT_FOUND,
			ToolError::Denied(_) => StatusCode::FORBIDDEN,
			ToolError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocationResult {
	pub replay_id: String,
	pub request_hash: String,
	pub outcome: &'static str,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
}

/// `SHA-256(tool_name || 0x1F || canonical_json(args))`, hex-lowercase. The `0x1F`
/// unit-separator byte prevents a tool named `"ab"` with args `"cd"` from hashing the
/// same as `"a"` with args `"bcd"`.
pub fn request_hash(tool_name: &str, canonical_args: &serde_json::Value) -> String {
	let mut hasher = Sha256::new();
	hasher.update(tool_name.as_bytes());
	hasher.update([0x1F]);
	hasher.update(canonical::canonical_json_string(canonical_args).as_bytes());
	hex::encode(hasher.finalize())
}

fn new_replay_id() -> String {
	format!("replay-{:016x}", rand::random::<u128>())
}

pub struct ToolBus {
	registry: ToolRegistry,
	log: ToolLog,
}

impl ToolBus {
	pub fn new(registry: ToolRegistry, log: ToolLog) -> Self {
		ToolBus { registry, log }
	}

	pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
		self.registry.list()
	}

	pub async fn invoke(&self, tool_name: &str, raw_args: serde_json::Value) -> Result<ToolInvocationResult, ToolError> {
		let spec = self
			.registry
			.lookup(tool_name)
			.ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

		let canonical_args = canonical::canonicalize(&raw_args);
		let hash = request_hash(tool_name, &canonical_args);
		let replay_id = new_replay_id();
		let started_at = chrono::Utc::now();

		if self.registry.is_denied(spec) {
			let record = ToolLogRecord {
				replay_id: replay_id.clone(),
				tool_name: tool_name.to_string(),
				request_hash: hash.clone(),
				started_at,
				ended_at: chrono::Utc::now(),
				outcome: "denied",
				arguments: canonical_args,
				result_or_error: serde_json::json!({ "error": "denied" }),
			};
			let _ = self.log.record(&record).await;
			return Err(ToolError::Denied(format!("tool '{tool_name}' is not enabled")));
		}

		let run_result = spec.run(&canonical_args);
		let ended_at = chrono::Utc::now();

		match run_result {
			Ok(value) => {
				let record = ToolLogRecord {
					replay_id: replay_id.clone(),
					tool_name: tool_name.to_string(),
					request_hash: hash.clone(),
					started_at,
					ended_at,
					outcome: "ok",
					arguments: canonical_args,
					result_or_error: value.clone(),
				};
				let _ = self.log.record(&record).await;
				Ok(ToolInvocationResult {
					replay_id,
					request_hash: hash,
					outcome: "ok",
					result: Some(value),
					error: None,
				})
			},
			Err(ToolError::InvalidArguments(msg)) => Err(ToolError::InvalidArguments(msg)),
			Err(err) => {
				let record = ToolLogRecord {
					replay_id: replay_id.clone(),
					tool_name: tool_name.to_string(),
					request_hash: hash.clone(),
					started_at,
					ended_at,
					outcome: "failed",
					arguments: canonical_args,
					result_or_error: serde_json::json!({ "error": err.to_string() }),
				};
				let _ = self.log.record(&record).await;
				Ok(ToolInvocationResult {
					replay_id,
					request_hash: hash,
					outcome: "failed",
					result: None,
					error: Some(err.to_string()),
				})
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn bus() -> ToolBus {
		ToolBus::new(ToolRegistry::default(), ToolLog::disabled())
	}

	#[test]
	fn hash_is_stable_across_key_order_and_whitespace() {
		let a = canonical::canonicalize(&json!({"text": "hi", "n": 1}));
		let b = canonical::canonicalize(&json!({"n": 1, "text": "hi"}));
		assert_eq!(request_hash("echo", &a), request_hash("echo", &b));
	}

	#[tokio::test]
	async fn replay_ids_differ_for_identical_hash() {
		let bus = bus();
		let r1 = bus.invoke("echo", json!({"text": "hi"})).await.unwrap();
		let r2 = bus.invoke("echo", json!({"text": "hi"})).await.unwrap();
		assert_eq!(r1.request_hash, r2.request_hash);
		assert_ne!(r1.replay_id, r2.replay_id);
	}

	#[tokio::test]
	async fn unknown_tool_is_not_found() {
		let bus = bus();
		let err = bus.invoke("nope", json!({})).await.unwrap_err();
		assert!(matches!(err, ToolError::NotFound(_)));
	}

	#[tokio::test]
	async fn disabled_tool_is_denied() {
		let bus = bus();
		let err = bus.invoke("time_now", json!({})).await.unwrap_err();
		assert!(matches!(err, ToolError::Denied(_)));
	}

	#[tokio::test]
	async fn missing_required_argument_is_invalid_arguments_not_outcome_failed() {
		let bus = bus();
		let err = bus.invoke("echo", json!({})).await.unwrap_err();
		assert!(matches!(err, ToolError::InvalidArguments(_)));
	}
}
