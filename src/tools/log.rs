//! Tool invocation logging: NDJSON append, per-invocation file, both, or none (§4.8).
//!
//! NDJSON writes are serialized by a per-file mutex and flushed after each line, matching
//! the §5 "tool log file... serialized by a per-file mutex; writes are line-atomic and
//! flushed" resource contract.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
	Ndjson,
	PerFile,
	Both,
	None,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolLogRecord {
	pub replay_id: String,
	pub tool_name: String,
	pub request_hash: String,
	pub started_at: chrono::DateTime<chrono::Utc>,
	pub ended_at: chrono::DateTime<chrono::Utc>,
	pub outcome: &'static str,
	pub arguments: serde_json::Value,
	pub result_or_error: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolLogError {
	#[error("failed to write tool log at {path}: {source}")]
	Write {
		path: String,
		#[source]
		source: std::io::Error,
	},
}

pub struct ToolLog {
	mode: LogMode,
	ndjson_path: Option<PathBuf>,
	per_file_dir: Option<PathBuf>,
	ndjson_lock: Arc<Mutex<()>>,
}

impl ToolLog {
	pub fn new(mode: LogMode, ndjson_path: Option<PathBuf>, per_file_dir: Option<PathBuf>) -> Self {
		ToolLog {
			mode,
			ndjson_path,
			per_file_dir,
			ndjson_lock: Arc::new(Mutex::new(())),
		}
	}

	pub fn disabled() -> Self {
		ToolLog::new(LogMode::None, None, None)
	}

	pub async fn record(&self, record: &ToolLogRecord) -> Result<(), ToolLogError> {
		if matches!(self.mode, LogMode::None) {
			return Ok(());
		}
		if matches!(self.mode, LogMode::Ndjson | LogMode::Both) {
			self.append_ndjson(record).await?;
		}
		if matches!(self.mode, LogMode::PerFile | LogMode::Both) {
			self.write_per_file(record).await?;
		}
		Ok(())
	}

	async fn append_ndjson(&self, record: &ToolLogRecord) -> Result<(), ToolLogError> {
		let Some(path) = &self.ndjson_path else { return Ok(()) };
		let _guard = self.ndjson_lock.lock().await;
		let line = serde_json::to_string(record).expect("log record always serializes");
		let path = path.clone();
		tokio::task::spawn_blocking(move || {
			let mut file = std::fs::OpenOptions::new()
				.create(true)
				.append(true)
				.open(&path)
				.map_err(|e| ToolLogError::Write { path: path.display().to_string(), source: e })?;
			writeln!(file, "{line}").map_err(|e| ToolLogError::Write { path: path.display().to_string(), source: e })?;
			file.flush().map_err(|e| ToolLogError::Write { path: path.display().to_string(), source: e })
		})
		.await
		.expect("blocking ndjson write task panicked")
	}

	async fn write_per_file(&self, record: &ToolLogRecord) -> Result<(), ToolLogError> {
		let Some(dir) = &self.per_file_dir else { return Ok(()) };
		let path = dir.join(format!("{}.json", record.replay_id));
		let body = serde_json::to_vec_pretty(record).expect("log record always serializes");
		tokio::fs::write(&path, body)
			.await
			.map_err(|e| ToolLogError::Write { path: path.display().to_string(), source: e })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn sample_record() -> ToolLogRecord {
		let now = chrono::Utc::now();
		ToolLogRecord {
			replay_id: "replay-1".into(),
			tool_name: "echo".into(),
			request_hash: "deadbeef".into(),
			started_at: now,
			ended_at: now,
			outcome: "ok",
			arguments: json!({"text": "hi"}),
			result_or_error: json!({"text": "hi"}),
		}
	}

	#[tokio::test]
	async fn disabled_log_writes_nothing() {
		let log = ToolLog::disabled();
		log.record(&sample_record()).await.unwrap();
	}

	#[tokio::test]
	async fn ndjson_mode_appends_a_line() {
		let dir = tempdir();
		let path = dir.join("tools.ndjson");
		let log = ToolLog::new(LogMode::Ndjson, Some(path.clone()), None);
		log.record(&sample_record()).await.unwrap();
		let contents = tokio::fs::read_to_string(&path).await.unwrap();
		assert_eq!(contents.lines().count(), 1);
		assert!(contents.contains("replay-1"));
	}

	#[tokio::test]
	async fn per_file_mode_writes_named_file() {
		let dir = tempdir();
		let log = ToolLog::new(LogMode::PerFile, None, Some(dir.clone()));
		log.record(&sample_record()).await.unwrap();
		let contents = tokio::fs::read_to_string(dir.join("replay-1.json")).await.unwrap();
		assert!(contents.contains("\"tool_name\": \"echo\""));
	}

	fn tempdir() -> PathBuf {
		let dir = std::env::temp_dir().join(format!("ai-gateway-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}
}
