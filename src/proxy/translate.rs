//! Per-upstream-family translation into the gateway's own chunk vocabulary (§4.6).
//!
//! Each translator consumes one raw upstream frame and yields zero or more
//! [`UpstreamChunk`]s; it never talks to the network itself.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamChunk {
	Delta(String),
	Thinking(String),
	Done,
}

/// *OpenAI-shaped SSE with `choices[].delta.content`* (§4.6 translation rules).
/// Leading/trailing empty deltas are suppressed; the `[DONE]` sentinel yields `Done`.
pub fn translate_openai_sse_data(data: &str) -> Vec<UpstreamChunk> {
	if data.trim() == "[DONE]" {
		return vec![UpstreamChunk::Done];
	}
	let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
		return Vec::new();
	};
	let mut chunks = Vec::new();
	if let Some(choices) = value.get("choices").and_then(|v| v.as_array()) {
		for choice in choices {
			if let Some(content) = choice.pointer("/delta/content").and_then(|v| v.as_str()) {
				if !content.is_empty() {
					chunks.push(UpstreamChunk::Delta(content.to_string()));
				}
			}
			if choice.pointer("/finish_reason").and_then(|v| v.as_str()).is_some() {
				chunks.push(UpstreamChunk::Done);
			}
		}
	}
	chunks
}

/// *Line-delimited JSON with `message.content`* (local runtime, §4.6/§6.2). A `thinking`
/// field maps to a `Thinking` chunk; `done: true` terminates the stream.
pub fn translate_line_json(line: &str) -> Vec<UpstreamChunk> {
	let trimmed = line.trim();
	if trimmed.is_empty() {
		return Vec::new();
	}
	let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
		return Vec::new();
	};
	let mut chunks = Vec::new();
	if let Some(thinking) = value.get("thinking").and_then(|v| v.as_str()) {
		if !thinking.is_empty() {
			chunks.push(UpstreamChunk::Thinking(thinking.to_string()));
		}
	}
	if let Some(content) = value.pointer("/message/content").and_then(|v| v.as_str()) {
		if !content.is_empty() {
			chunks.push(UpstreamChunk::Delta(content.to_string()));
		}
	}
	if value.get("done").and_then(|v| v.as_bool()) == Some(true) {
		chunks.push(UpstreamChunk::Done);
	}
	chunks
}
