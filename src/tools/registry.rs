//! The built-in tool set. Small and closed by design (§4.8): no dynamic plugin
//! loading. Each tool is a pure function of its canonical arguments.

use serde_json::{Value, json};

use super::ToolError;

pub struct ToolSpec {
	pub name: &'static str,
	pub description: &'static str,
	/// JSON Schema for argument validation, surfaced verbatim by `GET /v1/tools`.
	pub schema: fn() -> Value,
	pub enabled_by_default: bool,
	run: fn(&Value) -> Result<Value, ToolError>,
}

impl ToolSpec {
	pub fn run(&self, args: &Value) -> Result<Value, ToolError> {
		(self.run)(args)
	}
}

pub struct ToolRegistry {
	specs: Vec<ToolSpec>,
}

impl Default for ToolRegistry {
	fn default() -> Self {
		ToolRegistry {
			specs: vec![echo_spec(), text_stats_spec(), time_now_spec()],
		}
	}
}

impl ToolRegistry {
	pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
		self.specs.iter().find(|s| s.name == name)
	}

	pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
		self.specs.iter()
	}

	pub fn is_denied(&self, spec: &ToolSpec) -> bool {
		!spec.enabled_by_default
	}
}

fn echo_spec() -> ToolSpec {
	ToolSpec {
		name: "echo",
		description: "Returns its `text` argument unchanged.",
		schema: || {
			json!({
				"type": "object",
				"properties": { "text": { "type": "string" } },
				"required": ["text"],
				"additionalProperties": false,
			})
		},
		enabled_by_default: true,
		run: |args| {
			let text = args
				.get("text")
				.and_then(Value::as_str)
				.ok_or_else(|| ToolError::InvalidArguments("missing required field 'text'".into()))?;
			Ok(json!({ "text": text }))
		},
	}
}

fn text_stats_spec() -> ToolSpec {
	ToolSpec {
		name: "text_stats",
		description: "Computes character, word, and line counts for `text`.",
		schema: || {
			json!({
				"type": "object",
				"properties": { "text": { "type": "string" } },
				"required": ["text"],
				"additionalProperties": false,
			})
		},
		enabled_by_default: true,
		run: |args| {
			let text = args
				.get("text")
				.and_then(Value::as_str)
				.ok_or_else(|| ToolError::InvalidArguments("missing required field 'text'".into()))?;
			Ok(json!({
				"characters": text.chars().count(),
				"words": text.split_whitespace().count(),
				"lines": text.lines().count(),
			}))
		},
	}
}

/// Disabled by default: wall-clock time is non-deterministic and breaks replay unless
/// the caller has frozen time (out of scope for the core), matching §4.8.
fn time_now_spec() -> ToolSpec {
	ToolSpec {
		name: "time_now",
		description: "Returns the current time. Non-deterministic; disabled by default.",
		schema: || json!({ "type": "object", "properties": {}, "additionalProperties": false }),
		enabled_by_default: false,
		run: |_args| Err(ToolError::Denied("time_now is disabled by default".into())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn echo_returns_input_text() {
		let registry = ToolRegistry::default();
		let spec = registry.lookup("echo").unwrap();
		let result = spec.run(&json!({"text": "hi"})).unwrap();
		assert_eq!(result, json!({"text": "hi"}));
	}

	#[test]
	fn text_stats_counts_words() {
		let registry = ToolRegistry::default();
		let spec = registry.lookup("text_stats").unwrap();
		let result = spec.run(&json!({"text": "a b c"})).unwrap();
		assert_eq!(result["words"], json!(3));
	}

	#[test]
	fn time_now_is_denied_by_default() {
		let registry = ToolRegistry::default();
		let spec = registry.lookup("time_now").unwrap();
		assert!(registry.is_denied(spec));
	}

	#[test]
	fn unknown_tool_is_absent() {
		let registry = ToolRegistry::default();
		assert!(registry.lookup("does_not_exist").is_none());
	}
}
