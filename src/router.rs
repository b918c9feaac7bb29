//! Router: a pure function of `(route_kind, client_hint)` to a [`RouteDecision`].
//!
//! No I/O, no health/admission awareness — those are gates applied by the caller
//! after a decision is made (§4.4). Keeping this free of side effects is what makes
//! routing deterministic and trivially unit-testable.

use serde::Serialize;

use crate::registry::{Capability, Registry, RouteKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
	pub backend_name: String,
	pub backend_class: String,
	pub upstream_model: Option<String>,
	pub reason: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
	#[error("capability '{route_kind}' is not supported by any configured backend (requested hint: {hint:?})")]
	CapabilityNotSupported {
		route_kind: &'static str,
		hint: Option<String>,
		/// The pinned backend's class, when the hint named a concrete backend that simply
		/// lacks the capability (§4.4 step 2). `None` when no specific backend was pinned.
		backend_class: Option<String>,
		/// That backend's declared capabilities, for the client to pick a different model.
		supported_capabilities: Vec<String>,
	},
}

/// Normalizes a client-supplied model hint: trims whitespace and maps legacy backend
/// names through the registry's legacy map. Empty strings are treated as absent.
fn normalize_hint(registry: &Registry, hint: Option<&str>) -> Option<String> {
	let trimmed = hint.map(str::trim).filter(|s| !s.is_empty())?;
	Some(registry.resolve_legacy(trimmed).to_string())
}

/// Resolves an alias that is scoped to a specific backend's `model_aliases` table.
fn apply_model_alias(registry: &Registry, backend_name: &str, model: &str) -> String {
	registry
		.lookup(backend_name)
		.and_then(|b| b.model_aliases.get(model))
		.cloned()
		.unwrap_or_else(|| model.to_string())
}

pub fn route(registry: &Registry, route_kind: RouteKind, client_hint: Option<&str>) -> Result<RouteDecision, RouteError> {
	let hint = normalize_hint(registry, client_hint);

	// Step 2: does the (normalized) hint directly name a backend?
	if let Some(name) = &hint {
		if let Some(backend) = registry.lookup(name) {
			if backend.supported_capabilities.contains(&route_kind) {
				let upstream_model = resolve_upstream_model(registry, &backend.name, client_hint);
				return Ok(RouteDecision {
					backend_name: backend.name.clone(),
					backend_class: backend.class.clone(),
					upstream_model,
					reason: "client_pinned",
				});
			}
			let mut supported: Vec<String> = backend.supported_capabilities.iter().map(|c| c.as_str().to_string()).collect();
			supported.sort();
			return Err(RouteError::CapabilityNotSupported {
				route_kind: route_kind.as_str(),
				hint,
				backend_class: Some(backend.class.clone()),
				supported_capabilities: supported,
			});
		}
	}

	// Step 3: declarative route preference table.
	for candidate in registry.route_preferences(route_kind) {
		if let Some(backend) = registry.lookup(candidate) {
			if backend.supported_capabilities.contains(&route_kind) {
				let upstream_model = resolve_upstream_model(registry, &backend.name, client_hint);
				let reason = if hint.is_some() { "alias_expanded" } else { "default_preference" };
				return Ok(RouteDecision {
					backend_name: backend.name.clone(),
					backend_class: backend.class.clone(),
					upstream_model,
					reason,
				});
			}
		}
	}

	// No preference table entry: fall back to any backend advertising the capability.
	if hint.is_none() {
		if let Some(backend) = registry.iter().find(|b| b.supported_capabilities.contains(&route_kind)) {
			let upstream_model = resolve_upstream_model(registry, &backend.name, client_hint);
			return Ok(RouteDecision {
				backend_name: backend.name.clone(),
				backend_class: backend.class.clone(),
				upstream_model,
				reason: "capability_only",
			});
		}
	}

	Err(RouteError::CapabilityNotSupported {
		route_kind: route_kind.as_str(),
		hint,
		backend_class: None,
		supported_capabilities: Vec::new(),
	})
}

fn resolve_upstream_model(registry: &Registry, backend_name: &str, client_hint: Option<&str>) -> Option<String> {
	let backend = registry.lookup(backend_name)?;
	match client_hint.map(str::trim).filter(|s| !s.is_empty()) {
		Some(model) => Some(apply_model_alias(registry, backend_name, model)),
		None => backend.default_model.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> Registry {
		Registry::load(
			r#"
backends:
  - name: local_mlx
    class: local_mlx
    baseUrl: http://127.0.0.1:8081
    supportedCapabilities: [chat]
    concurrencyLimits: { chat: 1 }
    health: { liveness: /h, readiness: /r }
    defaultModel: qwen-local
    modelAliases: { fast: qwen-local-q4 }
  - name: gpu_fast
    class: gpu_fast
    baseUrl: http://127.0.0.1:8082
    supportedCapabilities: [chat, embeddings]
    concurrencyLimits: { chat: 4, embeddings: 8 }
    health: { liveness: /h, readiness: /r }
  - name: gpu_heavy
    class: gpu_heavy
    baseUrl: http://127.0.0.1:8083
    supportedCapabilities: [images]
    concurrencyLimits: { images: 2 }
    health: { liveness: /h, readiness: /r }
legacyNames:
  ollama: gpu_fast
routePreferences:
  chat: [gpu_fast, local_mlx]
  images: [gpu_heavy]
"#,
		)
		.unwrap()
	}

	#[test]
	fn direct_backend_name_pins() {
		let reg = registry();
		let decision = route(&reg, Capability::Chat, Some("local_mlx")).unwrap();
		assert_eq!(decision.backend_name, "local_mlx");
		assert_eq!(decision.reason, "client_pinned");
		assert_eq!(decision.upstream_model.as_deref(), Some("qwen-local"));
	}

	#[test]
	fn legacy_name_resolves_before_pinning() {
		let reg = registry();
		let decision = route(&reg, Capability::Chat, Some("ollama")).unwrap();
		assert_eq!(decision.backend_name, "gpu_fast");
		assert_eq!(decision.reason, "client_pinned");
	}

	#[test]
	fn model_alias_applies_within_pinned_backend() {
		let reg = registry();
		let decision = route(&reg, Capability::Chat, Some("fast")).unwrap();
		// "fast" isn't a backend name, so it isn't pinned; falls through to preference table.
		assert_eq!(decision.reason, "alias_expanded");
		assert_eq!(decision.backend_name, "gpu_fast");
	}

	#[test]
	fn empty_hint_uses_preference_table() {
		let reg = registry();
		let decision = route(&reg, Capability::Chat, None).unwrap();
		assert_eq!(decision.backend_name, "gpu_fast");
		assert_eq!(decision.reason, "default_preference");
	}

	#[test]
	fn whitespace_hint_is_treated_as_absent() {
		let reg = registry();
		let decision = route(&reg, Capability::Chat, Some("   ")).unwrap();
		assert_eq!(decision.reason, "default_preference");
	}

	#[test]
	fn pinned_backend_without_capability_is_rejected() {
		let reg = registry();
		let err = route(&reg, Capability::Images, Some("local_mlx")).unwrap_err();
		match err {
			RouteError::CapabilityNotSupported { route_kind, backend_class, supported_capabilities, .. } => {
				assert_eq!(route_kind, "images");
				assert_eq!(backend_class.as_deref(), Some("local_mlx"));
				assert_eq!(supported_capabilities, vec!["chat".to_string()]);
			},
		}
	}

	#[test]
	fn unsupported_capability_with_no_preference_entry_errors() {
		let reg = registry();
		let err = route(&reg, Capability::Tts, None).unwrap_err();
		match err {
			RouteError::CapabilityNotSupported { route_kind, backend_class, supported_capabilities, .. } => {
				assert_eq!(route_kind, "tts");
				assert_eq!(backend_class, None);
				assert!(supported_capabilities.is_empty());
			},
		}
	}
}
