//! Backend registry: the declarative, load-once description of the backend fleet.
//!
//! Mirrors the teacher's `types::local` pattern of a `deny_unknown_fields`, camelCase
//! document parsed once at startup and converted into an immutable in-memory form.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

/// A workload kind a backend can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	Chat,
	Embeddings,
	Images,
	Tts,
	Music,
	Video,
}

impl Capability {
	pub fn as_str(&self) -> &'static str {
		match self {
			Capability::Chat => "chat",
			Capability::Embeddings => "embeddings",
			Capability::Images => "images",
			Capability::Tts => "tts",
			Capability::Music => "music",
			Capability::Video => "video",
		}
	}
}

/// The category of work being routed. Distinct from `Capability` only in name today,
/// but kept as its own type since a route kind is a request-plane concept while a
/// capability is a registry-declared fact about a backend.
pub type RouteKind = Capability;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPolicy {
	#[serde(default)]
	pub images_format: Option<ImagesFormat>,
	#[serde(default)]
	pub images_allow_base64: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagesFormat {
	Url,
	B64Json,
}

/// Which upstream chat streaming shape a backend speaks (§6.2). Distinct from
/// `emit_thinking`: a backend could in principle speak line-JSON without a thinking
/// channel, so the two are independent knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatProtocol {
	#[default]
	OpenaiSse,
	LineJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPaths {
	pub liveness: String,
	pub readiness: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendConfig {
	pub name: String,
	pub class: String,
	pub base_url: Url,
	pub supported_capabilities: HashSet<Capability>,
	pub concurrency_limits: HashMap<RouteKind, u32>,
	pub health: HealthPaths,
	#[serde(default)]
	pub payload_policy: PayloadPolicy,
	#[serde(default)]
	pub model_aliases: HashMap<String, String>,
	#[serde(default)]
	pub default_model: Option<String>,
	/// Whether this backend's streaming responses carry a `thinking` channel.
	/// Explicit per-backend configuration, resolving the open question in the upstream
	/// source about which hardcoded backend name should trigger it.
	#[serde(default)]
	pub emit_thinking: bool,
	#[serde(default)]
	pub chat_protocol: ChatProtocol,
	/// Path the chat completion call is POSTed to on this backend.
	#[serde(default = "default_chat_path")]
	pub chat_path: String,
}

fn default_chat_path() -> String {
	"/v1/chat/completions".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistryDocument {
	pub backends: Vec<BackendConfig>,
	/// Legacy backend name -> canonical backend name, e.g. `ollama -> gpu_fast`.
	#[serde(default)]
	pub legacy_names: HashMap<String, String>,
	/// route_kind -> ordered list of backend names to prefer when the client gives no hint.
	#[serde(default)]
	pub route_preferences: HashMap<RouteKind, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("failed to parse backend registry document: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("backend '{0}' declares capability '{1}' with no matching concurrency limit")]
	MissingConcurrencyLimit(String, &'static str),
	#[error("duplicate backend name '{0}'")]
	DuplicateName(String),
	#[error("legacy name '{0}' maps to unknown backend '{1}'")]
	UnknownLegacyTarget(String, String),
	#[error("route preference list for '{0:?}' names unknown backend '{1}'")]
	UnknownRoutePreference(RouteKind, String),
}

/// Immutable, load-once registry of backends. Constructed via [`Registry::load`] or
/// [`Registry::from_document`]; never mutated after that point (§4.1: "No runtime mutation").
#[derive(Debug, Clone)]
pub struct Registry {
	backends: HashMap<String, BackendConfig>,
	legacy_names: HashMap<String, String>,
	route_preferences: HashMap<RouteKind, Vec<String>>,
}

impl Registry {
	pub fn load(yaml: &str) -> Result<Self, RegistryError> {
		let doc: RegistryDocument = serde_yaml::from_str(yaml)?;
		Self::from_document(doc)
	}

	pub fn from_document(doc: RegistryDocument) -> Result<Self, RegistryError> {
		let mut backends = HashMap::new();
		for b in doc.backends {
			validate_backend(&b)?;
			let name = b.name.clone();
			if backends.insert(name.clone(), b).is_some() {
				return Err(RegistryError::DuplicateName(name));
			}
		}
		for (legacy, canonical) in &doc.legacy_names {
			if !backends.contains_key(canonical) {
				return Err(RegistryError::UnknownLegacyTarget(
					legacy.clone(),
					canonical.clone(),
				));
			}
		}
		for (kind, names) in &doc.route_preferences {
			for name in names {
				if !backends.contains_key(name) {
					return Err(RegistryError::UnknownRoutePreference(*kind, name.clone()));
				}
			}
		}
		Ok(Registry {
			backends,
			legacy_names: doc.legacy_names,
			route_preferences: doc.route_preferences,
		})
	}

	pub fn lookup(&self, name: &str) -> Option<&BackendConfig> {
		self.backends.get(name)
	}

	/// Identity if `name` is already canonical or unknown.
	pub fn resolve_legacy<'a>(&'a self, name: &'a str) -> &'a str {
		self.legacy_names.get(name).map(|s| s.as_str()).unwrap_or(name)
	}

	pub fn supports(&self, name: &str, capability: Capability) -> bool {
		self
			.backends
			.get(name)
			.is_some_and(|b| b.supported_capabilities.contains(&capability))
	}

	pub fn limit(&self, name: &str, route_kind: RouteKind) -> Option<u32> {
		self.backends.get(name)?.concurrency_limits.get(&route_kind).copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = &BackendConfig> {
		self.backends.values()
	}

	pub fn route_preferences(&self, kind: RouteKind) -> &[String] {
		self
			.route_preferences
			.get(&kind)
			.map(|v| v.as_slice())
			.unwrap_or(&[])
	}
}

fn validate_backend(b: &BackendConfig) -> Result<(), RegistryError> {
	if b.base_url.cannot_be_a_base() {
		return Err(RegistryError::MissingConcurrencyLimit(
			b.name.clone(),
			"base_url must be an absolute URL",
		));
	}
	for cap in &b.supported_capabilities {
		if !b.concurrency_limits.contains_key(cap) {
			return Err(RegistryError::MissingConcurrencyLimit(
				b.name.clone(),
				cap.as_str(),
			));
		}
	}
	Ok(())
}
