//! Pooled HTTPS client shared by the health checker and the streaming proxy.
//!
//! Built once at startup from [`ClientConfig`], mirroring the teacher's
//! `reqwest::ClientBuilder` usage in `authn.rs`'s JWKS fetcher, generalized with
//! connect/read timeouts and optional client-cert/CA-bundle configuration (§4.5).

use std::fs;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
	#[serde(default = "default_connect_timeout_ms")]
	pub connect_timeout_ms: u64,
	#[serde(default = "default_read_timeout_ms")]
	pub read_timeout_ms: u64,
	/// PEM-encoded CA bundle path for verifying upstream TLS certificates. Absent means
	/// the platform's built-in root store is used.
	#[serde(default)]
	pub ca_bundle_path: Option<String>,
	/// PEM-encoded client certificate + key, for upstreams requiring mutual TLS.
	#[serde(default)]
	pub client_cert_path: Option<String>,
	#[serde(default)]
	pub client_key_path: Option<String>,
	#[serde(default)]
	pub danger_accept_invalid_certs: bool,
}

fn default_connect_timeout_ms() -> u64 {
	2_000
}

fn default_read_timeout_ms() -> u64 {
	60_000
}

impl Default for ClientConfig {
	fn default() -> Self {
		ClientConfig {
			connect_timeout_ms: default_connect_timeout_ms(),
			read_timeout_ms: default_read_timeout_ms(),
			ca_bundle_path: None,
			client_cert_path: None,
			client_key_path: None,
			danger_accept_invalid_certs: false,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error("failed to read TLS material at {path}: {source}")]
	ReadTlsMaterial {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid TLS configuration: {0}")]
	Tls(#[source] reqwest::Error),
	#[error("failed to build HTTP client: {0}")]
	Build(#[source] reqwest::Error),
	#[error(transparent)]
	Request(#[from] reqwest::Error),
}

/// Thin wrapper around a pooled `reqwest::Client`. Cloning is cheap (the inner client
/// is reference-counted by reqwest itself).
#[derive(Clone)]
pub struct UpstreamClient {
	inner: reqwest::Client,
	read_timeout: Duration,
}

impl UpstreamClient {
	pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
		let mut builder = reqwest::ClientBuilder::new()
			.connect_timeout(Duration::from_millis(config.connect_timeout_ms))
			.danger_accept_invalid_certs(config.danger_accept_invalid_certs)
			.pool_idle_timeout(Duration::from_secs(90));

		if let Some(ca_path) = &config.ca_bundle_path {
			let pem = fs::read(ca_path).map_err(|e| ClientError::ReadTlsMaterial {
				path: ca_path.clone(),
				source: e,
			})?;
			let cert = reqwest::Certificate::from_pem(&pem).map_err(ClientError::Tls)?;
			builder = builder.add_root_certificate(cert);
		}

		if let (Some(cert_path), Some(key_path)) = (&config.client_cert_path, &config.client_key_path) {
			let mut pem = fs::read(cert_path).map_err(|e| ClientError::ReadTlsMaterial {
				path: cert_path.clone(),
				source: e,
			})?;
			let mut key = fs::read(key_path).map_err(|e| ClientError::ReadTlsMaterial {
				path: key_path.clone(),
				source: e,
			})?;
			pem.push(b'\n');
			pem.append(&mut key);
			let identity = reqwest::Identity::from_pem(&pem).map_err(ClientError::Tls)?;
			builder = builder.identity(identity);
		}

		let inner = builder.build().map_err(ClientError::Build)?;
		Ok(UpstreamClient {
			inner,
			read_timeout: Duration::from_millis(config.read_timeout_ms),
		})
	}

	/// GET with a caller-supplied timeout, used by the health checker's short probes
	/// rather than the full per-request read timeout.
	pub async fn get_with_timeout(&self, url: Url, timeout: Duration) -> Result<Response, ClientError> {
		Ok(self.inner.get(url).timeout(timeout).send().await?)
	}

	/// POST JSON with the configured full read timeout, used for non-streaming calls.
	pub async fn post_json(&self, url: Url, body: &serde_json::Value) -> Result<Response, ClientError> {
		Ok(self
			.inner
			.post(url)
			.timeout(self.read_timeout)
			.json(body)
			.send()
			.await?)
	}

	/// POST JSON and return a byte stream, used for the SSE passthrough path where the
	/// response body must not be buffered.
	pub async fn post_json_streaming(&self, url: Url, body: &serde_json::Value) -> Result<Response, ClientError> {
		Ok(self.inner.post(url).json(body).send().await?)
	}

	pub async fn get_bytes(&self, url: Url, timeout: Duration) -> Result<Bytes, ClientError> {
		let resp = self.inner.get(url).timeout(timeout).send().await?;
		Ok(resp.bytes().await?)
	}

	pub fn read_timeout(&self) -> Duration {
		self.read_timeout
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn builds_with_defaults() {
		let client = UpstreamClient::new(ClientConfig::default());
		assert!(client.is_ok());
	}

	#[tokio::test]
	async fn performs_get_against_mock() {
		let server = wiremock::MockServer::start().await;
		wiremock::Mock::given(wiremock::matchers::path("/ok"))
			.respond_with(wiremock::ResponseTemplate::new(200).set_body_string("hi"))
			.mount(&server)
			.await;
		let client = UpstreamClient::new(ClientConfig::default()).unwrap();
		let url = Url::parse(&server.uri()).unwrap().join("/ok").unwrap();
		let resp = client.get_with_timeout(url, Duration::from_secs(2)).await.unwrap();
		assert_eq!(resp.status(), 200);
	}
}
