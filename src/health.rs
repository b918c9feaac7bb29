//! Health checker: single background probe loop, cached snapshot table.
//!
//! Single writer (the probe loop), many readers (the request path's `is_routable` gate),
//! matching §5's concurrency model. Backends are probed concurrently with each other;
//! a backend's own liveness probe gates its readiness probe (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::client::UpstreamClient;
use crate::registry::Registry;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
	pub healthy: bool,
	pub ready: bool,
	#[serde(with = "chrono::serde::ts_seconds")]
	pub last_check: chrono::DateTime<chrono::Utc>,
	pub last_error: Option<String>,
	pub consecutive_failures: u32,
}

impl HealthSnapshot {
	/// Readiness is optimistically true until the first probe completes (§4.3 startup policy).
	fn optimistic() -> Self {
		HealthSnapshot {
			healthy: true,
			ready: true,
			last_check: chrono::Utc::now(),
			last_error: None,
			consecutive_failures: 0,
		}
	}
}

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HealthChecker {
	snapshots: RwLock<HashMap<String, HealthSnapshot>>,
	client: UpstreamClient,
	interval: Duration,
}

impl HealthChecker {
	pub fn new(registry: &Registry, client: UpstreamClient, interval: Duration) -> Arc<Self> {
		let snapshots = registry
			.iter()
			.map(|b| (b.name.clone(), HealthSnapshot::optimistic()))
			.collect();
		Arc::new(HealthChecker {
			snapshots: RwLock::new(snapshots),
			client,
			interval,
		})
	}

	pub async fn is_routable(&self, backend_name: &str) -> bool {
		self
			.snapshots
			.read()
			.await
			.get(backend_name)
			.map(|s| s.ready)
			.unwrap_or(false)
	}

	pub async fn last_error(&self, backend_name: &str) -> Option<String> {
		self
			.snapshots
			.read()
			.await
			.get(backend_name)
			.and_then(|s| s.last_error.clone())
	}

	pub async fn snapshot_all(&self) -> HashMap<String, HealthSnapshot> {
		self.snapshots.read().await.clone()
	}

	/// Runs forever. Intended to be spawned as the single background probe task.
	pub async fn run(self: Arc<Self>, registry: Arc<Registry>) {
		let mut ticker = tokio::time::interval(self.interval);
		loop {
			ticker.tick().await;
			self.sweep(&registry).await;
		}
	}

	async fn sweep(&self, registry: &Registry) {
		let backends: Vec<_> = registry.iter().cloned().collect();
		let probes = backends.into_iter().map(|b| self.probe_one(b));
		futures::future::join_all(probes).await;
	}

	async fn probe_one(&self, backend: crate::registry::BackendConfig) {
		let live = self
			.probe_path(&backend.base_url, &backend.health.liveness)
			.await;
		let (healthy, ready, last_error) = match live {
			Ok(()) => {
				let ready_probe = self
					.probe_path(&backend.base_url, &backend.health.readiness)
					.await;
				match ready_probe {
					Ok(()) => (true, true, None),
					Err(e) => (true, false, Some(format!("readiness check failed: {e}"))),
				}
			},
			Err(e) => (false, false, Some(format!("liveness check failed: {e}"))),
		};

		let mut snapshots = self.snapshots.write().await;
		let entry = snapshots
			.entry(backend.name.clone())
			.or_insert_with(HealthSnapshot::optimistic);
		if healthy && ready {
			entry.consecutive_failures = 0;
			if !entry.healthy || !entry.ready {
				info!(backend = %backend.name, "backend recovered");
			}
		} else {
			entry.consecutive_failures += 1;
			warn!(backend = %backend.name, error = ?last_error, "backend probe failed");
		}
		entry.healthy = healthy;
		entry.ready = ready;
		entry.last_error = last_error;
		entry.last_check = chrono::Utc::now();
	}

	async fn probe_path(&self, base_url: &url::Url, path: &str) -> anyhow::Result<()> {
		let url = base_url.join(path)?;
		let start = Instant::now();
		let resp = self.client.get_with_timeout(url, PROBE_TIMEOUT).await?;
		let _ = start.elapsed();
		if resp.status().is_success() {
			Ok(())
		} else {
			anyhow::bail!("non-2xx status: {}", resp.status())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::Registry;

	fn registry_with(base_url: &str) -> Registry {
		Registry::load(&format!(
			r#"
backends:
  - name: local_mlx
    class: local_mlx
    baseUrl: {base_url}
    supportedCapabilities: [chat]
    concurrencyLimits: {{chat: 1}}
    health: {{liveness: /health, readiness: /ready}}
"#
		))
		.unwrap()
	}

	#[tokio::test]
	async fn starts_optimistically_ready() {
		let reg = registry_with("http://127.0.0.1:0");
		let client = UpstreamClient::new(Default::default()).unwrap();
		let checker = HealthChecker::new(&reg, client, DEFAULT_PROBE_INTERVAL);
		assert!(checker.is_routable("local_mlx").await);
	}

	#[tokio::test]
	async fn becomes_unready_after_failed_probe() {
		let server = wiremock::MockServer::start().await;
		wiremock::Mock::given(wiremock::matchers::path("/health"))
			.respond_with(wiremock::ResponseTemplate::new(500))
			.mount(&server)
			.await;
		let reg = registry_with(&server.uri());
		let client = UpstreamClient::new(Default::default()).unwrap();
		let checker = HealthChecker::new(&reg, client, DEFAULT_PROBE_INTERVAL);
		checker.probe_one(reg.lookup("local_mlx").unwrap().clone()).await;
		assert!(!checker.is_routable("local_mlx").await);
		assert!(checker.last_error("local_mlx").await.unwrap().contains("liveness"));
	}

	#[tokio::test]
	async fn ready_after_both_probes_succeed() {
		let server = wiremock::MockServer::start().await;
		wiremock::Mock::given(wiremock::matchers::path("/health"))
			.respond_with(wiremock::ResponseTemplate::new(200))
			.mount(&server)
			.await;
		wiremock::Mock::given(wiremock::matchers::path("/ready"))
			.respond_with(wiremock::ResponseTemplate::new(200))
			.mount(&server)
			.await;
		let reg = registry_with(&server.uri());
		let client = UpstreamClient::new(Default::default()).unwrap();
		let checker = HealthChecker::new(&reg, client, DEFAULT_PROBE_INTERVAL);
		checker.probe_one(reg.lookup("local_mlx").unwrap().clone()).await;
		assert!(checker.is_routable("local_mlx").await);
	}
}
