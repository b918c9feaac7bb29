//! Streaming event order (§8 invariant 8, scenario S5), image URL storage (invariant 4,
//! scenario S6), and tool hash stability / replay uniqueness (invariants 6-7, S7).

use std::sync::Arc;

use ai_gateway::admission::AdmissionController;
use ai_gateway::app;
use ai_gateway::client::{ClientConfig, UpstreamClient};
use ai_gateway::config::GatewayConfig;
use ai_gateway::health::HealthChecker;
use ai_gateway::images::{ImagesBackendFamily, ImagesConfig, ImagesPipeline};
use ai_gateway::metrics::Metrics;
use ai_gateway::registry::Registry;
use ai_gateway::state::AppState;
use ai_gateway::tools::{ToolBus, ToolLog, ToolRegistry};

use http_body_util::BodyExt;
use tower::ServiceExt;

const BEARER_TOKEN: &str = "test-secret";

fn registry_yaml(base_url: &str) -> String {
	format!(
		r#"
backends:
  - name: local_mlx
    class: local_mlx
    baseUrl: {base_url}
    supportedCapabilities: [chat]
    concurrencyLimits: {{ chat: 4 }}
    health: {{ liveness: /health, readiness: /ready }}
    defaultModel: qwen-local
"#
	)
}

async fn build_state() -> (AppState, wiremock::MockServer) {
	let server = wiremock::MockServer::start().await;
	wiremock::Mock::given(wiremock::matchers::path("/health"))
		.respond_with(wiremock::ResponseTemplate::new(200))
		.mount(&server)
		.await;
	wiremock::Mock::given(wiremock::matchers::path("/ready"))
		.respond_with(wiremock::ResponseTemplate::new(200))
		.mount(&server)
		.await;

	let registry = Arc::new(Registry::load(&registry_yaml(&server.uri())).unwrap());
	let client = UpstreamClient::new(ClientConfig::default()).unwrap();
	let admission = Arc::new(AdmissionController::from_registry(&registry));
	let health = HealthChecker::new(&registry, client.clone(), std::time::Duration::from_secs(30));
	let tools = Arc::new(ToolBus::new(ToolRegistry::default(), ToolLog::disabled()));
	let image_dir = std::env::temp_dir().join(format!("ai-gateway-stream-test-{:x}", rand::random::<u64>()));
	let images = Arc::new(ImagesPipeline::new(
		client.clone(),
		ImagesConfig {
			backend_family: ImagesBackendFamily::Mock,
			base_url: None,
			default_model: None,
			image_dir: image_dir.clone(),
			allow_base64: false,
		},
	));
	let mut metrics_registry = prometheus_client::registry::Registry::default();
	let metrics = Arc::new(Metrics::new(&mut metrics_registry));

	let config = GatewayConfig {
		registry_path: "unused.yaml".into(),
		bind_addr: "0.0.0.0:0".into(),
		metrics_bind_addr: "0.0.0.0:0".into(),
		bearer_token: BEARER_TOKEN.to_string(),
		images_backend: ImagesBackendFamily::Mock,
		images_backend_class: "local_mlx".into(),
		images_http_base_url: None,
		images_openai_model: None,
		ui_image_dir: image_dir,
		ui_ip_allowlist: Vec::new(),
		backend_verify_tls: true,
		backend_ca_bundle: None,
		backend_client_cert: None,
		backend_client_key: None,
		tools_log_mode: ai_gateway::tools::LogMode::None,
		tools_log_path: None,
		tools_log_dir: None,
		health_probe_interval: std::time::Duration::from_secs(30),
	};

	(
		AppState::new(registry, admission, health, client, tools, images, metrics, &config),
		server,
	)
}

fn authed_request(uri: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
	axum::http::Request::builder()
		.method("POST")
		.uri(uri)
		.header("authorization", format!("Bearer {BEARER_TOKEN}"))
		.header("content-type", "application/json")
		.body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
		.unwrap()
}

#[tokio::test]
async fn s5_streaming_event_order_is_route_then_terminal_then_sentinel() {
	let (state, server) = build_state().await;
	wiremock::Mock::given(wiremock::matchers::path("/v1/chat/completions"))
		.respond_with(
			wiremock::ResponseTemplate::new(200)
				.insert_header("content-type", "text/event-stream")
				.set_body_raw(
					concat!(
						"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
						"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
						"data: [DONE]\n\n",
					)
					.to_string(),
					"text/event-stream",
				),
		)
		.mount(&server)
		.await;

	let router = app::router(state);
	let req = authed_request(
		"/v1/chat/completions",
		serde_json::json!({ "messages": [{"role": "user", "content": "hi"}], "stream": true }),
	);
	let resp = router.oneshot(req).await.unwrap();
	assert_eq!(resp.status(), axum::http::StatusCode::OK);
	let body = resp.into_body().collect().await.unwrap().to_bytes();
	let text = String::from_utf8_lossy(&body);

	let event_types: Vec<&str> = text
		.lines()
		.filter(|l| l.starts_with("data: "))
		.map(|l| &l["data: ".len()..])
		.collect();

	assert!(event_types[0].contains("\"type\":\"route\""));
	assert!(event_types.iter().any(|e| e.contains("\"type\":\"delta\"")));
	let terminal_idx = event_types.iter().position(|e| e.contains("\"type\":\"done\"")).unwrap();
	assert_eq!(event_types[terminal_idx + 1], "[DONE]");
	assert_eq!(event_types.last().unwrap(), &"[DONE]");
}

#[tokio::test]
async fn s6_image_url_default_and_file_persisted() {
	let (state, _server) = build_state().await;
	let image_dir = state.images.image_dir().to_path_buf();
	let router = app::router(state);
	let req = authed_request("/v1/images/generations", serde_json::json!({ "prompt": "a cat", "n": 1 }));
	let resp = router.oneshot(req).await.unwrap();
	assert_eq!(resp.status(), axum::http::StatusCode::OK);
	let body = resp.into_body().collect().await.unwrap().to_bytes();
	let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
	let url = value["data"][0]["url"].as_str().unwrap();
	assert!(value["data"][0].get("b64_json").is_none());
	let filename = url.trim_start_matches("/ui/images/");
	assert!(tokio::fs::try_exists(image_dir.join(filename)).await.unwrap());
}

#[tokio::test]
async fn s7_tool_hash_stable_replay_unique() {
	let (state, _server) = build_state().await;
	let router = app::router(state);

	let req1 = authed_request("/v1/tools/echo", serde_json::json!({"text": "hi", "extra": 1}));
	let resp1 = router.clone().oneshot(req1).await.unwrap();
	let body1 = resp1.into_body().collect().await.unwrap().to_bytes();
	let v1: serde_json::Value = serde_json::from_slice(&body1).unwrap();

	let req2 = authed_request("/v1/tools/echo", serde_json::json!({"extra": 1, "text": "hi"}));
	let resp2 = router.oneshot(req2).await.unwrap();
	let body2 = resp2.into_body().collect().await.unwrap().to_bytes();
	let v2: serde_json::Value = serde_json::from_slice(&body2).unwrap();

	assert_eq!(v1["request_hash"], v2["request_hash"]);
	assert_ne!(v1["replay_id"], v2["replay_id"]);
}
