//! Layered configuration: built-in defaults < environment variables < CLI flags
//! (§6.3, §10.3). The backend registry document itself is a separate YAML file,
//! pointed to by `--config`/`BACKEND_REGISTRY_PATH`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ipnet::IpNet;

use crate::images::ImagesBackendFamily;
use crate::tools::LogMode;

#[derive(Parser, Debug)]
#[command(version, about = "Local AI gateway", long_about = None)]
pub struct Args {
	/// Path to the declarative backend registry document (YAML).
	#[arg(long, value_name = "file")]
	pub config: Option<PathBuf>,

	/// Address the main API server binds to.
	#[arg(long, value_name = "addr")]
	pub bind_addr: Option<String>,

	/// Address the metrics server binds to.
	#[arg(long, value_name = "addr")]
	pub metrics_bind_addr: Option<String>,

	/// Shared secret clients must present as a bearer token.
	#[arg(long, value_name = "token")]
	pub bearer_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("missing required configuration value: {0} (set via env var or CLI flag)")]
	Missing(&'static str),
	#[error("invalid value for {field}: {message}")]
	Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
	pub registry_path: PathBuf,
	pub bind_addr: String,
	pub metrics_bind_addr: String,
	pub bearer_token: String,
	pub images_backend: ImagesBackendFamily,
	pub images_backend_class: String,
	pub images_http_base_url: Option<url::Url>,
	pub images_openai_model: Option<String>,
	pub ui_image_dir: PathBuf,
	pub ui_ip_allowlist: Vec<IpNet>,
	pub backend_verify_tls: bool,
	pub backend_ca_bundle: Option<String>,
	pub backend_client_cert: Option<String>,
	pub backend_client_key: Option<String>,
	pub tools_log_mode: LogMode,
	pub tools_log_path: Option<PathBuf>,
	pub tools_log_dir: Option<PathBuf>,
	pub health_probe_interval: Duration,
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl GatewayConfig {
	/// Layers defaults < env vars < CLI flags. CLI flags win when present.
	pub fn load(args: &Args) -> Result<Self, ConfigError> {
		let registry_path = args
			.config
			.clone()
			.or_else(|| env_var("BACKEND_REGISTRY_PATH").map(PathBuf::from))
			.ok_or(ConfigError::Missing("BACKEND_REGISTRY_PATH / --config"))?;

		let bind_addr = args
			.bind_addr
			.clone()
			.or_else(|| env_var("GATEWAY_BIND_ADDR"))
			.unwrap_or_else(|| "0.0.0.0:8080".to_string());

		let metrics_bind_addr = args
			.metrics_bind_addr
			.clone()
			.or_else(|| env_var("GATEWAY_METRICS_BIND_ADDR"))
			.unwrap_or_else(|| "0.0.0.0:9090".to_string());

		let bearer_token = args
			.bearer_token
			.clone()
			.or_else(|| env_var("GATEWAY_BEARER_TOKEN"))
			.ok_or(ConfigError::Missing("GATEWAY_BEARER_TOKEN / --bearer-token"))?;

		let images_backend = match env_var("IMAGES_BACKEND").as_deref() {
			Some("mock") | None => ImagesBackendFamily::Mock,
			Some("http_openai_images") => ImagesBackendFamily::HttpOpenaiImages,
			Some("http_a1111") => ImagesBackendFamily::HttpA1111,
			Some(other) => {
				return Err(ConfigError::Invalid {
					field: "IMAGES_BACKEND",
					message: format!("unknown images backend family '{other}'"),
				});
			},
		};

		let images_backend_class = env_var("IMAGES_BACKEND_CLASS").unwrap_or_else(|| "gpu_heavy".to_string());

		let images_http_base_url = env_var("IMAGES_HTTP_BASE_URL")
			.map(|s| url::Url::parse(&s))
			.transpose()
			.map_err(|e| ConfigError::Invalid { field: "IMAGES_HTTP_BASE_URL", message: e.to_string() })?;

		let images_openai_model = env_var("IMAGES_OPENAI_MODEL");

		let ui_image_dir = env_var("UI_IMAGE_DIR")
			.map(PathBuf::from)
			.unwrap_or_else(|| PathBuf::from("./data/images"));

		let ui_ip_allowlist = match env_var("UI_IP_ALLOWLIST") {
			Some(raw) => raw
				.split(',')
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(|s| {
					s.parse::<IpNet>()
						.map_err(|e| ConfigError::Invalid { field: "UI_IP_ALLOWLIST", message: e.to_string() })
				})
				.collect::<Result<Vec<_>, _>>()?,
			None => Vec::new(),
		};

		let backend_verify_tls = env_var("BACKEND_VERIFY_TLS").map(|v| v != "false").unwrap_or(true);
		let backend_ca_bundle = env_var("BACKEND_CA_BUNDLE");
		let backend_client_cert = env_var("BACKEND_CLIENT_CERT");
		let backend_client_key = env_var("BACKEND_CLIENT_KEY");

		let tools_log_mode = match env_var("TOOLS_LOG_MODE").as_deref() {
			Some("ndjson") => LogMode::Ndjson,
			Some("per_file") => LogMode::PerFile,
			Some("both") => LogMode::Both,
			Some("none") | None => LogMode::None,
			Some(other) => {
				return Err(ConfigError::Invalid {
					field: "TOOLS_LOG_MODE",
					message: format!("unknown tool log mode '{other}'"),
				});
			},
		};
		let tools_log_path = env_var("TOOLS_LOG_PATH").map(PathBuf::from);
		let tools_log_dir = env_var("TOOLS_LOG_DIR").map(PathBuf::from);

		Ok(GatewayConfig {
			registry_path,
			bind_addr,
			metrics_bind_addr,
			bearer_token,
			images_backend,
			images_backend_class,
			images_http_base_url,
			images_openai_model,
			ui_image_dir,
			ui_ip_allowlist,
			backend_verify_tls,
			backend_ca_bundle,
			backend_client_cert,
			backend_client_key,
			tools_log_mode,
			tools_log_path,
			tools_log_dir,
			health_probe_interval: Duration::from_secs(30),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	static ENV_LOCK: Mutex<()> = Mutex::new(());

	fn clear_env() {
		for key in [
			"BACKEND_REGISTRY_PATH",
			"GATEWAY_BIND_ADDR",
			"GATEWAY_BEARER_TOKEN",
			"IMAGES_BACKEND",
		] {
			unsafe { std::env::remove_var(key) };
		}
	}

	#[test]
	fn cli_flags_take_precedence_over_env() {
		let _guard = ENV_LOCK.lock().unwrap();
		clear_env();
		unsafe { std::env::set_var("GATEWAY_BIND_ADDR", "127.0.0.1:1") };
		let args = Args {
			config: Some(PathBuf::from("registry.yaml")),
			bind_addr: Some("0.0.0.0:9999".to_string()),
			metrics_bind_addr: None,
			bearer_token: Some("tok".to_string()),
		};
		let cfg = GatewayConfig::load(&args).unwrap();
		assert_eq!(cfg.bind_addr, "0.0.0.0:9999");
		unsafe { std::env::remove_var("GATEWAY_BIND_ADDR") };
	}

	#[test]
	fn missing_bearer_token_is_an_error() {
		let _guard = ENV_LOCK.lock().unwrap();
		clear_env();
		let args = Args {
			config: Some(PathBuf::from("registry.yaml")),
			bind_addr: None,
			metrics_bind_addr: None,
			bearer_token: None,
		};
		assert!(matches!(GatewayConfig::load(&args), Err(ConfigError::Missing(_))));
	}
}
