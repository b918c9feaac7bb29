//! Images pipeline: response-format policy, content-addressed storage, and the three
//! upstream image backend families (§4.7).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::client::UpstreamClient;
use crate::error::GatewayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
	Url,
	B64Json,
}

impl Default for ResponseFormat {
	fn default() -> Self {
		ResponseFormat::Url
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenerationRequest {
	pub prompt: String,
	#[serde(default)]
	pub size: Option<String>,
	#[serde(default = "default_n")]
	pub n: u32,
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub steps: Option<u32>,
	#[serde(default)]
	pub seed: Option<i64>,
	#[serde(default)]
	pub guidance_scale: Option<f64>,
	#[serde(default)]
	pub negative_prompt: Option<String>,
	#[serde(default)]
	pub response_format: Option<ResponseFormat>,
}

fn default_n() -> u32 {
	1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagesBackendFamily {
	Mock,
	HttpOpenaiImages,
	HttpA1111,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesConfig {
	pub backend_family: ImagesBackendFamily,
	pub base_url: Option<url::Url>,
	pub default_model: Option<String>,
	pub image_dir: PathBuf,
	pub allow_base64: bool,
}

struct DecodedImage {
	bytes: Vec<u8>,
	mime: &'static str,
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
	if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
		"image/png"
	} else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
		"image/jpeg"
	} else if bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
		"image/webp"
	} else if bytes.starts_with(b"<svg") || bytes.starts_with(b"<?xml") {
		"image/svg+xml"
	} else {
		"application/octet-stream"
	}
}

fn extension_for_mime(mime: &str) -> &'static str {
	match mime {
		"image/png" => "png",
		"image/jpeg" => "jpg",
		"image/webp" => "webp",
		"image/svg+xml" => "svg",
		_ => "bin",
	}
}

/// Content-addressed filename: `{unix_ts}_{sha256-prefix-12-hex}.{ext}`.
fn content_address(bytes: &[u8], unix_ts: i64) -> (String, String) {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	let full_hash = hex::encode(hasher.finalize());
	let prefix: String = full_hash.chars().take(12).collect();
	let mime = sniff_mime(bytes);
	let ext = extension_for_mime(mime);
	(format!("{unix_ts}_{prefix}.{ext}"), mime.to_string())
}

pub struct ImagesPipeline {
	client: UpstreamClient,
	config: ImagesConfig,
}

impl ImagesPipeline {
	pub fn new(client: UpstreamClient, config: ImagesConfig) -> Self {
		ImagesPipeline { client, config }
	}

	pub fn image_dir(&self) -> &Path {
		&self.config.image_dir
	}

	pub async fn generate(
		&self,
		req: &ImageGenerationRequest,
		backend_name: &str,
		backend_class: &str,
	) -> Result<serde_json::Value, GatewayError> {
		let response_format = req.response_format.unwrap_or_default();
		if response_format == ResponseFormat::B64Json && !self.config.allow_base64 {
			return Err(GatewayError::InvalidArguments(
				"response_format=b64_json is not permitted by this backend's payload policy".into(),
			));
		}

		let model = req
			.model
			.clone()
			.or_else(|| self.config.default_model.clone());

		let raw_images = self.call_upstream(req, &model).await?;

		let mut data = Vec::with_capacity(raw_images.len());
		let mut ui_hashes = Vec::with_capacity(raw_images.len());
		let mut ui_mimes = Vec::with_capacity(raw_images.len());

		for bytes in raw_images {
			match response_format {
				ResponseFormat::B64Json => {
					use base64::Engine;
					let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
					data.push(serde_json::json!({ "b64_json": b64 }));
				},
				ResponseFormat::Url => {
					let unix_ts = chrono::Utc::now().timestamp();
					let (filename, mime) = content_address(&bytes, unix_ts);
					let full_hash = hex::encode(Sha256::digest(&bytes));
					self.persist(&filename, &bytes).await?;
					data.push(serde_json::json!({ "url": format!("/ui/images/{filename}") }));
					ui_hashes.push(full_hash);
					ui_mimes.push(mime);
				},
			}
		}

		Ok(serde_json::json!({
			"data": data,
			"_gateway": {
				"backend": backend_name,
				"backend_class": backend_class,
				"model": model,
				"ui_image_sha256": ui_hashes,
				"ui_image_mime": ui_mimes,
				"request": { "prompt": req.prompt, "size": req.size, "n": req.n },
				"upstream": format!("{:?}", self.config.backend_family),
			}
		}))
	}

	async fn persist(&self, filename: &str, bytes: &[u8]) -> Result<(), GatewayError> {
		tokio::fs::create_dir_all(&self.config.image_dir)
			.await
			.map_err(|e| GatewayError::Internal(e.into()))?;
		let path = self.config.image_dir.join(filename);
		if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			// same content hash ⇒ same bytes; no need to rewrite (§3 StoredImage).
			return Ok(());
		}
		tokio::fs::write(&path, bytes)
			.await
			.map_err(|e| GatewayError::Internal(e.into()))
	}

	async fn call_upstream(&self, req: &ImageGenerationRequest, model: &Option<String>) -> Result<Vec<Vec<u8>>, GatewayError> {
		match self.config.backend_family {
			ImagesBackendFamily::Mock => Ok((0..req.n.max(1)).map(|_| mock_png_bytes(&req.prompt)).collect()),
			ImagesBackendFamily::HttpOpenaiImages => {
				let base = self
					.config
					.base_url
					.clone()
					.ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("images backend base_url not configured")))?;
				let url = base.join("/v1/images/generations").map_err(|e| GatewayError::Internal(e.into()))?;
				let body = serde_json::json!({
					"prompt": req.prompt,
					"size": req.size,
					"n": req.n,
					"model": model,
					"response_format": "b64_json",
				});
				let resp = self.post(url, &body).await?;
				let value: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Client(e.into()))?;
				decode_openai_shape(&value)
			},
			ImagesBackendFamily::HttpA1111 => {
				let base = self
					.config
					.base_url
					.clone()
					.ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("images backend base_url not configured")))?;
				let url = base.join("/sdapi/v1/txt2img").map_err(|e| GatewayError::Internal(e.into()))?;
				let body = serde_json::json!({
					"prompt": req.prompt,
					"negative_prompt": req.negative_prompt,
					"steps": req.steps,
					"seed": req.seed,
					"cfg_scale": req.guidance_scale,
				});
				let resp = self.post(url, &body).await?;
				let value: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Client(e.into()))?;
				decode_a1111_shape(&value)
			},
		}
	}

	async fn post(&self, url: url::Url, body: &serde_json::Value) -> Result<reqwest::Response, GatewayError> {
		let _ = CONNECT_TIMEOUT;
		let resp = self.client.post_json(url, body).await.map_err(GatewayError::Client)?;
		if resp.status().is_client_error() {
			let status = resp.status();
			let message = resp.text().await.unwrap_or_default();
			return Err(GatewayError::UpstreamHttp { status, message });
		}
		if resp.status().is_server_error() {
			let message = resp.text().await.unwrap_or_default();
			return Err(GatewayError::UpstreamHttp {
				status: axum::http::StatusCode::BAD_GATEWAY,
				message,
			});
		}
		Ok(resp)
	}
}

fn decode_openai_shape(value: &serde_json::Value) -> Result<Vec<Vec<u8>>, GatewayError> {
	use base64::Engine;
	let items = value
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| GatewayError::UpstreamProtocol("expected 'data' array in OpenAI-shaped images response".into()))?;
	items
		.iter()
		.map(|item| {
			let b64 = item
				.get("b64_json")
				.and_then(|v| v.as_str())
				.ok_or_else(|| GatewayError::UpstreamProtocol("expected 'b64_json' field per image item".into()))?;
			base64::engine::general_purpose::STANDARD
				.decode(b64)
				.map_err(|e| GatewayError::UpstreamProtocol(format!("invalid base64 image payload: {e}")))
		})
		.collect()
}

/// Normalizes an Automatic1111-style `{images:[b64,...], parameters:{...}}` response to
/// the same decoded byte form the OpenAI-shaped path produces (§4.7).
fn decode_a1111_shape(value: &serde_json::Value) -> Result<Vec<Vec<u8>>, GatewayError> {
	use base64::Engine;
	let items = value
		.get("images")
		.and_then(|v| v.as_array())
		.ok_or_else(|| GatewayError::UpstreamProtocol("expected 'images' array in A1111-shaped response".into()))?;
	items
		.iter()
		.map(|item| {
			let b64 = item
				.as_str()
				.ok_or_else(|| GatewayError::UpstreamProtocol("expected string entries in 'images' array".into()))?;
			base64::engine::general_purpose::STANDARD
				.decode(b64)
				.map_err(|e| GatewayError::UpstreamProtocol(format!("invalid base64 image payload: {e}")))
		})
		.collect()
}

/// Deterministic placeholder image for the `mock` backend family, used in tests and demos.
fn mock_png_bytes(prompt: &str) -> Vec<u8> {
	let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
	bytes.extend_from_slice(prompt.as_bytes());
	bytes
}

pub fn image_path(dir: &Path, filename: &str) -> Option<PathBuf> {
	// Reject path traversal; filenames are always our own content-addressed form.
	if filename.contains('/') || filename.contains("..") {
		return None;
	}
	Some(dir.join(filename))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(dir: PathBuf) -> ImagesConfig {
		ImagesConfig {
			backend_family: ImagesBackendFamily::Mock,
			base_url: None,
			default_model: None,
			image_dir: dir,
			allow_base64: false,
		}
	}

	fn tempdir() -> PathBuf {
		let dir = std::env::temp_dir().join(format!("ai-gateway-images-test-{:x}", rand::random::<u64>()));
		dir
	}

	#[tokio::test]
	async fn url_is_default_and_persists_file() {
		let dir = tempdir();
		let client = UpstreamClient::new(Default::default()).unwrap();
		let pipeline = ImagesPipeline::new(client, config(dir.clone()));
		let req = ImageGenerationRequest {
			prompt: "a cat".into(),
			size: None,
			n: 1,
			model: None,
			steps: None,
			seed: None,
			guidance_scale: None,
			negative_prompt: None,
			response_format: None,
		};
		let result = pipeline.generate(&req, "gpu_heavy", "gpu_heavy").await.unwrap();
		let url = result["data"][0]["url"].as_str().unwrap();
		assert!(url.starts_with("/ui/images/"));
		assert!(result["data"][0].get("b64_json").is_none());
		let filename = url.trim_start_matches("/ui/images/");
		assert!(tokio::fs::try_exists(dir.join(filename)).await.unwrap());
	}

	#[tokio::test]
	async fn identical_content_hashes_to_same_filename() {
		let dir = tempdir();
		let client = UpstreamClient::new(Default::default()).unwrap();
		let pipeline = ImagesPipeline::new(client, config(dir));
		let req = ImageGenerationRequest {
			prompt: "same prompt".into(),
			size: None,
			n: 2,
			model: None,
			steps: None,
			seed: None,
			guidance_scale: None,
			negative_prompt: None,
			response_format: None,
		};
		let result = pipeline.generate(&req, "gpu_heavy", "gpu_heavy").await.unwrap();
		let urls: Vec<&str> = result["data"].as_array().unwrap().iter().map(|v| v["url"].as_str().unwrap()).collect();
		// mock backend produces byte-identical images for identical prompts, so the
		// content-addressed names collide (benign — same hash means same bytes).
		assert_eq!(urls[0], urls[1]);
	}

	#[tokio::test]
	async fn b64_json_rejected_when_policy_disallows() {
		let dir = tempdir();
		let client = UpstreamClient::new(Default::default()).unwrap();
		let pipeline = ImagesPipeline::new(client, config(dir));
		let req = ImageGenerationRequest {
			prompt: "x".into(),
			size: None,
			n: 1,
			model: None,
			steps: None,
			seed: None,
			guidance_scale: None,
			negative_prompt: None,
			response_format: Some(ResponseFormat::B64Json),
		};
		let err = pipeline.generate(&req, "gpu_heavy", "gpu_heavy").await.unwrap_err();
		assert!(matches!(err, GatewayError::InvalidArguments(_)));
	}

	#[test]
	fn image_path_rejects_traversal() {
		let dir = PathBuf::from("/tmp/images");
		assert!(image_path(&dir, "../../etc/passwd").is_none());
		assert!(image_path(&dir, "123_abc.png").is_some());
	}
}
