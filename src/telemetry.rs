//! Structured logging init, matching the teacher's `tracing_subscriber::fmt()...` shape
//! in `main.rs` (§10.1). Called exactly once, at process start.

use tracing_subscriber::EnvFilter;

pub fn init() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
}
