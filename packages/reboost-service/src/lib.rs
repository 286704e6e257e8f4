//! Request pipeline: route handlers built from explicitly injected components.

pub mod pipeline;
pub mod tracker;

mod error;

pub use error::{Error, Result};
pub use pipeline::{PIPELINE, Pipeline};
pub use tracker::Tracker;

use std::sync::Arc;

use reboost_config::Config;
use reboost_domain::Component;
use reboost_providers::HttpBackend;
use reboost_storage::MemoryStore;

/// Builds each component from its config section, then hands all of them to [`Pipeline::new`].
pub fn build_pipeline(cfg: &Config, server: Arc<dyn Component>) -> Result<Pipeline> {
	let codex = reboost_codex::build_codex(&cfg.codex);
	let backend = Arc::new(HttpBackend::new(&cfg.backend)?);
	let ranker = reboost_providers::build_ranker(&cfg.ranker)?;
	let store = Arc::new(MemoryStore::new(&cfg.storage));

	tracing::info!(
		codex = codex.name(),
		backend = %backend.base_url(),
		ranker = ranker.name(),
		multiplier = cfg.codex.multiplier,
		"Pipeline components built."
	);

	Ok(Pipeline::new(server, codex, backend, ranker, store))
}
