//! Wire-format adapters between the pipeline and concrete search backends.

pub mod es;

pub use es::EsCodex;

use std::sync::Arc;

use reboost_config::CodexKind;
use reboost_domain::Codex;

pub fn build_codex(cfg: &reboost_config::Codex) -> Arc<dyn Codex> {
	match cfg.kind {
		CodexKind::Elasticsearch => Arc::new(EsCodex::new(cfg)),
	}
}
