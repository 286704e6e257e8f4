pub mod backend;
pub mod identity;
pub mod remote;
pub mod term;

mod error;

pub use backend::HttpBackend;
pub use error::{Error, Result};
pub use identity::IdentityRanker;
pub use remote::RemoteRanker;
pub use term::TermRanker;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

use reboost_config::RankerKind;
use reboost_domain::Ranker;

pub fn build_ranker(cfg: &reboost_config::Ranker) -> Result<Arc<dyn Ranker>> {
	match cfg.kind {
		RankerKind::Term => Ok(Arc::new(TermRanker::new(cfg.feature_buckets, cfg.learning_rate))),
		RankerKind::Identity => Ok(Arc::new(IdentityRanker::default())),
		RankerKind::Remote => {
			let remote = cfg.remote.as_ref().ok_or_else(|| Error::InvalidConfig {
				message: "ranker.remote is required when ranker.kind is remote.".to_string(),
			})?;

			Ok(Arc::new(RemoteRanker::new(remote)?))
		},
	}
}

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
