use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

use reqwest::{Client, header::HeaderMap};
use serde_json::{Value, json};

use reboost_domain::{
	BoxFuture, Choices, Component, ComponentStatus, Error, Labels, Query, Ranker, Ranks, Result,
};

/// Scores choices with an external rerank API (`{model, query, documents}` in,
/// `{results: [{index, relevance_score}]}` out).
///
/// The API is treated as frozen, so feedback is counted but not forwarded.
pub struct RemoteRanker {
	url: String,
	model: String,
	headers: HeaderMap,
	client: Client,
	ranked: AtomicU64,
	ignored_feedback: AtomicU64,
}
impl RemoteRanker {
	pub fn new(cfg: &reboost_config::RemoteRanker) -> crate::Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			url: format!("{}{}", cfg.api_base, cfg.path),
			model: cfg.model.clone(),
			headers: crate::auth_headers(&cfg.api_key, &cfg.default_headers)?,
			client,
			ranked: AtomicU64::new(0),
			ignored_feedback: AtomicU64::new(0),
		})
	}

	async fn scores(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
		let body = json!({ "model": self.model, "query": query, "documents": docs });
		let res = self
			.client
			.post(&self.url)
			.headers(self.headers.clone())
			.json(&body)
			.send()
			.await
			.and_then(|res| res.error_for_status())
			.map_err(|err| Error::Ranker { message: format!("Rerank request failed: {err}.") })?;
		let json: Value = res.json().await.map_err(|err| Error::Ranker {
			message: format!("Rerank response is not valid JSON: {err}."),
		})?;

		parse_rerank_response(json, docs.len())
	}
}

impl Component for RemoteRanker {
	fn name(&self) -> &'static str {
		"RemoteRanker"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let section = json!({
			"url": self.url,
			"model": self.model,
			"ranked": self.ranked.load(Ordering::Relaxed),
			"ignored_feedback": self.ignored_feedback.load(Ordering::Relaxed),
		});

		reboost_domain::contribute(state, self.name(), section)
	}
}

impl Ranker for RemoteRanker {
	fn rank<'a>(&'a self, query: &'a Query, choices: &'a Choices) -> BoxFuture<'a, Result<Ranks>> {
		Box::pin(async move {
			if choices.is_empty() {
				return Ok(Vec::new());
			}

			let scores = self.scores(query, choices).await?;
			let mut ranks = (0..choices.len()).collect::<Vec<_>>();

			ranks.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
			self.ranked.fetch_add(1, Ordering::Relaxed);

			Ok(ranks)
		})
	}

	fn train<'a>(
		&'a self,
		_query: &'a Query,
		_choices: &'a Choices,
		_labels: &'a Labels,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.ignored_feedback.fetch_add(1, Ordering::Relaxed);

			tracing::debug!(url = %self.url, "Remote ranker does not learn from feedback.");

			Ok(())
		})
	}
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores = vec![f32::NEG_INFINITY; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::Ranker {
			message: "Rerank response is missing results array.".to_string(),
		})?;

	for item in results {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| Error::Ranker { message: "Rerank result missing index.".to_string() })?
			as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::Ranker { message: "Rerank result missing score.".to_string() })?
			as f32;

		if let Some(slot) = scores.get_mut(index) {
			*slot = score;
		}
	}

	Ok(scores)
}
