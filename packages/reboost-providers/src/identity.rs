use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use reboost_domain::{
	BoxFuture, Choices, Component, ComponentStatus, Labels, Query, Ranker, Ranks, Result,
};

/// Keeps the backend's order. Useful as a baseline and for exercising the pipeline.
#[derive(Default)]
pub struct IdentityRanker {
	ranked: AtomicU64,
	trained: AtomicU64,
}

impl Component for IdentityRanker {
	fn name(&self) -> &'static str {
		"IdentityRanker"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let section = json!({
			"ranked": self.ranked.load(Ordering::Relaxed),
			"trained": self.trained.load(Ordering::Relaxed),
		});

		reboost_domain::contribute(state, self.name(), section)
	}
}

impl Ranker for IdentityRanker {
	fn rank<'a>(&'a self, _query: &'a Query, choices: &'a Choices) -> BoxFuture<'a, Result<Ranks>> {
		self.ranked.fetch_add(1, Ordering::Relaxed);

		let ranks = (0..choices.len()).collect();

		Box::pin(async move { Ok(ranks) })
	}

	fn train<'a>(
		&'a self,
		_query: &'a Query,
		_choices: &'a Choices,
		_labels: &'a Labels,
	) -> BoxFuture<'a, Result<()>> {
		self.trained.fetch_add(1, Ordering::Relaxed);

		Box::pin(async { Ok(()) })
	}
}
