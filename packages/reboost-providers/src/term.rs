use std::sync::{
	Arc, RwLock,
	atomic::{AtomicU64, Ordering},
};

use serde_json::json;
use unicode_segmentation::UnicodeSegmentation;

use reboost_domain::{
	BoxFuture, Choices, Component, ComponentStatus, Error, Labels, Query, Ranker, Ranks, Result,
};

const MAX_QUERY_TERMS: usize = 16;
const MAX_TEXT_TERMS: usize = 256;

/// Lexical overlap plus learned query-term x document-term weights.
///
/// Pair features are hashed into a fixed number of buckets with blake3, so the model size does not
/// grow with the vocabulary. Training applies a pairwise perceptron step whenever a selected choice
/// does not outscore an unselected one.
pub struct TermRanker {
	model: Arc<RwLock<TermModel>>,
	ranked: AtomicU64,
	trained: AtomicU64,
}
impl TermRanker {
	pub fn new(feature_buckets: u32, learning_rate: f32) -> Self {
		Self {
			model: Arc::new(RwLock::new(TermModel::new(feature_buckets, learning_rate))),
			ranked: AtomicU64::new(0),
			trained: AtomicU64::new(0),
		}
	}
}

impl Component for TermRanker {
	fn name(&self) -> &'static str {
		"TermRanker"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let model = self.model.read().unwrap_or_else(|err| err.into_inner());
		let section = json!({
			"feature_buckets": model.weights.len(),
			"learning_rate": model.learning_rate,
			"active_features": model.weights.iter().filter(|w| **w != 0.0).count(),
			"updates": model.updates,
			"ranked": self.ranked.load(Ordering::Relaxed),
			"trained": self.trained.load(Ordering::Relaxed),
		});

		reboost_domain::contribute(state, self.name(), section)
	}
}

impl Ranker for TermRanker {
	fn rank<'a>(&'a self, query: &'a Query, choices: &'a Choices) -> BoxFuture<'a, Result<Ranks>> {
		Box::pin(async move {
			let model = self.model.clone();
			let query = query.clone();
			let choices = choices.clone();
			let ranks = tokio::task::spawn_blocking(move || {
				model.read().unwrap_or_else(|err| err.into_inner()).rank(&query, &choices)
			})
			.await
			.map_err(|err| Error::Ranker { message: format!("Ranking task failed: {err}.") })?;

			self.ranked.fetch_add(1, Ordering::Relaxed);

			Ok(ranks)
		})
	}

	fn train<'a>(
		&'a self,
		query: &'a Query,
		choices: &'a Choices,
		labels: &'a Labels,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if labels.len() != choices.len() {
				return Err(Error::Ranker {
					message: format!(
						"Expected {} labels, got {}.",
						choices.len(),
						labels.len()
					),
				});
			}

			let model = self.model.clone();
			let query = query.clone();
			let choices = choices.clone();
			let labels = labels.clone();
			let updates = tokio::task::spawn_blocking(move || {
				let mut model = model.write().unwrap_or_else(|err| err.into_inner());

				model.train(&query, &choices, &labels)
			})
			.await
			.map_err(|err| Error::Ranker { message: format!("Training task failed: {err}.") })?;

			self.trained.fetch_add(1, Ordering::Relaxed);

			tracing::debug!(updates, "Term ranker trained.");

			Ok(())
		})
	}
}

pub struct TermModel {
	learning_rate: f32,
	weights: Vec<f32>,
	updates: u64,
}
impl TermModel {
	pub fn new(feature_buckets: u32, learning_rate: f32) -> Self {
		Self { learning_rate, weights: vec![0.0; feature_buckets.max(1) as usize], updates: 0 }
	}

	pub fn score(&self, query: &str, text: &str) -> f32 {
		let query_terms = terms(query, MAX_QUERY_TERMS);
		let text_terms = terms(text, MAX_TEXT_TERMS);

		self.score_terms(&query_terms, &text_terms)
	}

	pub fn rank(&self, query: &str, choices: &[String]) -> Ranks {
		let query_terms = terms(query, MAX_QUERY_TERMS);
		let scores = choices
			.iter()
			.map(|text| self.score_terms(&query_terms, &terms(text, MAX_TEXT_TERMS)))
			.collect::<Vec<_>>();
		let mut ranks = (0..choices.len()).collect::<Vec<_>>();

		// Ties keep backend order.
		ranks.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

		ranks
	}

	/// Returns the number of weight updates applied.
	pub fn train(&mut self, query: &str, choices: &[String], labels: &[f32]) -> u64 {
		let query_terms = terms(query, MAX_QUERY_TERMS);
		let docs = choices.iter().map(|text| terms(text, MAX_TEXT_TERMS)).collect::<Vec<_>>();
		let selected = |i: usize| labels.get(i).is_some_and(|&label| label > 0.0);
		let positives = (0..docs.len()).filter(|&i| selected(i)).collect::<Vec<_>>();
		let negatives = (0..docs.len()).filter(|&i| !selected(i)).collect::<Vec<_>>();
		let mut applied = 0;

		for &p in &positives {
			for &n in &negatives {
				let margin = self.score_terms(&query_terms, &docs[p])
					- self.score_terms(&query_terms, &docs[n]);

				if margin > 0.0 {
					continue;
				}

				let promoted = self.features(&query_terms, &docs[p]).collect::<Vec<_>>();
				let demoted = self.features(&query_terms, &docs[n]).collect::<Vec<_>>();

				for bucket in promoted {
					self.weights[bucket] += self.learning_rate;
				}
				for bucket in demoted {
					self.weights[bucket] -= self.learning_rate;
				}

				applied += 1;
			}
		}

		self.updates += applied;

		applied
	}

	fn score_terms(&self, query_terms: &[String], text_terms: &[String]) -> f32 {
		if query_terms.is_empty() {
			return 0.0;
		}

		let matched =
			query_terms.iter().filter(|term| text_terms.binary_search(*term).is_ok()).count();
		let overlap = matched as f32 / query_terms.len() as f32;
		let learned =
			self.features(query_terms, text_terms).map(|bucket| self.weights[bucket]).sum::<f32>();

		overlap + learned
	}

	fn features<'a>(
		&'a self,
		query_terms: &'a [String],
		text_terms: &'a [String],
	) -> impl Iterator<Item = usize> + 'a {
		let buckets = self.weights.len() as u64;

		query_terms.iter().flat_map(move |q| {
			text_terms.iter().map(move |t| {
				let mut hasher = blake3::Hasher::new();

				hasher.update(q.as_bytes());
				hasher.update(&[0x1f]);
				hasher.update(t.as_bytes());

				let digest = hasher.finalize();
				let mut head = [0_u8; 8];

				head.copy_from_slice(&digest.as_bytes()[..8]);

				(u64::from_le_bytes(head) % buckets) as usize
			})
		})
	}
}

/// Lowercased, sorted, deduplicated words.
fn terms(text: &str, limit: usize) -> Vec<String> {
	let mut words = text.unicode_words().map(str::to_lowercase).collect::<Vec<_>>();

	words.truncate(limit);
	words.sort();
	words.dedup();

	words
}
