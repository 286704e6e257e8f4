use std::{collections::VecDeque, sync::Mutex};

use ahash::AHashMap;
use serde_json::json;
use uuid::Uuid;

use crate::MetricsStore;
use reboost_domain::{
	BoxFuture, Choices, Cid, Component, ComponentStatus, Error, Labels, Qid, Query, Result, Store,
};

/// Process-local persistence. Saved searches survive until evicted by newer ones.
pub struct MemoryStore {
	max_queries: usize,
	searches: Mutex<Searches>,
	metrics: MetricsStore,
}

#[derive(Default)]
struct Searches {
	by_qid: AHashMap<Qid, SavedSearch>,
	order: VecDeque<Qid>,
	saved: u64,
	evicted: u64,
	resolved: u64,
}

struct SavedSearch {
	query: Query,
	choices: Choices,
}

impl MemoryStore {
	pub fn new(cfg: &reboost_config::Storage) -> Self {
		Self {
			max_queries: cfg.max_queries.max(1),
			searches: Mutex::new(Searches::default()),
			metrics: MetricsStore::new(cfg.max_events),
		}
	}

	pub fn metrics(&self) -> &MetricsStore {
		&self.metrics
	}

	pub fn len(&self) -> usize {
		self.searches.lock().unwrap_or_else(|err| err.into_inner()).by_qid.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn save_now(&self, query: &Query, choices: &Choices) -> (Qid, Vec<Cid>) {
		let qid = Uuid::new_v4();
		let cids = (0..choices.len()).collect::<Vec<_>>();
		let mut searches = self.searches.lock().unwrap_or_else(|err| err.into_inner());

		searches
			.by_qid
			.insert(qid, SavedSearch { query: query.clone(), choices: choices.clone() });
		searches.order.push_back(qid);
		searches.saved += 1;

		while searches.order.len() > self.max_queries {
			let Some(oldest) = searches.order.pop_front() else { break };

			searches.by_qid.remove(&oldest);
			searches.evicted += 1;

			tracing::debug!(%oldest, "Evicted saved search.");
		}

		(qid, cids)
	}

	fn get_now(&self, qid: Qid, cids: &[Cid]) -> Result<(Query, Choices, Labels)> {
		let mut searches = self.searches.lock().unwrap_or_else(|err| err.into_inner());
		let saved = searches.by_qid.get(&qid).ok_or(Error::UnknownQid { qid })?;
		let mut labels = vec![0.0; saved.choices.len()];

		for &cid in cids {
			let slot = labels.get_mut(cid).ok_or(Error::UnknownCid { qid, cid })?;

			*slot = 1.0;
		}

		let resolved = (saved.query.clone(), saved.choices.clone(), labels);

		searches.resolved += 1;

		Ok(resolved)
	}
}

impl Component for MemoryStore {
	fn name(&self) -> &'static str {
		"MemoryStore"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let mut section = {
			let searches = self.searches.lock().unwrap_or_else(|err| err.into_inner());

			json!({
				"searches": searches.by_qid.len(),
				"max_queries": self.max_queries,
				"saved": searches.saved,
				"evicted": searches.evicted,
				"resolved": searches.resolved,
			})
		};

		section["laps"] = self.metrics.snapshot();
		section["events_total"] = self.metrics.total().into();
		section["recent"] = self.metrics.recent_snapshot();

		reboost_domain::contribute(state, self.name(), section)
	}
}

impl Store for MemoryStore {
	fn save<'a>(
		&'a self,
		query: &'a Query,
		choices: &'a Choices,
	) -> BoxFuture<'a, Result<(Qid, Vec<Cid>)>> {
		Box::pin(async move { Ok(self.save_now(query, choices)) })
	}

	fn get<'a>(
		&'a self,
		qid: Qid,
		cids: &'a [Cid],
	) -> BoxFuture<'a, Result<(Query, Choices, Labels)>> {
		Box::pin(async move { self.get_now(qid, cids) })
	}

	fn lap(&self, elapsed_ms: f64, owner: &str, operation: &str) {
		self.metrics.record(owner, operation, elapsed_ms);
	}
}
