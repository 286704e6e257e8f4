use std::sync::Arc;

use reboost_domain::{
	Backend, Codex, Component, ComponentStatus, Packed, Ranker, Request, Response, Result, Store,
};

use crate::Tracker;

/// Owner name for route-level timings.
pub const PIPELINE: &str = "Pipeline";

/// The four routes every codex exposes, plus pass-through for everything else.
///
/// `server` is whatever reports the listener's state. It contributes first to status, ahead of the
/// codex, the ranker, and the store.
pub struct Pipeline {
	server: Arc<dyn Component>,
	codex: Arc<dyn Codex>,
	backend: Arc<dyn Backend>,
	ranker: Arc<dyn Ranker>,
	store: Arc<dyn Store>,
	tracker: Tracker,
}
impl Pipeline {
	pub fn new(
		server: Arc<dyn Component>,
		codex: Arc<dyn Codex>,
		backend: Arc<dyn Backend>,
		ranker: Arc<dyn Ranker>,
		store: Arc<dyn Store>,
	) -> Self {
		let tracker = Tracker::new(store.clone(), codex.clone());

		Self { server, codex, backend, ranker, store, tracker }
	}

	pub fn codex(&self) -> &dyn Codex {
		self.codex.as_ref()
	}

	pub async fn search(&self, request: Request) -> Result<Response> {
		match self.tracker.route("search", self.run_search(&request)).await {
			Ok(response) => Ok(response),
			Err(err) => self.tracker.settle(err),
		}
	}

	pub async fn train(&self, request: Request) -> Result<Response> {
		match self.tracker.route("train", self.run_train(&request)).await {
			Ok(response) => Ok(response),
			Err(err) => self.tracker.settle(err),
		}
	}

	/// Not timed, so that reading status never changes what status reports.
	pub async fn status(&self, _request: Request) -> Result<Response> {
		let state = self.server.chain_state(ComponentStatus::new());
		let state = self.codex.chain_state(state);
		let state = self.ranker.chain_state(state);
		let state = self.store.chain_state(state);

		self.codex.pulse(&state).or_else(|err| self.tracker.settle(err))
	}

	pub async fn not_found(&self, request: Request) -> Result<Response> {
		let forwarded = self.tracker.route(
			"not_found",
			self.tracker.track(self.backend.name(), "forward", self.backend.forward(&request)),
		);

		match forwarded.await {
			Ok(response) => Ok(response),
			Err(err) => self.tracker.settle(err),
		}
	}

	async fn run_search(&self, request: &Request) -> Result<Response> {
		let codex = self.codex.as_ref();
		let owner = codex.name();
		let topk = self.tracker.track(owner, "topk", async { codex.topk(request) }).await?;
		let magnified =
			self.tracker.track(owner, "magnify", async { codex.magnify(request, topk) }).await?;
		let response =
			self.tracker.track(self.backend.name(), "ask", self.backend.ask(&magnified)).await?;
		let (query, choices) = self
			.tracker
			.track(owner, "parse", async { codex.parse(&magnified, &response) })
			.await?;
		let ranks = self
			.tracker
			.track(self.ranker.name(), "rank", async {
				let ranks = self.ranker.rank(&query, &choices).await?;

				reboost_domain::validate_ranks(&ranks, choices.len())?;

				Ok(ranks)
			})
			.await?;
		let (qid, cids) =
			self.tracker.track(self.store.name(), "save", self.store.save(&query, &choices)).await?;

		tracing::debug!(%qid, topk, candidates = choices.len(), "Search reranked.");

		self.tracker
			.track(owner, "pack", async {
				codex.pack(Packed {
					topk,
					response: &response,
					query: &query,
					choices: &choices,
					ranks: &ranks,
					qid,
					cids: &cids,
				})
			})
			.await
	}

	async fn run_train(&self, request: &Request) -> Result<Response> {
		let codex = self.codex.as_ref();
		let owner = codex.name();
		let (qid, cids) = self.tracker.track(owner, "pluck", async { codex.pluck(request) }).await?;
		let (query, choices, labels) =
			self.tracker.track(self.store.name(), "get", self.store.get(qid, &cids)).await?;

		self.tracker
			.track(self.ranker.name(), "train", self.ranker.train(&query, &choices, &labels))
			.await?;

		tracing::debug!(%qid, selected = cids.len(), "Feedback applied.");

		self.tracker.track(owner, "ack", async { codex.ack(qid, &cids) }).await
	}
}
