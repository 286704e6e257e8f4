use std::{future::Future, sync::Arc, time::Instant};

use crate::PIPELINE;
use reboost_domain::{Codex, Error, Response, Result, Store};

/// Times pipeline steps and turns route failures into client responses.
///
/// Every step goes through [`Tracker::track`] at its call site. Successful steps are reported to
/// the store as `(owner, operation, elapsed_ms)`; failed steps are logged with their full error
/// and propagated unchanged. Whole routes go through [`Tracker::route`], which times them the same
/// way but leaves failure logging to the step that failed. A route then hands its failure to
/// [`Tracker::settle`] once, at the route boundary, where the codex decides what the client sees.
#[derive(Clone)]
pub struct Tracker {
	store: Arc<dyn Store>,
	codex: Arc<dyn Codex>,
}
impl Tracker {
	pub fn new(store: Arc<dyn Store>, codex: Arc<dyn Codex>) -> Self {
		Self { store, codex }
	}

	pub async fn track<T, F>(&self, owner: &str, operation: &str, step: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.timed(owner, operation, step).await.inspect_err(|err| {
			tracing::error!(owner, operation, error = ?err, "Step failed.");
		})
	}

	/// Times a whole route under [`PIPELINE`].
	pub async fn route<T, F>(&self, operation: &str, steps: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.timed(PIPELINE, operation, steps).await.inspect_err(|err| {
			tracing::debug!(operation, code = err.code(), "Route failed.");
		})
	}

	/// `Ok` when the codex renders the failure, the original error when it declines.
	pub fn settle(&self, err: Error) -> Result<Response> {
		match self.codex.catch(&err) {
			Some(response) => {
				tracing::debug!(
					code = err.code(),
					status = %response.status,
					"Failure caught by codex."
				);

				Ok(response)
			},
			None => Err(err),
		}
	}

	async fn timed<T, F>(&self, owner: &str, operation: &str, step: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let started = Instant::now();
		let value = step.await?;
		let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

		self.store.lap(elapsed_ms, owner, operation);

		tracing::trace!(owner, operation, elapsed_ms, "Step completed.");

		Ok(value)
	}
}
