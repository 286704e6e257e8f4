//! Data model and capability contracts shared by every reboost component.
//!
//! The pipeline only talks to components through the traits defined here. A component
//! contributes to `/status` through [`Component::chain_state`], which receives the status built so
//! far and returns it with its own section added.

mod error;
mod message;

pub use error::{Error, Result};
pub use message::{Request, Response};

use std::{future::Future, pin::Pin};

use serde_json::{Map, Value};
use uuid::Uuid;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Number of results the client ultimately wants.
pub type Topk = usize;
pub type Query = String;
/// Candidate texts in backend order.
pub type Choices = Vec<String>;
/// Indices into `Choices`, best first.
pub type Ranks = Vec<usize>;
/// One label per choice. `1.0` marks a choice the client selected.
pub type Labels = Vec<f32>;
pub type Qid = Uuid;
/// Position of a choice within the search it was saved with.
pub type Cid = usize;
/// Component name to that component's status section.
pub type ComponentStatus = Map<String, Value>;

pub trait Component
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus;
}

/// Backend-specific translation between the generic pipeline and a search service's wire format.
pub trait Codex
where
	Self: Component,
{
	fn search_path(&self) -> &str;

	fn train_path(&self) -> &str;

	fn status_path(&self) -> &str;

	fn topk(&self, request: &Request) -> Result<Topk>;

	/// Rewrites `request` to ask the backend for `topk` times the configured multiplier.
	fn magnify(&self, request: &Request, topk: Topk) -> Result<Request>;

	fn parse(&self, request: &Request, response: &Response) -> Result<(Query, Choices)>;

	fn pack(&self, packed: Packed<'_>) -> Result<Response>;

	fn pluck(&self, request: &Request) -> Result<(Qid, Vec<Cid>)>;

	fn ack(&self, qid: Qid, cids: &[Cid]) -> Result<Response>;

	/// Turns a pipeline failure into a client-visible response. `None` declines, which lets the
	/// failure reach the server as an internal error.
	fn catch(&self, err: &Error) -> Option<Response>;

	fn pulse(&self, state: &ComponentStatus) -> Result<Response>;
}

pub trait Ranker
where
	Self: Component,
{
	fn rank<'a>(&'a self, query: &'a Query, choices: &'a Choices) -> BoxFuture<'a, Result<Ranks>>;

	fn train<'a>(
		&'a self,
		query: &'a Query,
		choices: &'a Choices,
		labels: &'a Labels,
	) -> BoxFuture<'a, Result<()>>;
}

/// Persistence for searches awaiting feedback, plus the sink for timing events.
pub trait Store
where
	Self: Component,
{
	fn save<'a>(
		&'a self,
		query: &'a Query,
		choices: &'a Choices,
	) -> BoxFuture<'a, Result<(Qid, Vec<Cid>)>>;

	fn get<'a>(
		&'a self,
		qid: Qid,
		cids: &'a [Cid],
	) -> BoxFuture<'a, Result<(Query, Choices, Labels)>>;

	fn lap(&self, elapsed_ms: f64, owner: &str, operation: &str);
}

pub trait Backend
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn ask<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;

	/// Relays `request` untouched and returns the backend's reply untouched.
	fn forward<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}

/// Everything the codex needs to build the final search response.
#[derive(Debug, Clone, Copy)]
pub struct Packed<'a> {
	pub topk: Topk,
	pub response: &'a Response,
	pub query: &'a Query,
	pub choices: &'a Choices,
	pub ranks: &'a Ranks,
	pub qid: Qid,
	pub cids: &'a [Cid],
}

/// Adds `section` under `name`, replacing any earlier section with the same name.
pub fn contribute(mut state: ComponentStatus, name: &str, section: Value) -> ComponentStatus {
	state.insert(name.to_string(), section);

	state
}

/// Checks that `ranks` orders exactly the indices `0..len`.
pub fn validate_ranks(ranks: &[usize], len: usize) -> Result<()> {
	if ranks.len() != len {
		return Err(Error::Ranker {
			message: format!("Expected {len} ranks, got {}.", ranks.len()),
		});
	}

	let mut seen = vec![false; len];

	for &index in ranks {
		match seen.get_mut(index) {
			Some(slot) if !*slot => *slot = true,
			Some(_) => {
				return Err(Error::Ranker { message: format!("Rank index {index} is repeated.") });
			},
			None => {
				return Err(Error::Ranker {
					message: format!("Rank index {index} is out of range for {len} choices."),
				});
			},
		}
	}

	Ok(())
}
