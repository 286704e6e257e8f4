use std::{
	collections::{BTreeMap, VecDeque},
	sync::Mutex,
};

use ahash::AHashMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Debug, Clone, Serialize)]
pub struct LapEvent {
	pub owner: String,
	pub operation: String,
	pub elapsed_ms: f64,
	#[serde(serialize_with = "serialize_rfc3339")]
	pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LapStats {
	pub count: u64,
	pub avg_ms: f64,
	pub max_ms: f64,
}
impl LapStats {
	fn fold(&mut self, elapsed_ms: f64) {
		self.count += 1;
		self.avg_ms += (elapsed_ms - self.avg_ms) / self.count as f64;

		if elapsed_ms > self.max_ms {
			self.max_ms = elapsed_ms;
		}
	}
}

/// Append-only recorder of timed events keyed by (owner, operation).
///
/// Only the most recent `capacity` events are retained. Aggregates cover every event ever
/// recorded.
pub struct MetricsStore {
	capacity: usize,
	inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
	events: VecDeque<LapEvent>,
	stats: AHashMap<(String, String), LapStats>,
	total: u64,
}

impl MetricsStore {
	pub fn new(capacity: usize) -> Self {
		Self { capacity: capacity.max(1), inner: Mutex::new(Inner::default()) }
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn record(&self, owner: &str, operation: &str, elapsed_ms: f64) {
		let event = LapEvent {
			owner: owner.to_string(),
			operation: operation.to_string(),
			elapsed_ms,
			recorded_at: OffsetDateTime::now_utc(),
		};
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner
			.stats
			.entry((event.owner.clone(), event.operation.clone()))
			.or_default()
			.fold(elapsed_ms);

		inner.total += 1;

		if inner.events.len() == self.capacity {
			inner.events.pop_front();
		}

		inner.events.push_back(event);
	}

	pub fn stats(&self, owner: &str, operation: &str) -> Option<LapStats> {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.stats.get(&(owner.to_string(), operation.to_string())).copied()
	}

	/// Most recent events, oldest first.
	pub fn recent(&self, limit: usize) -> Vec<LapEvent> {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let skip = inner.events.len().saturating_sub(limit);

		inner.events.iter().skip(skip).cloned().collect()
	}

	pub fn total(&self) -> u64 {
		self.inner.lock().unwrap_or_else(|err| err.into_inner()).total
	}

	/// Aggregates as `{owner: {operation: {count, avg_ms, max_ms}}}` with sorted keys.
	pub fn snapshot(&self) -> Value {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let mut owners: BTreeMap<&str, BTreeMap<&str, LapStats>> = BTreeMap::new();

		for ((owner, operation), stats) in &inner.stats {
			owners.entry(owner.as_str()).or_default().insert(operation.as_str(), *stats);
		}

		serde_json::to_value(owners).unwrap_or(Value::Null)
	}

	/// The retained events, oldest first, with RFC 3339 timestamps.
	pub fn recent_snapshot(&self) -> Value {
		serde_json::to_value(self.recent(self.capacity)).unwrap_or(Value::Null)
	}
}

fn serialize_rfc3339<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aggregates_running_mean() {
		let metrics = MetricsStore::new(8);

		for elapsed in [10.0, 20.0, 60.0] {
			metrics.record("EsCodex", "topk", elapsed);
		}

		let stats = metrics.stats("EsCodex", "topk").expect("Stats must exist.");

		assert_eq!(stats.count, 3);
		assert!((stats.avg_ms - 30.0).abs() < 1e-9);
		assert_eq!(stats.max_ms, 60.0);
	}

	#[test]
	fn keeps_only_recent_events() {
		let metrics = MetricsStore::new(2);

		metrics.record("A", "one", 1.0);
		metrics.record("A", "two", 2.0);
		metrics.record("A", "three", 3.0);

		let recent = metrics.recent(10);

		assert_eq!(metrics.total(), 3);
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].operation, "two");
		assert_eq!(recent[1].operation, "three");
		assert_eq!(metrics.stats("A", "one").map(|stats| stats.count), Some(1));
	}

	#[test]
	fn snapshot_groups_by_owner() {
		let metrics = MetricsStore::new(4);

		metrics.record("Pipeline", "search", 4.0);
		metrics.record("HttpBackend", "ask", 2.0);

		let snapshot = metrics.snapshot();

		assert_eq!(snapshot["Pipeline"]["search"]["count"], 1);
		assert_eq!(snapshot["HttpBackend"]["ask"]["avg_ms"], 2.0);
	}

	#[test]
	fn recent_snapshot_lists_retained_events() {
		let metrics = MetricsStore::new(2);

		metrics.record("EsCodex", "topk", 1.0);
		metrics.record("EsCodex", "parse", 2.0);
		metrics.record("TermRanker", "rank", 3.0);

		let recent = metrics.recent_snapshot();
		let events = recent.as_array().expect("Recent events must be an array.");
		let recorded_at = events[1]["recorded_at"].as_str().expect("Timestamp must be a string.");

		assert_eq!(events.len(), 2);
		assert_eq!(events[0]["operation"], "parse");
		assert_eq!(events[1]["owner"], "TermRanker");
		assert_eq!(events[1]["elapsed_ms"], 3.0);
		assert!(recorded_at.contains('T') && recorded_at.ends_with('Z'), "{recorded_at}");
	}
}
