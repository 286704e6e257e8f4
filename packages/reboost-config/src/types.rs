use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub server: Server,
	#[serde(default)]
	pub backend: Backend,
	#[serde(default)]
	pub codex: Codex,
	#[serde(default)]
	pub ranker: Ranker,
	#[serde(default)]
	pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
	pub host: String,
	pub port: u16,
	/// Receive buffer size requested for the listening socket.
	pub read_bytes: usize,
	pub status_path: String,
	/// `*` matches every method.
	pub status_method: String,
	/// Upper bound on how long `start()` waits for the listener to bind.
	pub startup_timeout_ms: u64,
	pub shutdown: ShutdownMode,
	/// Only used when `shutdown = "drain"`.
	pub drain_timeout_ms: u64,
	pub log_level: String,
}
impl Default for Server {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 8000,
			read_bytes: 2_048,
			status_path: "/status".to_string(),
			status_method: "*".to_string(),
			startup_timeout_ms: 10_000,
			shutdown: ShutdownMode::FailFast,
			drain_timeout_ms: 5_000,
			log_level: "info".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
	/// Drop in-flight requests and stop immediately.
	#[default]
	FailFast,
	/// Stop accepting, then wait for in-flight requests up to `drain_timeout_ms`.
	Drain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Backend {
	pub scheme: String,
	pub host: String,
	pub port: u16,
	pub timeout_ms: u64,
	/// Retries on connection failures only. HTTP error statuses are relayed as-is.
	pub max_retries: u32,
	pub retry_backoff_ms: u64,
}
impl Backend {
	pub fn base_url(&self) -> String {
		format!("{}://{}:{}", self.scheme, self.host, self.port)
	}
}
impl Default for Backend {
	fn default() -> Self {
		Self {
			scheme: "http".to_string(),
			host: "127.0.0.1".to_string(),
			port: 9_200,
			timeout_ms: 30_000,
			max_retries: 2,
			retry_backoff_ms: 100,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodexKind {
	#[default]
	Elasticsearch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Codex {
	pub kind: CodexKind,
	/// Factor applied to the client's requested result count before asking the backend.
	pub multiplier: u32,
	/// Document field the ranker reads candidate text from.
	pub field: String,
	pub default_topk: u32,
	pub search_path: String,
	pub train_path: String,
	pub status_path: String,
}
impl Default for Codex {
	fn default() -> Self {
		Self {
			kind: CodexKind::Elasticsearch,
			multiplier: 5,
			field: "text".to_string(),
			default_topk: 10,
			search_path: "/{index}/_search".to_string(),
			train_path: "/_reboost/train".to_string(),
			status_path: "/_reboost/status".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerKind {
	#[default]
	Term,
	Identity,
	Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranker {
	pub kind: RankerKind,
	pub learning_rate: f32,
	pub feature_buckets: u32,
	pub remote: Option<RemoteRanker>,
}
impl Default for Ranker {
	fn default() -> Self {
		Self { kind: RankerKind::Term, learning_rate: 0.1, feature_buckets: 4_096, remote: None }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRanker {
	pub api_base: String,
	pub path: String,
	pub model: String,
	pub api_key: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Storage {
	/// Saved searches kept for train lookups. Oldest are evicted first.
	pub max_queries: usize,
	/// Recent timing events kept by the metrics store.
	pub max_events: usize,
}
impl Default for Storage {
	fn default() -> Self {
		Self { max_queries: 10_000, max_events: 4_096 }
	}
}
