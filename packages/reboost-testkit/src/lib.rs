//! In-process stand-in for an Elasticsearch-style search backend.

mod error;

pub use error::{Error, Result};

use std::{
	net::{SocketAddr, TcpListener as StdTcpListener},
	sync::{Arc, Mutex},
	thread::{self, JoinHandle},
	time::Duration,
};

use axum::{
	Router,
	extract::{Path, RawQuery, State},
	http::{
		HeaderMap, HeaderValue, Method, StatusCode, Uri,
		header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE},
	},
	response::{IntoResponse, Response},
	routing::{any, get},
};
use bytes::Bytes;
use serde_json::{Map, Value, json};
use tokio::{net::TcpListener, runtime::Builder, sync::oneshot, time};

pub const ECHO_HEADER: &str = "x-mock-echo";

const DEFAULT_SIZE: usize = 10;
/// Leading bytes of a gzip member.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// A request as the mock received it.
#[derive(Debug, Clone)]
pub struct Recorded {
	pub method: Method,
	pub path: String,
	pub query: Option<String>,
	pub headers: HeaderMap,
	pub body: Bytes,
}
impl Recorded {
	pub fn query_param(&self, key: &str) -> Option<String> {
		let raw = self.query.as_deref()?;

		form_urlencoded::parse(raw.as_bytes()).find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	pub fn json_body(&self) -> Option<Value> {
		serde_json::from_slice(&self.body).ok()
	}
}

struct MockState {
	field: String,
	docs: Vec<String>,
	recorded: Mutex<Vec<Recorded>>,
}
impl MockState {
	fn record(&self, recorded: Recorded) {
		self.recorded.lock().unwrap_or_else(|err| err.into_inner()).push(recorded);
	}
}

/// Serves `/{index}/_search` from a fixed document list on its own thread.
///
/// Search responses hold the first `size` documents (default 10) in list order, with each document
/// under `_source.<field>`. A search whose `Accept-Encoding` allows gzip gets its body back
/// gzip-framed with `Content-Encoding: gzip`, the way a compressing backend answers, so only a
/// client that decodes it can read the JSON. `/_mock/slow?ms=N` answers after `N` milliseconds.
/// Every other path echoes the method and URI back with an [`ECHO_HEADER`] header. Dropping the
/// mock stops it.
pub struct MockBackend {
	addr: SocketAddr,
	state: Arc<MockState>,
	shutdown: Option<oneshot::Sender<()>>,
	thread: Option<JoinHandle<()>>,
}
impl MockBackend {
	pub fn start(field: &str, docs: &[&str]) -> Result<Self> {
		let listener = StdTcpListener::bind("127.0.0.1:0")?;

		listener.set_nonblocking(true)?;

		let addr = listener.local_addr()?;
		let state = Arc::new(MockState {
			field: field.to_string(),
			docs: docs.iter().map(|doc| doc.to_string()).collect(),
			recorded: Mutex::new(Vec::new()),
		});
		let router = Router::new()
			.route("/{index}/_search", any(search))
			.route("/_mock/slow", get(slow))
			.fallback(echo)
			.with_state(state.clone());
		let (shutdown, stopped) = oneshot::channel::<()>();
		let runtime = Builder::new_current_thread().enable_all().build()?;
		let thread = thread::Builder::new().name("reboost-mock-backend".to_string()).spawn(
			move || {
				let served = runtime.block_on(async move {
					let listener = TcpListener::from_std(listener)?;

					axum::serve(listener, router)
						.with_graceful_shutdown(async move {
							let _ = stopped.await;
						})
						.await
				});

				if let Err(err) = served {
					eprintln!("Mock backend stopped with an error: {err}.");
				}
			},
		)?;

		Ok(Self { addr, state, shutdown: Some(shutdown), thread: Some(thread) })
	}

	pub fn addr(&self) -> SocketAddr {
		self.addr
	}

	pub fn url(&self) -> String {
		format!("http://{}", self.addr)
	}

	/// Backend settings that point at this mock.
	pub fn backend_config(&self) -> reboost_config::Backend {
		reboost_config::Backend {
			scheme: "http".to_string(),
			host: self.addr.ip().to_string(),
			port: self.addr.port(),
			timeout_ms: 5_000,
			max_retries: 0,
			retry_backoff_ms: 10,
		}
	}

	pub fn requests(&self) -> Vec<Recorded> {
		self.state.recorded.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn search_requests(&self) -> Vec<Recorded> {
		self.requests().into_iter().filter(|req| req.path.ends_with("/_search")).collect()
	}
}
impl Drop for MockBackend {
	fn drop(&mut self) {
		if let Some(shutdown) = self.shutdown.take() {
			let _ = shutdown.send(());
		}
		if let Some(thread) = self.thread.take() {
			let _ = thread.join();
		}
	}
}

async fn search(
	State(state): State<Arc<MockState>>,
	method: Method,
	Path(index): Path<String>,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let size = requested_size(query.as_deref(), &body);
	let gzip = accepts_gzip(&headers);

	state.record(Recorded { method, path: format!("/{index}/_search"), query, headers, body });

	let hits = state
		.docs
		.iter()
		.take(size)
		.enumerate()
		.map(|(i, doc)| {
			let mut source = Map::new();

			source.insert(state.field.clone(), Value::String(doc.clone()));

			json!({
				"_index": index,
				"_id": i.to_string(),
				"_score": 1.0 - i as f64 * 0.01,
				"_source": source,
			})
		})
		.collect::<Vec<_>>();
	let body = json!({
		"took": 1,
		"timed_out": false,
		"hits": {
			"total": { "value": state.docs.len(), "relation": "eq" },
			"max_score": 1.0,
			"hits": hits,
		},
	});


	if !gzip {
		return (StatusCode::OK, axum::Json(body)).into_response();
	}

	let mut encoded = GZIP_MAGIC.to_vec();

	encoded.extend_from_slice(body.to_string().as_bytes());

	let mut response = (StatusCode::OK, encoded).into_response();

	response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	response.headers_mut().insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

	response
}

async fn slow(
	State(state): State<Arc<MockState>>,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
) -> Response {
	let ms = query
		.as_deref()
		.and_then(|raw| {
			form_urlencoded::parse(raw.as_bytes())
				.find(|(k, _)| k == "ms")
				.map(|(_, v)| v.into_owned())
		})
		.and_then(|raw| raw.parse::<u64>().ok())
		.unwrap_or(200);

	state.record(Recorded {
		method: Method::GET,
		path: "/_mock/slow".to_string(),
		query,
		headers,
		body: Bytes::new(),
	});
	time::sleep(Duration::from_millis(ms)).await;

	(StatusCode::OK, "slow").into_response()
}

async fn echo(
	State(state): State<Arc<MockState>>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let text = format!("{method} {uri}");

	state.record(Recorded {
		method,
		path: uri.path().to_string(),
		query: uri.query().map(str::to_string),
		headers,
		body,
	});

	let mut response = (StatusCode::OK, text).into_response();

	response.headers_mut().insert(ECHO_HEADER, HeaderValue::from_static("1"));

	response
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
	headers
		.get_all(ACCEPT_ENCODING)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(','))
		.any(|coding| coding.split(';').next().is_some_and(|name| name.trim() == "gzip"))
}

fn requested_size(query: Option<&str>, body: &[u8]) -> usize {
	let from_query = query.and_then(|raw| {
		form_urlencoded::parse(raw.as_bytes())
			.find(|(k, _)| k == "size")
			.and_then(|(_, v)| v.parse::<usize>().ok())
	});
	let from_body = || {
		serde_json::from_slice::<Value>(body)
			.ok()
			.and_then(|json| json.get("size").and_then(Value::as_u64))
			.map(|size| size as usize)
	};

	from_query.or_else(from_body).unwrap_or(DEFAULT_SIZE)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn size_prefers_query_over_body() {
		assert_eq!(requested_size(Some("q=x&size=3"), br#"{"size":7}"#), 3);
		assert_eq!(requested_size(None, br#"{"size":7}"#), 7);
		assert_eq!(requested_size(None, b""), DEFAULT_SIZE);
	}

	#[test]
	fn gzip_is_detected_among_codings() {
		let mut headers = HeaderMap::new();

		assert!(!accepts_gzip(&headers));

		headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

		assert!(!accepts_gzip(&headers));

		headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("deflate, gzip;q=0.8"));

		assert!(accepts_gzip(&headers));
	}
}
