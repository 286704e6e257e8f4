use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
use serde_json::Value;

use crate::{Error, Result};

/// Inbound client call or outbound backend call, detached from any HTTP stack.
#[derive(Debug, Clone)]
pub struct Request {
	pub method: Method,
	pub path: String,
	/// Raw query string without the leading `?`.
	pub query: Option<String>,
	pub headers: HeaderMap,
	pub body: Bytes,
}
impl Request {
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: None,
			headers: HeaderMap::new(),
			body: Bytes::new(),
		}
	}

	pub fn with_query(mut self, query: impl Into<String>) -> Self {
		let query = query.into();

		self.query = if query.is_empty() { None } else { Some(query) };

		self
	}

	pub fn with_json(mut self, body: &Value) -> Self {
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Bytes::from(body.to_string());

		self
	}

	pub fn query_pairs(&self) -> Vec<(String, String)> {
		match self.query.as_deref() {
			Some(raw) => form_urlencoded::parse(raw.as_bytes()).into_owned().collect(),
			None => Vec::new(),
		}
	}

	/// First value for `key`, if any.
	pub fn query_param(&self, key: &str) -> Option<String> {
		self.query_pairs().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	pub fn query_params(&self, key: &str) -> Vec<String> {
		self.query_pairs().into_iter().filter(|(k, _)| k == key).map(|(_, v)| v).collect()
	}

	/// True when `key` is present, with or without a value (`?pretty`, `?pretty=true`).
	pub fn has_query_flag(&self, key: &str) -> bool {
		self.query_pairs().iter().any(|(k, _)| k == key)
	}

	/// Replaces the value of `key`, keeping every other parameter and their order.
	pub fn set_query_param(&mut self, key: &str, value: &str) {
		let mut pairs = self.query_pairs();
		let mut replaced = false;

		pairs.retain_mut(|(k, v)| {
			if k.as_str() != key {
				return true;
			}
			if replaced {
				return false;
			}

			*v = value.to_string();
			replaced = true;

			true
		});

		if !replaced {
			pairs.push((key.to_string(), value.to_string()));
		}

		let encoded = form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();

		self.query = Some(encoded);
	}

	pub fn path_and_query(&self) -> String {
		match self.query.as_deref() {
			Some(query) => format!("{}?{query}", self.path),
			None => self.path.clone(),
		}
	}

	/// Body parsed as JSON. An empty body is `None`.
	pub fn json_body(&self) -> Result<Option<Value>> {
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		serde_json::from_slice(&self.body).map(Some).map_err(|err| Error::InvalidRequest {
			message: format!("Request body is not valid JSON: {err}."),
		})
	}
}

#[derive(Debug, Clone)]
pub struct Response {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Bytes,
}
impl Response {
	pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	pub fn json(status: StatusCode, body: &Value) -> Self {
		let mut headers = HeaderMap::new();

		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Self { status, headers, body: Bytes::from(body.to_string()) }
	}

	pub fn json_body(&self) -> Result<Value> {
		serde_json::from_slice(&self.body).map_err(|err| Error::Codex {
			message: format!("Response body is not valid JSON: {err}."),
		})
	}

	pub fn is_json(&self) -> bool {
		self.headers
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|value| value.starts_with("application/json"))
	}
}
