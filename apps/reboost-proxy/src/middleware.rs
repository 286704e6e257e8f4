use std::{panic::AssertUnwindSafe, time::Instant};

use axum::{
	body::{self, Body},
	extract::{Request, State},
	http::header::CONTENT_LENGTH,
	middleware::Next,
	response::Response,
};
use futures::FutureExt;
use serde_json::Value;

use crate::routes::{self, AppState};

/// Upper bound on a response body buffered for pretty-printing or debug logging.
const MAX_INSPECTED_BYTES: usize = 16 * 1024 * 1024;

/// Logs, times, and counts every request, including pass-through ones.
///
/// A panic below this layer becomes a generic 500. With `?pretty` in the query, JSON response
/// bodies are re-serialized with indentation; other bodies are left alone.
pub async fn observe(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let method = request.method().clone();
	let path = request.uri().path().to_string();
	let pretty = request.uri().query().is_some_and(has_pretty_flag);
	let started = Instant::now();

	tracing::info!(%method, %path, "RECV");
	tracing::debug!(headers = ?request.headers(), "Request headers.");

	let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
		Ok(response) => response,
		Err(panic) => {
			tracing::error!(%method, %path, panic = %panic_message(&*panic), "Handler panicked.");

			routes::internal_error()
		},
	};
	let response = if pretty || tracing::enabled!(tracing::Level::DEBUG) {
		inspect(response, pretty).await
	} else {
		response
	};
	let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

	if state.server.is_tracked(&path) {
		state.server.record(&path, elapsed_ms);
	}

	tracing::info!(%method, %path, status = response.status().as_u16(), elapsed_ms, "SEND");

	response
}

async fn inspect(response: Response, pretty: bool) -> Response {
	let (mut parts, body) = response.into_parts();
	let bytes = match body::to_bytes(body, MAX_INSPECTED_BYTES).await {
		Ok(bytes) => bytes,
		Err(err) => {
			tracing::warn!(error = %err, "Failed to buffer response body.");

			return routes::internal_error();
		},
	};

	tracing::debug!(body = %String::from_utf8_lossy(&bytes), "Response body.");

	if pretty && let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
		match serde_json::to_vec_pretty(&json) {
			Ok(indented) => {
				parts.headers.remove(CONTENT_LENGTH);

				return Response::from_parts(parts, Body::from(indented));
			},
			Err(err) => tracing::warn!(error = %err, "Failed to pretty-print response body."),
		}
	}

	Response::from_parts(parts, Body::from(bytes))
}

fn has_pretty_flag(query: &str) -> bool {
	query.split('&').any(|pair| pair.split_once('=').map_or(pair, |(key, _)| key) == "pretty")
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		return message.to_string();
	}
	if let Some(message) = panic.downcast_ref::<String>() {
		return message.clone();
	}

	"non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pretty_flag_matches_bare_and_valued_keys() {
		assert!(has_pretty_flag("pretty"));
		assert!(has_pretty_flag("q=x&pretty=true"));
		assert!(!has_pretty_flag("prettyish=1&q=pretty"));
	}
}
