use std::sync::Arc;

use axum::{
	Json, Router,
	body::Body,
	extract::State,
	http::{HeaderMap, Method, StatusCode, Uri},
	middleware,
	response::{IntoResponse, Response},
	routing::{MethodFilter, MethodRouter, any, on},
};
use bytes::Bytes;
use serde::Serialize;

use crate::{Error, Result, state::ServerState};
use reboost_domain::{Component, ComponentStatus};
use reboost_service::Pipeline;

#[derive(Clone)]
pub struct AppState {
	pub pipeline: Arc<Pipeline>,
	pub server: Arc<ServerState>,
}

/// Codex routes, the server's own status route, and pass-through for everything else.
pub fn router(state: AppState, status_path: &str, status_method: &str) -> Result<Router> {
	let pipeline = state.pipeline.clone();
	let codex = pipeline.codex();
	let paths = [codex.search_path(), codex.train_path(), codex.status_path(), status_path];

	for (i, path) in paths.iter().enumerate() {
		if paths[..i].contains(path) {
			return Err(Error::RouteConflict { path: path.to_string() });
		}
	}

	// Router::route panics on paths it cannot register, so they are rejected here first.
	reboost_config::check_routes(&[
		("codex.search_path", paths[0]),
		("codex.train_path", paths[1]),
		("codex.status_path", paths[2]),
		("server.status_path", paths[3]),
	])?;

	let status_route = status_method_router(status_method)?;
	let router = Router::new()
		.route(paths[0], any(search))
		.route(paths[1], any(train))
		.route(paths[2], any(pipeline_status))
		.route(status_path, status_route)
		.fallback(not_found)
		.layer(middleware::from_fn_with_state(state.clone(), crate::middleware::observe))
		.with_state(state);

	Ok(router)
}

fn status_method_router(method: &str) -> Result<MethodRouter<AppState>> {
	if method == "*" {
		return Ok(any(server_status));
	}

	let filter = Method::from_bytes(method.as_bytes())
		.ok()
		.and_then(|method| MethodFilter::try_from(method).ok())
		.ok_or_else(|| Error::InvalidMethod { method: method.to_string() })?;

	Ok(on(filter, server_status).fallback(not_found))
}

async fn search(
	State(state): State<AppState>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ProxyFailure> {
	let request = to_domain(method, &uri, headers, body);

	Ok(to_http(state.pipeline.search(request).await?))
}

async fn train(
	State(state): State<AppState>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ProxyFailure> {
	let request = to_domain(method, &uri, headers, body);

	Ok(to_http(state.pipeline.train(request).await?))
}

async fn pipeline_status(
	State(state): State<AppState>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ProxyFailure> {
	let request = to_domain(method, &uri, headers, body);

	Ok(to_http(state.pipeline.status(request).await?))
}

async fn not_found(
	State(state): State<AppState>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ProxyFailure> {
	let request = to_domain(method, &uri, headers, body);

	Ok(to_http(state.pipeline.not_found(request).await?))
}

async fn server_status(State(state): State<AppState>) -> Response {
	Json(state.server.chain_state(ComponentStatus::new())).into_response()
}

fn to_domain(
	method: Method,
	uri: &Uri,
	headers: HeaderMap,
	body: Bytes,
) -> reboost_domain::Request {
	reboost_domain::Request {
		method,
		path: uri.path().to_string(),
		query: uri.query().filter(|query| !query.is_empty()).map(str::to_string),
		headers,
		body,
	}
}

fn to_http(response: reboost_domain::Response) -> Response {
	let mut http = Response::new(Body::from(response.body));

	*http.status_mut() = response.status;
	*http.headers_mut() = response.headers;

	http
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: &'static str,
	message: &'static str,
}

/// A pipeline failure the codex declined to render. The client only learns that it failed.
#[derive(Debug)]
pub struct ProxyFailure(reboost_domain::Error);
impl From<reboost_domain::Error> for ProxyFailure {
	fn from(err: reboost_domain::Error) -> Self {
		Self(err)
	}
}
impl IntoResponse for ProxyFailure {
	fn into_response(self) -> Response {
		tracing::error!(error = ?self.0, "Unhandled pipeline failure.");

		internal_error()
	}
}

pub fn internal_error() -> Response {
	let body = ErrorBody { error_code: "INTERNAL", message: "Internal server error." };

	(StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
