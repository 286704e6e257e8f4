use std::time::Duration;

use reqwest::{
	Client,
	header::{
		ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue, TE,
		TRAILER, TRANSFER_ENCODING, UPGRADE,
	},
};
use tokio::time;

use reboost_domain::{Backend, BoxFuture, Error, Request, Response, Result};

/// Headers that describe one hop and must not be relayed to the next.
const HOP_HEADERS: [HeaderName; 9] = [
	CONNECTION,
	CONTENT_LENGTH,
	HOST,
	HeaderName::from_static("keep-alive"),
	HeaderName::from_static("proxy-connection"),
	TE,
	TRAILER,
	TRANSFER_ENCODING,
	UPGRADE,
];

/// Upstream search service reached over HTTP.
///
/// Connection failures are retried up to `max_retries` times with linear backoff. Any response the
/// backend produces, including error statuses, is returned as-is. `ask` requests an uncompressed
/// body because the codex reads it; `forward` leaves content negotiation to the client.
pub struct HttpBackend {
	base_url: String,
	client: Client,
	timeout_ms: u64,
	max_retries: u32,
	retry_backoff: Duration,
}
impl HttpBackend {
	pub fn new(cfg: &reboost_config::Backend) -> crate::Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			base_url: cfg.base_url(),
			client,
			timeout_ms: cfg.timeout_ms,
			max_retries: cfg.max_retries,
			retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	async fn send(&self, request: &Request, headers: HeaderMap) -> Result<Response> {
		let url = format!("{}{}", self.base_url, request.path_and_query());
		let mut attempt = 0;

		loop {
			let sent = self
				.client
				.request(request.method.clone(), &url)
				.headers(headers.clone())
				.body(request.body.clone())
				.send()
				.await;

			match sent {
				Ok(res) => return read_response(res).await,
				Err(err) if err.is_timeout() =>
					return Err(Error::Timeout { timeout_ms: self.timeout_ms }),
				Err(err) if err.is_connect() && attempt < self.max_retries => {
					attempt += 1;

					tracing::warn!(
						%url,
						attempt,
						error = %err,
						"Backend connection failed. Retrying."
					);

					time::sleep(self.retry_backoff * attempt).await;
				},
				Err(err) => {
					return Err(Error::Backend {
						message: format!("Request to {url} failed: {err}."),
					});
				},
			}
		}
	}
}

impl Backend for HttpBackend {
	fn name(&self) -> &'static str {
		"HttpBackend"
	}

	fn ask<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
		let mut headers = strip_hop_headers(&request.headers);

		headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

		Box::pin(self.send(request, headers))
	}

	fn forward<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
		Box::pin(self.send(request, strip_hop_headers(&request.headers)))
	}
}

fn strip_hop_headers(headers: &HeaderMap) -> HeaderMap {
	let mut relayed = headers.clone();

	for name in &HOP_HEADERS {
		relayed.remove(name);
	}

	relayed
}

async fn read_response(res: reqwest::Response) -> Result<Response> {
	let status = res.status();
	let headers = strip_hop_headers(res.headers());
	let body = res.bytes().await.map_err(|err| Error::Backend {
		message: format!("Failed to read backend response body: {err}."),
	})?;

	Ok(Response { status, headers, body })
}
