use std::{net::TcpListener, time::Duration};

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use reboost_config::{Config, RankerKind, ShutdownMode};
use reboost_proxy::{Error, Phase, ProxyServer};
use reboost_testkit::{ECHO_HEADER, MockBackend};

const CORPUS: [&str; 30] = [
	"the royal palace at dawn",
	"a quiet garden",
	"palace guards change shifts",
	"river barges",
	"the summer palace gardens",
	"a stone bridge",
	"market square",
	"palace kitchens",
	"the old mill",
	"harbor lights",
	"winter palace ballroom",
	"a narrow alley",
	"city walls",
	"palace library",
	"fishing boats",
	"the cathedral spire",
	"palace stables",
	"a hidden courtyard",
	"mountain pass",
	"palace chapel",
	"village fair",
	"the lighthouse",
	"palace armory",
	"orchard rows",
	"the grand palace hall",
	"coastal road",
	"palace treasury",
	"a windmill",
	"forest trail",
	"palace throne room",
];

fn config(mock: &MockBackend, shutdown: ShutdownMode) -> Config {
	let mut cfg = Config::default();

	cfg.server.port = 0;
	cfg.server.shutdown = shutdown;
	cfg.server.drain_timeout_ms = 3_000;
	cfg.server.startup_timeout_ms = 5_000;
	cfg.backend = mock.backend_config();
	cfg.codex.multiplier = 2;
	cfg.codex.default_topk = 10;
	cfg.ranker.kind = RankerKind::Term;

	cfg
}

fn start(cfg: &Config) -> (ProxyServer, String) {
	let mut server = ProxyServer::from_config(cfg).expect("Failed to build proxy server.");
	let addr = server.start().expect("Failed to start proxy server.");

	(server, format!("http://{addr}"))
}

fn mock() -> MockBackend {
	MockBackend::start("text", &CORPUS).expect("Failed to start mock backend.")
}

async fn get_json(client: &Client, url: &str) -> (StatusCode, Value) {
	let response = client.get(url).send().await.expect("Request failed.");
	let status = response.status();
	let body = response.json::<Value>().await.expect("Response must be JSON.");

	(status, body)
}

#[tokio::test]
async fn start_then_immediate_request_succeeds() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let (status, body) = get_json(&Client::new(), &format!("{base}/status")).await;
	let port = server.local_addr().expect("Server must report its address.").port();

	assert_eq!(server.phase(), Phase::Ready);
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["ProxyServer"]["is_ready"], true);
	assert_eq!(body["ProxyServer"]["port"], port);

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn search_asks_backend_for_amplified_count() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let url = format!("{base}/shakespeare/_search?q=palace");
	let (status, body) = get_json(&Client::new(), &url).await;
	let hits = body["hits"]["hits"].as_array().expect("Hits must be an array.");
	let searches = mock.search_requests();
	let mentions_palace = |hit: &Value| {
		hit["_source"]["text"].as_str().is_some_and(|text| text.contains("palace"))
	};

	assert_eq!(status, StatusCode::OK);
	assert_eq!(searches.len(), 1);
	assert_eq!(searches[0].query_param("size").as_deref(), Some("20"));
	assert_eq!(hits.len(), 10);
	// Eight of the 20 candidates mention the query term and outrank the rest.
	assert!(hits[..8].iter().all(mentions_palace));
	assert!(!hits[8..].iter().any(mentions_palace));

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn gzip_accepting_client_gets_reranked_hits() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let response = Client::new()
		.get(format!("{base}/idx/_search?q=palace&size=1"))
		.header("accept-encoding", "gzip, deflate")
		.send()
		.await
		.expect("Request failed.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = response.json::<Value>().await.expect("Search response must be JSON.");
	let searches = mock.search_requests();

	assert_eq!(body["hits"]["hits"].as_array().map(Vec::len), Some(1));
	assert_eq!(searches[0].header("accept-encoding"), Some("identity"));

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn unmatched_path_is_relayed_verbatim() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let response =
		Client::new().get(format!("{base}/foo?bar=baz")).send().await.expect("Request failed.");

	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().get(ECHO_HEADER).is_some());
	assert_eq!(response.text().await.expect("Body must be text."), "GET /foo?bar=baz");

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn unknown_qid_is_an_error_and_server_stays_up() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let client = Client::new();
	let response = client
		.post(format!("{base}/_reboost/train?qid={}&cid=0", Uuid::new_v4()))
		.send()
		.await
		.expect("Request failed.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let error = response.json::<Value>().await.expect("Error must be JSON.");

	assert_eq!(error["error_code"], "UNKNOWN_QID");

	let (status, _) = get_json(&client, &format!("{base}/status")).await;

	assert_eq!(status, StatusCode::OK);

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn search_then_train_round_trip() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let client = Client::new();
	let url = format!("{base}/shakespeare/_search?q=garden&size=3");
	let (_, body) = get_json(&client, &url).await;
	let tag = &body["hits"]["hits"][2]["_reboost"];
	let response = client
		.post(format!("{base}/_reboost/train"))
		.json(&json!({ "qid": tag["qid"], "cids": [tag["cid"]] }))
		.send()
		.await
		.expect("Request failed.");
	let ack = response.json::<Value>().await.expect("Ack must be JSON.");

	assert_eq!(ack["acknowledged"], true);
	assert_eq!(ack["qid"], tag["qid"]);

	let (_, status) = get_json(&client, &format!("{base}/_reboost/status")).await;

	assert_eq!(status["TermRanker"]["trained"], 1);
	assert_eq!(status["MemoryStore"]["resolved"], 1);

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_are_all_counted() {
	const N: usize = 16;

	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let client = Client::new();
	let requests = (0..N).map(|i| {
		let client = client.clone();
		let url = format!("{base}/foo?i={i}");

		async move { client.get(url).send().await.map(|response| response.status()) }
	});
	let statuses = futures::future::join_all(requests).await;

	assert!(statuses.iter().all(|status| matches!(status, Ok(StatusCode::OK))));

	let route = server.state().route("/foo").expect("Route must be tracked.");

	assert_eq!(route.requests, N as u64);
	assert!(route.avg_ms > 0.0);

	let (_, status) = get_json(&client, &format!("{base}/status")).await;

	assert_eq!(status["ProxyServer"]["routes"]["/foo"]["requests"], N);

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn repeated_status_is_stable() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let client = Client::new();

	get_json(&client, &format!("{base}/shakespeare/_search?q=palace")).await;

	let (_, first) = get_json(&client, &format!("{base}/_reboost/status")).await;
	let (_, second) = get_json(&client, &format!("{base}/_reboost/status")).await;
	let (_, own_first) = get_json(&client, &format!("{base}/status")).await;
	let (_, own_second) = get_json(&client, &format!("{base}/status")).await;

	assert_eq!(first, second);
	assert_eq!(own_first, own_second);
	assert_eq!(first["ProxyServer"]["routes"]["/shakespeare/_search"]["requests"], 1);

	server.close().expect("Failed to close proxy server.");
}

#[tokio::test]
async fn bind_failure_surfaces_from_start() {
	let mock = mock();
	let taken = TcpListener::bind("127.0.0.1:0").expect("Failed to reserve a port.");
	let mut cfg = config(&mock, ShutdownMode::FailFast);

	cfg.server.port = taken.local_addr().expect("Failed to read reserved address.").port();

	let mut server = ProxyServer::from_config(&cfg).expect("Failed to build proxy server.");
	let err = server.start().expect_err("Expected bind failure.");

	assert!(matches!(err, Error::Bind { .. }), "Unexpected error: {err}");
	assert_eq!(server.phase(), Phase::Stopped);
	assert!(!server.state().is_ready());
}

#[test]
fn server_with_unregistrable_route_path_is_not_built() {
	let mock = mock();
	let mut cfg = config(&mock, ShutdownMode::FailFast);

	cfg.codex.search_path = "/:index/_search".to_string();

	assert!(reboost_config::validate(&cfg).is_err());
	assert!(matches!(ProxyServer::from_config(&cfg), Err(Error::Config(_))));
}

#[tokio::test]
async fn lifecycle_rejects_out_of_order_calls() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));

	assert!(matches!(server.start(), Err(Error::InvalidState { phase: Phase::Ready, .. })));

	server.close().expect("Failed to close proxy server.");

	assert_eq!(server.phase(), Phase::Stopped);
	assert!(Client::new().get(format!("{base}/status")).send().await.is_err());

	server.close().expect("Closing twice must be harmless.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_mode_finishes_in_flight_requests() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::Drain));
	let slow = tokio::spawn(async move {
		let response = Client::new().get(format!("{base}/_mock/slow?ms=400")).send().await?;

		response.text().await
	});

	tokio::time::sleep(Duration::from_millis(100)).await;
	tokio::task::spawn_blocking(move || server.close())
		.await
		.expect("Close task panicked.")
		.expect("Failed to close proxy server.");

	let body = slow.await.expect("Request task panicked.").expect("In-flight request must finish.");

	assert_eq!(body, "slow");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fail_fast_mode_drops_in_flight_requests() {
	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let slow = tokio::spawn(async move {
		let response = Client::new().get(format!("{base}/_mock/slow?ms=3000")).send().await?;

		response.text().await
	});

	tokio::time::sleep(Duration::from_millis(100)).await;

	let started = std::time::Instant::now();

	tokio::task::spawn_blocking(move || server.close())
		.await
		.expect("Close task panicked.")
		.expect("Failed to close proxy server.");

	assert!(started.elapsed() < Duration::from_secs(2));
	assert!(slow.await.expect("Request task panicked.").is_err());
}

/// Same searches through the proxy and straight at the backend, then a look at the timings.
#[tokio::test]
async fn benchmark_style_comparison() {
	const QUERIES: [&str; 5] = ["palace", "garden", "bridge", "harbor", "library"];

	let mock = mock();
	let (mut server, base) = start(&config(&mock, ShutdownMode::FailFast));
	let client = Client::new();

	for query in QUERIES {
		let (_, proxied) =
			get_json(&client, &format!("{base}/bench/_search?q={query}&size=5")).await;
		let (_, direct) =
			get_json(&client, &format!("{}/bench/_search?q={query}&size=5", mock.url())).await;

		assert_eq!(proxied["hits"]["hits"].as_array().map(Vec::len), Some(5));
		assert_eq!(direct["hits"]["hits"].as_array().map(Vec::len), Some(5));
	}

	let (_, status) = get_json(&client, &format!("{base}/_reboost/status")).await;
	let laps = &status["MemoryStore"]["laps"];

	assert_eq!(laps["Pipeline"]["search"]["count"], QUERIES.len());
	assert_eq!(laps["TermRanker"]["rank"]["count"], QUERIES.len());
	assert!(laps["HttpBackend"]["ask"]["avg_ms"].as_f64().is_some_and(|ms| ms > 0.0));

	let recent = status["MemoryStore"]["recent"].as_array().expect("Recent events must be listed.");
	let events_total = status["MemoryStore"]["events_total"].as_u64().unwrap_or_default();

	assert!(
		recent.iter().any(|event| event["owner"] == "Pipeline" && event["operation"] == "search")
	);
	assert!(events_total >= recent.len() as u64);
	assert_eq!(status["ProxyServer"]["routes"]["/bench/_search"]["requests"], QUERIES.len());

	server.close().expect("Failed to close proxy server.");
}
