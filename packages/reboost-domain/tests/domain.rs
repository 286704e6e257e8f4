use http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use reboost_domain::{Error, Request, Response};

#[test]
fn error_codes_map_to_statuses() {
	let qid = Uuid::new_v4();
	let cases = [
		(Error::InvalidRequest { message: "x".to_string() }, "INVALID_REQUEST", 400),
		(Error::UnknownQid { qid }, "UNKNOWN_QID", 404),
		(Error::UnknownCid { qid, cid: 3 }, "UNKNOWN_CID", 404),
		(Error::Backend { message: "x".to_string() }, "BACKEND_ERROR", 502),
		(Error::Timeout { timeout_ms: 10 }, "BACKEND_TIMEOUT", 504),
		(Error::Ranker { message: "x".to_string() }, "RANKER_ERROR", 500),
	];

	for (err, code, status) in cases {
		assert_eq!(err.code(), code);
		assert_eq!(err.status_code().as_u16(), status);
	}
}

#[test]
fn unknown_qid_message_names_the_id() {
	let qid = Uuid::new_v4();
	let err = Error::UnknownQid { qid };

	assert!(err.to_string().contains(&qid.to_string()));
}

#[test]
fn json_request_round_trips_body() {
	let request = Request::new(Method::POST, "/docs/_search").with_json(&json!({ "size": 4 }));
	let body = request.json_body().expect("Body must parse.").expect("Body must be present.");

	assert_eq!(body["size"], 4);
	assert_eq!(request.headers["content-type"], "application/json");
}

#[test]
fn malformed_json_body_is_invalid_request() {
	let mut request = Request::new(Method::POST, "/train");

	request.body = bytes::Bytes::from_static(b"{not json");

	assert!(matches!(request.json_body(), Err(Error::InvalidRequest { .. })));
}

#[test]
fn json_response_is_flagged() {
	let response = Response::json(StatusCode::OK, &json!({ "ok": true }));

	assert!(response.is_json());
	assert!(!Response::new(StatusCode::OK, "plain").is_json());
}
