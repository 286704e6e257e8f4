use http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use reboost_domain::{
	Choices, Cid, Codex, Component, ComponentStatus, Error, Packed, Qid, Query, Request, Response,
	Result, Topk,
};

/// Elasticsearch `_search` protocol.
///
/// The result count comes from the `size` query parameter, then the JSON body `size`, then
/// `default_topk`. The query text comes from `q` (a `field:` prefix is dropped) or from the body's
/// `query.match.<field>`. Candidate text is read from `hits.hits[*]._source.<field>`.
pub struct EsCodex {
	multiplier: usize,
	field: String,
	default_topk: usize,
	search_path: String,
	train_path: String,
	status_path: String,
}
impl EsCodex {
	pub fn new(cfg: &reboost_config::Codex) -> Self {
		Self {
			multiplier: cfg.multiplier.max(1) as usize,
			field: cfg.field.clone(),
			default_topk: cfg.default_topk as usize,
			search_path: cfg.search_path.clone(),
			train_path: cfg.train_path.clone(),
			status_path: cfg.status_path.clone(),
		}
	}

	fn query_text(&self, request: &Request) -> Result<Query> {
		if let Some(q) = request.query_param("q") {
			let text = match q.split_once(':') {
				Some((_, text)) => text,
				None => q.as_str(),
			};

			return Ok(text.trim().to_string());
		}

		let Some(body) = request.json_body()? else {
			return Ok(String::new());
		};
		let clause = &body["query"]["match"][self.field.as_str()];
		let text = clause.as_str().or_else(|| clause["query"].as_str()).unwrap_or_default();

		Ok(text.to_string())
	}

	fn choice_text(&self, hit: &Value) -> String {
		match &hit["_source"][self.field.as_str()] {
			Value::String(text) => text.clone(),
			Value::Null => String::new(),
			other => other.to_string(),
		}
	}
}

impl Component for EsCodex {
	fn name(&self) -> &'static str {
		"EsCodex"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let section = json!({
			"multiplier": self.multiplier,
			"field": self.field,
			"default_topk": self.default_topk,
			"search_path": self.search_path,
			"train_path": self.train_path,
			"status_path": self.status_path,
		});

		reboost_domain::contribute(state, self.name(), section)
	}
}

impl Codex for EsCodex {
	fn search_path(&self) -> &str {
		&self.search_path
	}

	fn train_path(&self) -> &str {
		&self.train_path
	}

	fn status_path(&self) -> &str {
		&self.status_path
	}

	fn topk(&self, request: &Request) -> Result<Topk> {
		let topk = match request.query_param("size") {
			Some(raw) => raw.trim().parse::<usize>().map_err(|_| Error::InvalidRequest {
				message: format!("size must be a non-negative integer, got {raw:?}."),
			})?,
			None => match request.json_body()?.as_ref().and_then(|body| body.get("size")) {
				Some(size) => size.as_u64().ok_or_else(|| Error::InvalidRequest {
					message: format!("size must be a non-negative integer, got {size}."),
				})? as usize,
				None => self.default_topk,
			},
		};

		if topk == 0 {
			return Err(Error::InvalidRequest {
				message: "size must be greater than zero.".to_string(),
			});
		}

		Ok(topk)
	}

	fn magnify(&self, request: &Request, topk: Topk) -> Result<Request> {
		let size = topk.saturating_mul(self.multiplier);
		let mut magnified = request.clone();

		magnified.set_query_param("size", &size.to_string());

		if let Some(mut body) = request.json_body()?
			&& let Some(object) = body.as_object_mut()
		{
			object.insert("size".to_string(), json!(size));

			magnified.body = body.to_string().into();
		}

		Ok(magnified)
	}

	fn parse(&self, request: &Request, response: &Response) -> Result<(Query, Choices)> {
		if !response.status.is_success() {
			let preview =
				String::from_utf8_lossy(&response.body).chars().take(200).collect::<String>();

			return Err(Error::Backend {
				message: format!("Search answered {}: {preview}", response.status),
			});
		}

		let json = response.json_body()?;
		let hits = json["hits"]["hits"].as_array().ok_or_else(|| Error::Codex {
			message: "Search response is missing hits.hits.".to_string(),
		})?;
		let choices = hits.iter().map(|hit| self.choice_text(hit)).collect();
		let query = self.query_text(request)?;

		Ok((query, choices))
	}

	fn pack(&self, packed: Packed<'_>) -> Result<Response> {
		let mut json = packed.response.json_body()?;
		let Some(hits) = json["hits"]["hits"].as_array_mut() else {
			return Err(Error::Codex {
				message: "Search response is missing hits.hits.".to_string(),
			});
		};
		let mut original = std::mem::take(hits);
		let mut reranked = Vec::with_capacity(packed.topk.min(packed.ranks.len()));

		for &index in packed.ranks.iter().take(packed.topk) {
			let (Some(hit), Some(&cid)) = (original.get_mut(index), packed.cids.get(index)) else {
				return Err(Error::Codex {
					message: format!("Rank index {index} has no matching hit."),
				});
			};
			let mut hit = hit.take();

			if let Some(object) = hit.as_object_mut() {
				object.insert("_reboost".to_string(), json!({ "qid": packed.qid, "cid": cid }));
			}

			reranked.push(hit);
		}

		*hits = reranked;
		json["_reboost"] = json!({
			"qid": packed.qid,
			"query": packed.query,
			"topk": packed.topk,
			"candidates": packed.choices.len(),
		});

		Ok(Response::json(packed.response.status, &json))
	}

	fn pluck(&self, request: &Request) -> Result<(Qid, Vec<Cid>)> {
		let body = request.json_body()?;
		let raw_qid = match request.query_param("qid") {
			Some(qid) => qid,
			None => body
				.as_ref()
				.and_then(|body| body["qid"].as_str())
				.map(str::to_string)
				.ok_or_else(|| Error::InvalidRequest { message: "qid is required.".to_string() })?,
		};
		let qid = Uuid::parse_str(raw_qid.trim()).map_err(|_| Error::InvalidRequest {
			message: format!("qid {raw_qid:?} is not a valid id."),
		})?;
		let mut cids = Vec::new();

		for raw in request.query_params("cid") {
			for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
				cids.push(parse_cid(part)?);
			}
		}

		if cids.is_empty()
			&& let Some(body) = &body
		{
			let values = match &body["cids"] {
				Value::Array(values) => values.clone(),
				Value::Null if !body["cid"].is_null() => vec![body["cid"].clone()],
				Value::Null => Vec::new(),
				other => vec![other.clone()],
			};

			for value in values {
				let cid = value.as_u64().ok_or_else(|| Error::InvalidRequest {
					message: format!("cid must be a non-negative integer, got {value}."),
				})?;

				cids.push(cid as Cid);
			}
		}

		if cids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "At least one cid is required.".to_string(),
			});
		}

		Ok((qid, cids))
	}

	fn ack(&self, qid: Qid, cids: &[Cid]) -> Result<Response> {
		let body = json!({ "acknowledged": true, "qid": qid, "cids": cids });

		Ok(Response::json(StatusCode::OK, &body))
	}

	fn catch(&self, err: &Error) -> Option<Response> {
		let body = json!({ "error_code": err.code(), "message": err.to_string() });

		Some(Response::json(err.status_code(), &body))
	}

	fn pulse(&self, state: &ComponentStatus) -> Result<Response> {
		Ok(Response::json(StatusCode::OK, &Value::Object(state.clone())))
	}
}

fn parse_cid(raw: &str) -> Result<Cid> {
	raw.parse::<Cid>().map_err(|_| Error::InvalidRequest {
		message: format!("cid must be a non-negative integer, got {raw:?}."),
	})
}
