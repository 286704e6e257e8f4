use http::StatusCode;

use crate::{Cid, Qid};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Unknown query id {qid}.")]
	UnknownQid { qid: Qid },
	#[error("Unknown choice id {cid} for query {qid}.")]
	UnknownCid { qid: Qid, cid: Cid },
	#[error("Backend error: {message}")]
	Backend { message: String },
	#[error("Backend did not answer within {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
	#[error("Codex error: {message}")]
	Codex { message: String },
	#[error("Ranker error: {message}")]
	Ranker { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Stable machine-readable code for error bodies.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "INVALID_REQUEST",
			Self::UnknownQid { .. } => "UNKNOWN_QID",
			Self::UnknownCid { .. } => "UNKNOWN_CID",
			Self::Backend { .. } => "BACKEND_ERROR",
			Self::Timeout { .. } => "BACKEND_TIMEOUT",
			Self::Codex { .. } => "CODEX_ERROR",
			Self::Ranker { .. } => "RANKER_ERROR",
			Self::Storage { .. } => "STORAGE_ERROR",
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
			Self::UnknownQid { .. } | Self::UnknownCid { .. } => StatusCode::NOT_FOUND,
			Self::Backend { .. } | Self::Codex { .. } => StatusCode::BAD_GATEWAY,
			Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			Self::Ranker { .. } | Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Codex { message: err.to_string() }
	}
}
