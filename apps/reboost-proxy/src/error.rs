use crate::server::Phase;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to bind {addr}: {source}.")]
	Bind { addr: String, source: std::io::Error },
	#[error("Server did not become ready within {timeout_ms} ms.")]
	StartupTimeout { timeout_ms: u64 },
	#[error("Server thread exited: {message}")]
	ServerExited { message: String },
	#[error("Route path {path} is registered twice.")]
	RouteConflict { path: String },
	#[error("Status method {method:?} is not a valid HTTP method.")]
	InvalidMethod { method: String },
	#[error("Cannot {operation} a server that is {phase}.")]
	InvalidState { operation: &'static str, phase: Phase },
	#[error("Failed to build the server runtime: {0}.")]
	Runtime(std::io::Error),

	#[error(transparent)]
	Config(#[from] reboost_config::Error),
	#[error(transparent)]
	Service(#[from] reboost_service::Error),
}
