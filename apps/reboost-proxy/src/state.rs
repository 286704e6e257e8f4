use std::{
	collections::BTreeMap,
	net::SocketAddr,
	sync::{
		Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use ahash::AHashMap;
use serde::Serialize;
use serde_json::json;

use reboost_domain::{Component, ComponentStatus};

/// Per-path counters kept for the lifetime of the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouteState {
	pub requests: u64,
	pub avg_ms: f64,
}
impl RouteState {
	fn fold(&mut self, elapsed_ms: f64) {
		self.requests += 1;
		self.avg_ms += (elapsed_ms - self.avg_ms) / self.requests as f64;
	}
}

/// Listener facts and the route table, shared by the server thread and the status handlers.
pub struct ServerState {
	host: String,
	port: u16,
	read_bytes: usize,
	/// Paths whose requests are not counted, so reading status leaves status unchanged.
	untracked: Vec<String>,
	bound: Mutex<Option<SocketAddr>>,
	is_ready: AtomicBool,
	routes: Mutex<AHashMap<String, RouteState>>,
}
impl ServerState {
	pub fn new(cfg: &reboost_config::Server, untracked: &[&str]) -> Self {
		let mut untracked = untracked.iter().map(|path| path.to_string()).collect::<Vec<_>>();

		untracked.push(cfg.status_path.clone());

		Self {
			host: cfg.host.clone(),
			port: cfg.port,
			read_bytes: cfg.read_bytes,
			untracked,
			bound: Mutex::new(None),
			is_ready: AtomicBool::new(false),
			routes: Mutex::new(AHashMap::new()),
		}
	}

	pub fn is_ready(&self) -> bool {
		self.is_ready.load(Ordering::SeqCst)
	}

	pub fn bound_addr(&self) -> Option<SocketAddr> {
		*self.bound.lock().unwrap_or_else(|err| err.into_inner())
	}

	pub(crate) fn mark_ready(&self, addr: SocketAddr) {
		*self.bound.lock().unwrap_or_else(|err| err.into_inner()) = Some(addr);

		self.is_ready.store(true, Ordering::SeqCst);
	}

	pub(crate) fn mark_stopped(&self) {
		self.is_ready.store(false, Ordering::SeqCst);
	}

	pub fn is_tracked(&self, path: &str) -> bool {
		!self.untracked.iter().any(|untracked| untracked == path)
	}

	/// Counts one finished request and folds its latency into the path's running mean.
	pub fn record(&self, path: &str, elapsed_ms: f64) {
		let mut routes = self.routes.lock().unwrap_or_else(|err| err.into_inner());

		match routes.get_mut(path) {
			Some(route) => route.fold(elapsed_ms),
			None => {
				let mut route = RouteState::default();

				route.fold(elapsed_ms);
				routes.insert(path.to_string(), route);
			},
		}
	}

	pub fn route(&self, path: &str) -> Option<RouteState> {
		self.routes.lock().unwrap_or_else(|err| err.into_inner()).get(path).copied()
	}

	pub fn routes(&self) -> BTreeMap<String, RouteState> {
		let routes = self.routes.lock().unwrap_or_else(|err| err.into_inner());

		routes.iter().map(|(path, route)| (path.clone(), *route)).collect()
	}
}

impl Component for ServerState {
	fn name(&self) -> &'static str {
		"ProxyServer"
	}

	fn chain_state(&self, state: ComponentStatus) -> ComponentStatus {
		let port = self.bound_addr().map_or(self.port, |addr| addr.port());
		let section = json!({
			"host": self.host,
			"port": port,
			"read_bytes": self.read_bytes,
			"is_ready": self.is_ready(),
			"routes": self.routes(),
		});

		reboost_domain::contribute(state, self.name(), section)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state() -> ServerState {
		ServerState::new(&reboost_config::Server::default(), &["/_reboost/status"])
	}

	#[test]
	fn running_mean_is_exact() {
		let state = state();

		for elapsed in [10.0, 20.0, 30.0, 40.0] {
			state.record("/idx/_search", elapsed);
		}

		let route = state.route("/idx/_search").expect("Route must exist.");

		assert_eq!(route.requests, 4);
		assert!((route.avg_ms - 25.0).abs() < 1e-9);
	}

	#[test]
	fn status_paths_are_untracked() {
		let state = state();

		assert!(!state.is_tracked("/status"));
		assert!(!state.is_tracked("/_reboost/status"));
		assert!(state.is_tracked("/foo"));
	}

	#[test]
	fn status_section_reports_bound_port() {
		let state = state();

		state.mark_ready("127.0.0.1:4321".parse().expect("Invalid address."));
		state.record("/foo", 1.0);

		let status = state.chain_state(ComponentStatus::new());

		assert_eq!(status["ProxyServer"]["port"], 4321);
		assert_eq!(status["ProxyServer"]["is_ready"], true);
		assert_eq!(status["ProxyServer"]["routes"]["/foo"]["requests"], 1);
	}
}
