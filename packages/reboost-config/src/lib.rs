mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Backend, Codex, CodexKind, Config, Ranker, RankerKind, RemoteRanker, Server, ShutdownMode,
	Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	validate_server(&cfg.server)?;
	validate_backend(&cfg.backend)?;
	validate_codex(cfg)?;
	validate_ranker(&cfg.ranker)?;

	if cfg.storage.max_queries == 0 {
		return Err(Error::Validation {
			message: "storage.max_queries must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.max_events == 0 {
		return Err(Error::Validation {
			message: "storage.max_events must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

pub fn normalize(cfg: &mut Config) {
	cfg.server.host = cfg.server.host.trim().to_string();
	cfg.server.status_method = cfg.server.status_method.trim().to_ascii_uppercase();
	cfg.backend.host = cfg.backend.host.trim().trim_end_matches('/').to_string();
	cfg.backend.scheme = cfg.backend.scheme.trim().to_ascii_lowercase();

	if let Some(remote) = cfg.ranker.remote.as_mut() {
		remote.api_base = remote.api_base.trim().trim_end_matches('/').to_string();
	}
}

fn validate_server(server: &crate::Server) -> Result<()> {
	if server.host.is_empty() {
		return Err(Error::Validation { message: "server.host must be non-empty.".to_string() });
	}
	if server.read_bytes == 0 {
		return Err(Error::Validation {
			message: "server.read_bytes must be greater than zero.".to_string(),
		});
	}

	check_route_path("server.status_path", &server.status_path)?;

	let method = server.status_method.as_str();

	if method != "*" && (method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase())) {
		return Err(Error::Validation {
			message: "server.status_method must be * or an HTTP method name.".to_string(),
		});
	}
	if server.startup_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "server.startup_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if server.shutdown == crate::ShutdownMode::Drain && server.drain_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "server.drain_timeout_ms must be greater than zero when shutdown is drain."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_backend(backend: &crate::Backend) -> Result<()> {
	if !matches!(backend.scheme.as_str(), "http" | "https") {
		return Err(Error::Validation {
			message: "backend.scheme must be one of http or https.".to_string(),
		});
	}
	if backend.host.is_empty() {
		return Err(Error::Validation { message: "backend.host must be non-empty.".to_string() });
	}
	if backend.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "backend.timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_codex(cfg: &Config) -> Result<()> {
	let codex = &cfg.codex;

	if codex.multiplier == 0 {
		return Err(Error::Validation {
			message: "codex.multiplier must be at least one.".to_string(),
		});
	}
	if codex.default_topk == 0 {
		return Err(Error::Validation {
			message: "codex.default_topk must be greater than zero.".to_string(),
		});
	}
	if codex.field.trim().is_empty() {
		return Err(Error::Validation { message: "codex.field must be non-empty.".to_string() });
	}

	let paths = [
		("codex.search_path", codex.search_path.as_str()),
		("codex.train_path", codex.train_path.as_str()),
		("codex.status_path", codex.status_path.as_str()),
		("server.status_path", cfg.server.status_path.as_str()),
	];

	check_routes(&paths)
}

/// Checks that every `(key, path)` pair can be registered on one router.
///
/// Each path must be `/`-rooted and capture only whole segments, as `{name}` or, in the last
/// segment, `{*name}`. Two paths collide when they are equal or when they reach differing captures
/// at the same position after an identical prefix.
pub fn check_routes(paths: &[(&'static str, &str)]) -> Result<()> {
	for &(key, path) in paths {
		check_route_path(key, path)?;
	}
	for (i, &(first, path)) in paths.iter().enumerate() {
		for &(second, other) in &paths[i + 1..] {
			if path == other || captures_conflict(path, other) {
				return Err(Error::RouteCollision { first, second, path: other.to_string() });
			}
		}
	}

	Ok(())
}

fn validate_ranker(ranker: &crate::Ranker) -> Result<()> {
	if !ranker.learning_rate.is_finite() {
		return Err(Error::Validation {
			message: "ranker.learning_rate must be a finite number.".to_string(),
		});
	}
	if ranker.learning_rate <= 0.0 {
		return Err(Error::Validation {
			message: "ranker.learning_rate must be greater than zero.".to_string(),
		});
	}
	if ranker.feature_buckets == 0 {
		return Err(Error::Validation {
			message: "ranker.feature_buckets must be greater than zero.".to_string(),
		});
	}
	if ranker.kind == crate::RankerKind::Remote {
		let Some(remote) = ranker.remote.as_ref() else {
			return Err(Error::Validation {
				message: "ranker.remote is required when ranker.kind is remote.".to_string(),
			});
		};

		for (label, value) in [
			("ranker.remote.api_base", &remote.api_base),
			("ranker.remote.model", &remote.model),
			("ranker.remote.api_key", &remote.api_key),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}

		if remote.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "ranker.remote.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn check_route_path(key: &'static str, path: &str) -> Result<()> {
	let invalid = || Error::InvalidRoutePath { key, path: path.to_string() };
	let Some(rest) = path.strip_prefix('/') else { return Err(invalid()) };
	let segments = rest.split('/').collect::<Vec<_>>();

	for (i, segment) in segments.iter().enumerate() {
		if segment.starts_with([':', '*']) {
			return Err(invalid());
		}
		if !segment.contains(['{', '}']) {
			continue;
		}

		let Some(name) = segment.strip_prefix('{').and_then(|name| name.strip_suffix('}')) else {
			return Err(invalid());
		};
		let (catch_all, name) = match name.strip_prefix('*') {
			Some(name) => (true, name),
			None => (false, name),
		};

		if name.is_empty()
			|| name.contains(['{', '}', '*', ':'])
			|| (catch_all && i + 1 != segments.len())
		{
			return Err(invalid());
		}
	}

	Ok(())
}

fn is_capture(segment: &str) -> bool {
	segment.starts_with('{')
}

fn captures_conflict(path: &str, other: &str) -> bool {
	for (a, b) in path.split('/').zip(other.split('/')) {
		if a == b {
			continue;
		}

		return is_capture(a) && is_capture(b);
	}

	false
}
