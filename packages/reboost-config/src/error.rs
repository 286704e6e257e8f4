pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read config file at {path:?}.")]
	ReadConfig { path: std::path::PathBuf, source: std::io::Error },
	#[error("Failed to parse config file at {path:?}.")]
	ParseConfig { path: std::path::PathBuf, source: toml::de::Error },
	#[error("{key} must start with '/' and capture only whole segments, got {path:?}.")]
	InvalidRoutePath { key: &'static str, path: String },
	#[error("{first} and {second} must not share the route path {path:?}.")]
	RouteCollision { first: &'static str, second: &'static str, path: String },
	#[error("{message}")]
	Validation { message: String },
}
