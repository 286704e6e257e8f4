pub mod cli;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

mod error;

pub use cli::Args;
pub use error::{Error, Result};
pub use server::{Phase, ProxyServer};
pub use state::{RouteState, ServerState};

use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

/// Loads the config, serves until Ctrl-C, then closes the server.
pub fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = reboost_config::load(&args.config)?;

	args.apply(&mut config);
	reboost_config::normalize(&mut config);
	reboost_config::validate(&config)?;
	init_tracing(&config);

	let mut server = ProxyServer::from_config(&config)?;
	let addr = server.start()?;

	tracing::info!(
		%addr,
		backend = %config.backend.base_url(),
		"Proxy ready. Press Ctrl-C to stop."
	);

	let signals = Builder::new_current_thread().enable_all().build()?;

	signals.block_on(tokio::signal::ctrl_c())?;

	tracing::info!("Shutdown requested.");

	server.close()?;

	Ok(())
}

fn init_tracing(config: &reboost_config::Config) {
	let filter =
		EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
