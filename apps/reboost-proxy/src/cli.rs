use std::path::PathBuf;

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Debug, Parser)]
#[command(version = VERSION, rename_all = "kebab", styles = styles())]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Overrides `server.host`.
	#[arg(long, value_name = "HOST")]
	pub host: Option<String>,
	/// Overrides `server.port`.
	#[arg(long, value_name = "PORT")]
	pub port: Option<u16>,
	/// Overrides `codex.multiplier`.
	#[arg(long, value_name = "N")]
	pub multiplier: Option<u32>,
}
impl Args {
	pub fn apply(&self, cfg: &mut reboost_config::Config) {
		if let Some(host) = &self.host {
			cfg.server.host = host.clone();
		}
		if let Some(port) = self.port {
			cfg.server.port = port;
		}
		if let Some(multiplier) = self.multiplier {
			cfg.codex.multiplier = multiplier;
		}
	}
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}
