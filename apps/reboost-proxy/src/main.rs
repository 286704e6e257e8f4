use clap::Parser;

fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = reboost_proxy::Args::parse();

	reboost_proxy::run(args)
}
