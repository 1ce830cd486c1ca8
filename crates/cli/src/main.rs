use bridge_server::cli::Cli;
use bridge_server::config::ServerConfig;
use bridge_server::logging;
use clap::Parser;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
	// .env values must be in the environment before clap reads it
	let dotenv = dotenvy::dotenv();
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = dotenv {
		if !err.not_found() {
			warn!(target = "bridge.server", error = %err, "failed to load .env");
		}
	}

	let config = ServerConfig::from_cli(&cli);
	if let Err(err) = bridge_server::run(config).await {
		let message = format!("{err:#}");
		error!(target = "bridge.server", error = %message, "server failed");
		eprintln!("Error: {message}");
		std::process::exit(1);
	}
}
