use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bridge::BridgeConfig;

use crate::cli::Cli;

/// The server always listens here.
pub const LISTEN_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000);

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub allowed_origins: Vec<String>,
	pub secret_key: Option<String>,
	pub frame_queue_capacity: usize,
	pub bridge: BridgeConfig,
}

impl ServerConfig {
	pub fn from_cli(cli: &Cli) -> Self {
		let mut allowed_origins = vec![
			format!("http://localhost:{}", cli.client_port),
			format!("http://127.0.0.1:{}", cli.client_port),
		];
		for origin in &cli.allowed_origins {
			let origin = origin.trim().trim_end_matches('/');
			if !origin.is_empty() && !allowed_origins.iter().any(|o| o == origin) {
				allowed_origins.push(origin.to_string());
			}
		}

		Self {
			allowed_origins,
			secret_key: cli.secret_key.clone().filter(|key| !key.is_empty()),
			frame_queue_capacity: cli.frame_queue_capacity,
			bridge: BridgeConfig::default(),
		}
	}

	pub fn origin_allowed(&self, origin: &str) -> bool {
		let origin = origin.trim_end_matches('/');
		self.allowed_origins.iter().any(|allowed| allowed == origin)
	}

	/// True when no key is configured or `presented` matches it.
	pub fn key_accepted(&self, presented: Option<&str>) -> bool {
		match &self.secret_key {
			None => true,
			Some(expected) => presented == Some(expected.as_str()),
		}
	}
}
