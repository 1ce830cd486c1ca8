//! Assistant bridge server.
//!
//! Hosts the session bridge behind a websocket endpoint:
//!
//! - `GET /` - health check
//! - `GET /ws` - one session per websocket, JSON `{"event", "data"}` frames
//!
//! The assistant itself is the in-process loopback engine from [`engine`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod server;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{LISTEN_ADDR, ServerConfig};
use crate::server::{Server, shutdown_signal};

/// Runs the server on [`LISTEN_ADDR`] until SIGINT or SIGTERM, then tears the
/// bridge down.
pub async fn run(config: ServerConfig) -> Result<()> {
	let signal = shutdown_signal()?;
	let listener = TcpListener::bind(LISTEN_ADDR)
		.await
		.with_context(|| format!("Failed to bind {LISTEN_ADDR}"))?;

	let server = Server::new(config);
	let stop = server.shutdown_handle();
	tokio::spawn(async move {
		let name = signal.await;
		info!(target = "bridge.server", signal = name, "shutdown signal received");
		let _ = stop.send(true);
	});

	match server.run(listener).await? {
		Some(summary) => {
			if summary.engine == Some(false) || (summary.scheduler.was_running && !summary.scheduler.joined) {
				warn!(target = "bridge.server", ?summary, "bridge shut down with timeouts");
			} else {
				info!(target = "bridge.server", ?summary, "bridge shut down");
			}
		}
		None => info!(target = "bridge.server", "bridge was already shut down"),
	}
	Ok(())
}
