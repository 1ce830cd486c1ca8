//! Stderr logging keyed to the bridge's tracing targets.
//!
//! Every bridge event is logged under a `bridge.<component>` target
//! (`bridge.scheduler`, `bridge.dispatch`, `bridge.registry`, `bridge.router`,
//! `bridge.shutdown`, `bridge.server`, `bridge.loopback`), so verbosity raises
//! the bridge's own output without unmuting axum and hyper.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter directives for `-v` repeated `verbosity` times.
pub fn directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		// connects, rebinds, releases, shutdown
		1 => "warn,bridge=info",
		// plus per-event routing and lifecycle waits
		2 => "info,bridge=debug",
		// plus every frame and dispatch
		_ => "info,bridge=trace",
	}
}

/// Installs the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_thread_names(true)
		.with_level(true)
		.compact()
		.init();
}
