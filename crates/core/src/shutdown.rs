//! Process-exit teardown.
//!
//! Closes the registry, stops the live engine with a bounded wait, clears the
//! registry, then shuts the scheduler down. Runs at most once no matter how
//! many exit paths reach it; every overrun is logged and skipped.
//!
//! A disconnect racing the shutdown does not extend it: its stop is cut off at
//! the engine deadline and counted as the shutdown's own. The whole sequence
//! takes at most `stop_timeout + join_timeout` plus two small grace periods,
//! one for an interrupted lifecycle call to unwind and
//! [`bridge_runtime::ACK_MARGIN`] for finalization hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bridge_runtime::ShutdownReport;
use tracing::{debug, info, warn};

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
	/// `None` when no engine was live; otherwise whether it stopped within T1,
	/// including a stop begun by a disconnect that shutdown took over.
	pub engine: Option<bool>,
	pub scheduler: ShutdownReport,
}

pub struct ShutdownCoordinator {
	registry: Arc<Registry>,
	stop_timeout: Duration,
	join_timeout: Duration,
	done: AtomicBool,
}

impl ShutdownCoordinator {
	pub fn new(registry: Arc<Registry>, stop_timeout: Duration, join_timeout: Duration) -> Self {
		Self {
			registry,
			stop_timeout,
			join_timeout,
			done: AtomicBool::new(false),
		}
	}

	pub fn has_run(&self) -> bool {
		self.done.load(Ordering::Acquire)
	}

	/// Returns `None` if shutdown already ran.
	pub fn run(&self) -> Option<ShutdownSummary> {
		if self.done.swap(true, Ordering::AcqRel) {
			debug!(target = "bridge.shutdown", "shutdown already performed");
			return None;
		}

		let started = Instant::now();
		info!(target = "bridge.shutdown", "shutting down assistant bridge");

		let engine = self.registry.teardown(self.stop_timeout);
		if engine == Some(false) {
			warn!(
				target = "bridge.shutdown",
				timeout_ms = self.stop_timeout.as_millis() as u64,
				"assistant did not stop cleanly; continuing"
			);
		}

		let scheduler = self.registry.dispatcher().scheduler().shutdown(self.join_timeout);
		if scheduler.was_running && !scheduler.joined {
			warn!(target = "bridge.shutdown", "scheduler worker left detached");
		}

		info!(
			target = "bridge.shutdown",
			elapsed_ms = started.elapsed().as_millis() as u64,
			"shutdown complete"
		);
		Some(ShutdownSummary { engine, scheduler })
	}
}
