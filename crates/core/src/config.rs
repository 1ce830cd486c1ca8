use std::time::Duration;

use bridge_runtime::{DEFAULT_READY_TIMEOUT, DEFAULT_THREAD_NAME, SchedulerConfig};

/// Bounded wait for an engine's `start_tasks` after a connect.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for `stop_tasks` when the designated session disconnects.
pub const DISCONNECT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// T1: bounded wait for `stop_tasks` during process shutdown.
pub const SHUTDOWN_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// T2: shared deadline for cancelling, draining and joining the scheduler worker.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeouts and worker settings for a [`crate::Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
	pub worker_thread_name: String,
	pub worker_ready_timeout: Duration,
	pub startup_timeout: Duration,
	pub disconnect_stop_timeout: Duration,
	pub shutdown_stop_timeout: Duration,
	pub worker_join_timeout: Duration,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			worker_thread_name: DEFAULT_THREAD_NAME.to_string(),
			worker_ready_timeout: DEFAULT_READY_TIMEOUT,
			startup_timeout: STARTUP_TIMEOUT,
			disconnect_stop_timeout: DISCONNECT_STOP_TIMEOUT,
			shutdown_stop_timeout: SHUTDOWN_STOP_TIMEOUT,
			worker_join_timeout: WORKER_JOIN_TIMEOUT,
		}
	}
}

impl BridgeConfig {
	pub fn scheduler(&self) -> SchedulerConfig {
		SchedulerConfig {
			thread_name: self.worker_thread_name.clone(),
			ready_timeout: self.worker_ready_timeout,
		}
	}
}
