//! Error types for the scheduler runtime.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting, feeding or stopping the scheduler.
#[derive(Debug, Error)]
pub enum Error {
	/// No running scheduler accepts submissions.
	#[error("scheduler unavailable: no running worker accepts submissions")]
	Unavailable,

	/// The worker thread did not signal readiness in time.
	#[error("scheduler worker not ready after {}ms", .0.as_millis())]
	NotReady(Duration),

	/// A bounded wait expired. The operation keeps running.
	#[error("timed out after {}ms waiting for {label}", waited.as_millis())]
	Timeout { label: String, waited: Duration },

	/// The operation was dropped before producing a result (scheduler shutdown).
	#[error("scheduled operation was cancelled before completing")]
	Cancelled,

	/// The worker thread did not exit within its shutdown budget.
	#[error("scheduler worker did not exit within {}ms", .0.as_millis())]
	WorkerJoinTimeout(Duration),

	/// Failed to build the runtime or spawn its worker thread.
	#[error("failed to start scheduler worker: {0}")]
	Spawn(#[from] std::io::Error),
}

impl Error {
	/// Returns true if this is a bounded-wait timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the scheduler could not take the work at all.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Error::Unavailable | Error::NotReady(_))
	}
}
