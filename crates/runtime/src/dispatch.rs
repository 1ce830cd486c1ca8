//! Cross-thread dispatch into the scheduler.
//!
//! Two call shapes sit on top of [`Scheduler`]:
//!
//! - [`Dispatcher::fire_and_forget`] for streaming input where blocking the
//!   transport thread is unacceptable
//! - [`Dispatcher::bounded_wait`] for lifecycle operations whose outcome the
//!   caller needs before answering its client, optionally capped by a
//!   [`Cutoff`]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::cutoff::Cutoff;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct Dispatcher {
	scheduler: Arc<Scheduler>,
}

impl Dispatcher {
	pub fn new(scheduler: Arc<Scheduler>) -> Self {
		Self { scheduler }
	}

	pub fn scheduler(&self) -> &Arc<Scheduler> {
		&self.scheduler
	}

	/// True if submissions would currently be accepted.
	pub fn is_ready(&self) -> bool {
		self.scheduler.is_running()
	}

	/// Submits `operation` and returns immediately.
	///
	/// Fails synchronously with [`Error::Unavailable`] when no scheduler is
	/// running. Failures inside the operation are never seen here.
	pub fn fire_and_forget<F>(&self, label: &'static str, operation: F) -> Result<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.scheduler.spawn(operation)?;
		trace!(target = "bridge.dispatch", label, "submitted");
		Ok(())
	}

	/// Submits `operation` and blocks the calling thread for up to `timeout`.
	///
	/// On [`Error::Timeout`] the operation is left running; scheduler shutdown
	/// eventually sweeps it.
	pub fn bounded_wait<F>(&self, label: &'static str, operation: F, timeout: Duration) -> Result<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let started = Instant::now();
		let handle = self.scheduler.submit(operation)?;
		settle(label, started, handle.wait(timeout))
	}

	/// [`Dispatcher::bounded_wait`] that also ends at `cutoff`, including a
	/// cutoff set after the wait began.
	pub fn bounded_wait_capped<F>(
		&self,
		label: &'static str,
		operation: F,
		timeout: Duration,
		cutoff: &Cutoff,
	) -> Result<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let started = Instant::now();
		let handle = self.scheduler.submit(operation)?;
		settle(label, started, handle.wait_capped(timeout, cutoff))
	}
}

fn settle<T>(label: &'static str, started: Instant, waited: Result<T>) -> Result<T> {
	match waited {
		Ok(output) => {
			trace!(
				target = "bridge.dispatch",
				label,
				elapsed_ms = started.elapsed().as_millis() as u64,
				"completed"
			);
			Ok(output)
		}
		Err(Error::Timeout { waited, .. }) => {
			warn!(
				target = "bridge.dispatch",
				label,
				waited_ms = waited.as_millis() as u64,
				"bounded wait expired; operation left running"
			);
			Err(Error::Timeout {
				label: label.to_string(),
				waited,
			})
		}
		Err(err) => Err(err),
	}
}
