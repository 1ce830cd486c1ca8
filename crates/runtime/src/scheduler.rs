//! Cooperative scheduler hosted on a dedicated worker thread
//!
//! The scheduler is a tokio current-thread runtime driven by exactly one OS
//! thread that nothing else runs on. Callers on any other thread hand work to
//! it through a single-consumer command channel.
//!
//! # Lifecycle
//!
//! 1. `ensure_started()` builds the runtime, spawns the worker and blocks until
//!    the worker reports that its loop is running
//! 2. `submit()` / `spawn()` send boxed futures into the loop, which spawns them
//!    into its task set in arrival order
//! 3. `shutdown()` detaches the worker from the scheduler (new submissions fail
//!    with [`Error::Unavailable`]), asks the loop to stop, which aborts every
//!    outstanding task, waits for the aborts to land, runs the finalization
//!    hooks and returns; the caller then joins the thread. All of it shares one
//!    deadline, so the whole sequence takes at most its timeout plus
//!    [`ACK_MARGIN`]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, select};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cutoff::Cutoff;
use crate::error::{Error, Result};

/// How long `ensure_started` waits for the worker loop to come up.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Name given to the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "bridge-scheduler";

/// Extra time granted past the shutdown deadline, covering the finalization
/// hooks.
pub const ACK_MARGIN: Duration = Duration::from_millis(250);

/// Drain budget used when the loop ends because the scheduler was dropped.
const ORPHAN_DRAIN_GRACE: Duration = Duration::from_secs(1);

type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	pub thread_name: String,
	pub ready_timeout: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			thread_name: DEFAULT_THREAD_NAME.to_string(),
			ready_timeout: DEFAULT_READY_TIMEOUT,
		}
	}
}

/// What happened during [`Scheduler::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
	/// A worker existed when shutdown began.
	pub was_running: bool,
	/// Operations aborted, including queued ones that never started.
	pub cancelled: usize,
	/// Every aborted operation finished unwinding within the budget.
	pub drained: bool,
	/// Finalization hooks that ran on the worker.
	pub hooks_run: usize,
	/// The worker thread exited and was joined within the budget.
	pub joined: bool,
}

enum Command {
	Spawn(BoxTask),
	Stop(StopRequest),
}

struct StopRequest {
	deadline: Instant,
	hooks: Vec<Hook>,
	ack: Sender<DrainReport>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DrainReport {
	cancelled: usize,
	drained: bool,
	hooks_run: usize,
}

/// Shared view of a worker's readiness used by callers waiting on startup.
#[derive(Clone)]
struct Readiness {
	running: Arc<AtomicBool>,
	ready: Receiver<()>,
}

impl Readiness {
	/// Blocks until the loop reports running, the worker dies, or `timeout`.
	fn wait(&self, timeout: Duration) -> Result<()> {
		if self.running.load(Ordering::Acquire) {
			return Ok(());
		}
		match self.ready.recv_timeout(timeout) {
			Ok(()) | Err(RecvTimeoutError::Disconnected) => {
				if self.running.load(Ordering::Acquire) {
					Ok(())
				} else {
					Err(Error::Unavailable)
				}
			}
			Err(RecvTimeoutError::Timeout) => Err(Error::NotReady(timeout)),
		}
	}
}

struct Worker {
	commands: mpsc::UnboundedSender<Command>,
	readiness: Readiness,
	exited: Receiver<()>,
	thread: thread::JoinHandle<()>,
}

impl Worker {
	fn spawn(config: &SchedulerConfig) -> Result<Self> {
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()?;

		let (commands, command_rx) = mpsc::unbounded_channel();
		let (ready_tx, ready_rx) = bounded(1);
		let (exit_tx, exit_rx) = bounded(1);
		let running = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&running);

		let thread = thread::Builder::new()
			.name(config.thread_name.clone())
			.spawn(move || {
				let _exit = ExitSignal(exit_tx);
				run_loop(runtime, command_rx, ready_tx, flag);
			})?;

		Ok(Self {
			commands,
			readiness: Readiness {
				running,
				ready: ready_rx,
			},
			exited: exit_rx,
			thread,
		})
	}

	fn is_alive(&self) -> bool {
		!self.thread.is_finished() && !self.commands.is_closed()
	}

	fn is_running(&self) -> bool {
		self.readiness.running.load(Ordering::Acquire) && self.is_alive()
	}

	/// Waits up to `timeout` for the thread to exit, then joins it.
	///
	/// On timeout the thread is detached.
	fn join(self, timeout: Duration) -> bool {
		match self.exited.recv_timeout(timeout) {
			Ok(()) | Err(RecvTimeoutError::Disconnected) => {
				if self.thread.join().is_err() {
					warn!(target = "bridge.scheduler", "scheduler worker panicked");
				}
				true
			}
			Err(RecvTimeoutError::Timeout) => {
				let err = Error::WorkerJoinTimeout(timeout);
				warn!(target = "bridge.scheduler", error = %err, "detaching scheduler worker");
				false
			}
		}
	}
}

/// Signals the joiner when the worker thread is about to finish, even on panic.
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
	fn drop(&mut self) {
		let _ = self.0.send(());
	}
}

/// Clears the running flag when the loop ends, even on panic.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

fn run_loop(
	runtime: Runtime,
	mut commands: mpsc::UnboundedReceiver<Command>,
	ready: Sender<()>,
	running: Arc<AtomicBool>,
) {
	let deadline = runtime.block_on(async move {
		let flag = RunningFlag(running);
		flag.0.store(true, Ordering::Release);
		let _ = ready.send(());
		drop(ready);
		info!(target = "bridge.scheduler", "scheduler loop running");

		let mut tasks = JoinSet::new();
		let stop = loop {
			tokio::select! {
				biased;
				command = commands.recv() => match command {
					Some(Command::Spawn(task)) => {
						tasks.spawn(task);
					}
					Some(Command::Stop(stop)) => break Some(stop),
					None => break None,
				},
				Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
					if let Err(err) = joined {
						if err.is_panic() {
							warn!(target = "bridge.scheduler", error = %err, "scheduled operation panicked");
						}
					}
				}
			}
		};
		drop(flag);

		commands.close();
		let mut cancelled = tasks.len();
		loop {
			match commands.try_recv() {
				Ok(Command::Spawn(_)) => cancelled += 1,
				Ok(Command::Stop(extra)) => drop(extra),
				Err(_) => break,
			}
		}

		let deadline = stop
			.as_ref()
			.map_or_else(|| Instant::now() + ORPHAN_DRAIN_GRACE, |s| s.deadline);
		tasks.abort_all();
		let drained = tokio::time::timeout_at(deadline.into(), async {
			while tasks.join_next().await.is_some() {}
		})
		.await
		.is_ok();
		if !drained {
			warn!(
				target = "bridge.scheduler",
				remaining = tasks.len(),
				"cancelled operations did not unwind before the shutdown deadline"
			);
		}
		debug!(target = "bridge.scheduler", cancelled, drained, "outstanding operations cancelled");

		if let Some(stop) = stop {
			let hooks_run = run_hooks(stop.hooks);
			let _ = stop.ack.send(DrainReport {
				cancelled,
				drained,
				hooks_run,
			});
		}
		deadline
	});

	runtime.shutdown_timeout(deadline.saturating_duration_since(Instant::now()));
	info!(target = "bridge.scheduler", "scheduler loop stopped");
}

fn run_hooks(hooks: Vec<Hook>) -> usize {
	let count = hooks.len();
	for hook in hooks {
		hook();
	}
	count
}

/// Handle to an operation submitted with [`Scheduler::submit`].
///
/// Dropping the handle detaches the operation; it keeps running.
#[must_use = "dropping a TaskHandle detaches the operation"]
pub struct TaskHandle<T> {
	result: Receiver<T>,
}

impl<T> TaskHandle<T> {
	/// Blocks the calling thread until the operation completes or `timeout`
	/// elapses. A timeout leaves the operation running.
	pub fn wait(self, timeout: Duration) -> Result<T> {
		match self.result.recv_timeout(timeout) {
			Ok(value) => Ok(value),
			Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
				label: "scheduled operation".to_string(),
				waited: timeout,
			}),
			Err(RecvTimeoutError::Disconnected) => Err(Error::Cancelled),
		}
	}

	/// Like [`TaskHandle::wait`], but also gives up once `cutoff` passes, even
	/// if the cutoff is set while this call is already blocked.
	pub fn wait_capped(self, timeout: Duration, cutoff: &Cutoff) -> Result<T> {
		let started = Instant::now();
		let own = started + timeout;
		loop {
			let (deadline, changed) = cutoff.watch(own);
			let remaining = deadline.saturating_duration_since(Instant::now());
			let settled = select! {
				recv(self.result) -> output => Some(output.map_err(|_| Error::Cancelled)),
				// the cutoff moved; re-check the deadline
				recv(changed) -> _ => None,
				default(remaining) => Some(Err(Error::Timeout {
					label: "scheduled operation".to_string(),
					waited: started.elapsed(),
				})),
			};
			if let Some(result) = settled {
				return result;
			}
		}
	}

	/// Returns the result if the operation has already completed.
	pub fn try_take(&self) -> Option<Result<T>> {
		match self.result.try_recv() {
			Ok(value) => Some(Ok(value)),
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Disconnected) => Some(Err(Error::Cancelled)),
		}
	}
}

/// Owner of the single scheduler/worker pair.
pub struct Scheduler {
	config: SchedulerConfig,
	worker: RwLock<Option<Worker>>,
	hooks: Mutex<Vec<Hook>>,
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new(SchedulerConfig::default())
	}
}

impl Scheduler {
	pub fn new(config: SchedulerConfig) -> Self {
		Self {
			config,
			worker: RwLock::new(None),
			hooks: Mutex::new(Vec::new()),
		}
	}

	/// Starts the worker if none is alive and waits for its loop to run.
	///
	/// Idempotent: with a live worker this only confirms readiness. A worker
	/// found dead is replaced.
	pub fn ensure_started(&self) -> Result<()> {
		let readiness = {
			let mut slot = self.worker.write();
			if let Some(worker) = slot.as_ref().filter(|w| w.is_alive()) {
				worker.readiness.clone()
			} else {
				if slot.take().is_some() {
					warn!(target = "bridge.scheduler", "scheduler worker exited unexpectedly; replacing it");
				}
				let worker = Worker::spawn(&self.config)?;
				info!(
					target = "bridge.scheduler",
					thread = %self.config.thread_name,
					"scheduler worker spawned"
				);
				let readiness = worker.readiness.clone();
				*slot = Some(worker);
				readiness
			}
		};
		readiness.wait(self.config.ready_timeout)
	}

	/// True while a worker loop is accepting work.
	pub fn is_running(&self) -> bool {
		self.worker.read().as_ref().is_some_and(Worker::is_running)
	}

	/// Schedules `operation` without a way to observe its result.
	pub fn spawn<F>(&self, operation: F) -> Result<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.send(Command::Spawn(Box::pin(operation)))
	}

	/// Schedules `operation` and returns a handle to wait for its output.
	pub fn submit<F>(&self, operation: F) -> Result<TaskHandle<F::Output>>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let (tx, rx) = bounded(1);
		self.spawn(async move {
			let output = operation.await;
			let _ = tx.send(output);
		})?;
		Ok(TaskHandle { result: rx })
	}

	/// Registers a hook that runs on the worker after outstanding operations
	/// have been cancelled during [`Scheduler::shutdown`].
	pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
		self.hooks.lock().push(Box::new(hook));
	}

	/// Stops the worker.
	///
	/// Cancellation, the stop acknowledgement and the thread join share one
	/// deadline `timeout` from now; only the acknowledgement and join may run
	/// on for another [`ACK_MARGIN`] while the hooks finish. A step that
	/// overruns is logged and skipped, never escalated.
	pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
		let Some(worker) = self.worker.write().take() else {
			debug!(target = "bridge.scheduler", "shutdown requested with no scheduler running");
			return ShutdownReport::default();
		};

		let mut report = ShutdownReport {
			was_running: true,
			..ShutdownReport::default()
		};

		let deadline = Instant::now() + timeout;
		let limit = deadline + ACK_MARGIN;
		let hooks = std::mem::take(&mut *self.hooks.lock());
		let (ack_tx, ack_rx) = bounded(1);
		let stop = StopRequest {
			deadline,
			hooks,
			ack: ack_tx,
		};

		match worker.commands.send(Command::Stop(stop)) {
			Ok(()) => match ack_rx.recv_deadline(limit) {
				Ok(drain) => {
					report.cancelled = drain.cancelled;
					report.drained = drain.drained;
					report.hooks_run = drain.hooks_run;
				}
				Err(_) => warn!(
					target = "bridge.scheduler",
					"scheduler did not acknowledge stop within {}ms",
					(timeout + ACK_MARGIN).as_millis()
				),
			},
			Err(mpsc::error::SendError(command)) => {
				warn!(target = "bridge.scheduler", "scheduler loop already gone before stop; running hooks here");
				if let Command::Stop(stop) = command {
					report.hooks_run = run_hooks(stop.hooks);
				}
			}
		}

		report.joined = worker.join(limit.saturating_duration_since(Instant::now()));
		info!(
			target = "bridge.scheduler",
			cancelled = report.cancelled,
			drained = report.drained,
			joined = report.joined,
			"scheduler shut down"
		);
		report
	}

	fn send(&self, command: Command) -> Result<()> {
		let slot = self.worker.read();
		let worker = slot
			.as_ref()
			.filter(|w| w.is_running())
			.ok_or(Error::Unavailable)?;
		worker.commands.send(command).map_err(|_| Error::Unavailable)
	}
}
