//! Session registry: owner of the single live engine instance.
//!
//! The registry creates the instance on the first connect, rebinds it when a
//! newer connection arrives and releases it when the designated session goes
//! away. Lifecycle transitions are serialized by one mutex; the instance slot
//! itself sits behind a separate lock that is only held for short reads and
//! writes, so streaming events keep flowing while a startup or stop wait is in
//! progress.
//!
//! Teardown closes the registry for good. Lifecycle waits already in flight
//! are cut short at the teardown's deadline, so a slow disconnect never holds
//! process exit past it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_protocol::SessionId;
use bridge_runtime::{Cutoff, Dispatcher};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::engine::{BoundSession, Engine, EngineFactory};
use crate::error::{Error, Result};

/// The live engine together with its bound-session cell.
#[derive(Clone)]
pub struct LiveEngine {
	engine: Arc<dyn Engine>,
	binding: BoundSession,
}

impl LiveEngine {
	pub fn engine(&self) -> &Arc<dyn Engine> {
		&self.engine
	}

	pub fn session(&self) -> SessionId {
		self.binding.get()
	}
}

impl std::fmt::Debug for LiveEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LiveEngine")
			.field("session", &self.binding.get())
			.finish_non_exhaustive()
	}
}

/// Time teardown grants an interrupted lifecycle operation to unwind after
/// the teardown deadline.
const HANDOVER_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
	/// A new instance was constructed and started for the session.
	Created,
	/// The existing instance now serves the session.
	Rebound { previous: SessionId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
	/// The designated session left; the instance was stopped and removed.
	Released { stopped_cleanly: bool },
	/// The instance is bound to another session and was left alone.
	NotDesignated { bound: SessionId },
	NoInstance,
}

pub struct Registry {
	config: BridgeConfig,
	dispatcher: Dispatcher,
	factory: Arc<dyn EngineFactory>,
	lifecycle: Mutex<()>,
	slot: RwLock<Option<LiveEngine>>,
	closing: Cutoff,
	/// Outcome of a designated disconnect that finished after teardown began.
	handed_over: Mutex<Option<bool>>,
}

impl Registry {
	pub fn new(config: BridgeConfig, dispatcher: Dispatcher, factory: Arc<dyn EngineFactory>) -> Self {
		Self {
			config,
			dispatcher,
			factory,
			lifecycle: Mutex::new(()),
			slot: RwLock::new(None),
			closing: Cutoff::new(),
			handed_over: Mutex::new(None),
		}
	}

	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	/// Creates the engine for `session`, or rebinds the live one to it.
	///
	/// Creation starts the scheduler, constructs the instance and waits up to
	/// the startup timeout for `start_tasks`. A startup that fails or is
	/// cancelled removes the instance again; one that merely times out leaves
	/// it in place with its startup still running. Once the registry is
	/// closed every connect fails with an unavailable error.
	pub fn on_connect(&self, session: &SessionId) -> Result<ConnectOutcome> {
		let _lifecycle = self.lifecycle.lock();
		self.ensure_open(session)?;

		let existing = self.slot.read().clone();
		if let Some(live) = existing {
			let previous = live.binding.rebind(session.clone());
			info!(
				target = "bridge.registry",
				session = %session,
				previous = %previous,
				"assistant rebound to new session"
			);
			return Ok(ConnectOutcome::Rebound { previous });
		}

		self.dispatcher.scheduler().ensure_started()?;

		let binding = BoundSession::new(session.clone());
		let engine = self.factory.create(binding.clone()).inspect_err(|err| {
			warn!(target = "bridge.registry", session = %session, error = %err, "assistant construction failed");
		})?;
		// teardown may have given up waiting for this connect
		self.ensure_open(session)?;
		*self.slot.write() = Some(LiveEngine {
			engine: Arc::clone(&engine),
			binding,
		});
		info!(target = "bridge.registry", session = %session, "assistant created");

		let startup = self.dispatcher.bounded_wait_capped(
			"start_tasks",
			async move { engine.start_tasks().await },
			self.config.startup_timeout,
			&self.closing,
		);
		match startup {
			Ok(Ok(())) => {
				info!(target = "bridge.registry", session = %session, "assistant started");
				Ok(ConnectOutcome::Created)
			}
			Ok(Err(err)) => {
				self.slot.write().take();
				warn!(target = "bridge.registry", session = %session, error = %err, "assistant startup failed");
				Err(Error::Startup(err))
			}
			Err(err) if err.is_timeout() => {
				warn!(
					target = "bridge.registry",
					session = %session,
					error = %err,
					"assistant startup still running; keeping instance"
				);
				Err(err.into())
			}
			Err(err) => {
				self.slot.write().take();
				warn!(target = "bridge.registry", session = %session, error = %err, "assistant startup aborted");
				Err(err.into())
			}
		}
	}

	/// Stops and removes the instance if `session` is the designated one.
	pub fn on_disconnect(&self, session: &SessionId) -> DisconnectOutcome {
		let _lifecycle = self.lifecycle.lock();

		let Some(live) = self.current_instance() else {
			debug!(target = "bridge.registry", session = %session, "disconnect with no assistant");
			return DisconnectOutcome::NoInstance;
		};
		if !live.binding.is(session) {
			let bound = live.binding.get();
			debug!(
				target = "bridge.registry",
				session = %session,
				bound = %bound,
				"disconnect from non-designated session ignored"
			);
			return DisconnectOutcome::NotDesignated { bound };
		}

		let stopped_cleanly = self.stop(&live, self.config.disconnect_stop_timeout);
		self.slot.write().take();
		if self.is_closed() {
			*self.handed_over.lock() = Some(stopped_cleanly);
		}
		info!(target = "bridge.registry", session = %session, stopped_cleanly, "assistant released");
		DisconnectOutcome::Released { stopped_cleanly }
	}

	/// Closes the registry, then stops and clears whatever instance is live,
	/// whichever session it serves.
	///
	/// A startup or designated-disconnect stop already in flight is cut short
	/// at the same deadline, and a stop it began counts as this one. Returns
	/// `None` when there was nothing to tear down, otherwise whether the stop
	/// completed within `timeout`.
	pub fn teardown(&self, timeout: Duration) -> Option<bool> {
		let deadline = Instant::now() + timeout;
		self.closing.cut(deadline);

		let Some(_lifecycle) = self.lifecycle.try_lock_until(deadline + HANDOVER_GRACE) else {
			warn!(target = "bridge.registry", "lifecycle operation still running at teardown; clearing without it");
			return self.slot.write().take().map(|_| false);
		};

		let handed_over = self.handed_over.lock().take();
		let Some(live) = self.current_instance() else {
			return handed_over;
		};
		let stopped_cleanly = self.stop(&live, timeout);
		self.slot.write().take();
		info!(target = "bridge.registry", session = %live.session(), stopped_cleanly, "assistant torn down");
		Some(stopped_cleanly)
	}

	/// True once teardown has begun; no instance is created after that.
	pub fn is_closed(&self) -> bool {
		self.closing.is_cut()
	}

	pub fn current_instance(&self) -> Option<LiveEngine> {
		self.slot.read().clone()
	}

	pub fn is_bound_to(&self, session: &SessionId) -> bool {
		self.slot.read().as_ref().is_some_and(|live| live.binding.is(session))
	}

	pub fn bound_session(&self) -> Option<SessionId> {
		self.slot.read().as_ref().map(LiveEngine::session)
	}

	/// Returns the engine only if it is bound to `session`, checked under a
	/// single read of the slot.
	pub fn engine_for(&self, session: &SessionId) -> Result<Arc<dyn Engine>> {
		self.slot
			.read()
			.as_ref()
			.filter(|live| live.binding.is(session))
			.map(|live| Arc::clone(&live.engine))
			.ok_or_else(|| Error::SessionMismatch(session.clone()))
	}

	fn ensure_open(&self, session: &SessionId) -> Result<()> {
		if self.is_closed() {
			debug!(target = "bridge.registry", session = %session, "connect refused; registry closed");
			return Err(bridge_runtime::Error::Unavailable.into());
		}
		Ok(())
	}

	fn stop(&self, live: &LiveEngine, timeout: Duration) -> bool {
		let engine = Arc::clone(&live.engine);
		match self.dispatcher.bounded_wait_capped(
			"stop_tasks",
			async move { engine.stop_tasks().await },
			timeout,
			&self.closing,
		) {
			Ok(Ok(())) => true,
			Ok(Err(err)) => {
				warn!(target = "bridge.registry", error = %err, "assistant stop reported an error");
				false
			}
			Err(err) => {
				warn!(target = "bridge.registry", error = %err, "assistant stop did not complete");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests;
