//! Session lifecycle and cross-thread dispatch for a single assistant engine.
//!
//! The transport delivers events on its own threads; the engine lives on a
//! cooperative scheduler with a dedicated worker thread. This crate sits in
//! between:
//!
//! - [`Registry`] - exactly one engine instance, bound to one designated session
//! - [`Router`] - maps transport events onto registry calls and engine work
//! - [`ShutdownCoordinator`] - one bounded teardown at process exit
//! - [`Bridge`] - owns all of the above and wires them to one scheduler
//!
//! ```ignore
//! let bridge = Bridge::new(BridgeConfig::default(), factory, emitter);
//! bridge.route(&session, InboundEvent::Connect);
//! bridge.route(&session, ClientEvent::parse(frame)?.into());
//! bridge.shutdown();
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod router;
pub mod shutdown;
pub mod testing;

use std::sync::Arc;

use bridge_protocol::SessionId;
use bridge_runtime::{Dispatcher, Scheduler};

pub use bridge_protocol::{ClientEvent, ServerEvent};
pub use config::BridgeConfig;
pub use engine::{BoundSession, ConstructionError, Emitter, Engine, EngineError, EngineFactory, EngineResult};
pub use error::{Error, Result};
pub use registry::{ConnectOutcome, DisconnectOutcome, LiveEngine, Registry};
pub use router::{InboundEvent, Routed, Router};
pub use shutdown::{ShutdownCoordinator, ShutdownSummary};

/// The wired-up bridge. Dropping it runs the shutdown sequence if nobody did.
pub struct Bridge {
	registry: Arc<Registry>,
	router: Router,
	coordinator: ShutdownCoordinator,
}

impl Bridge {
	pub fn new(config: BridgeConfig, factory: Arc<dyn EngineFactory>, emitter: Arc<dyn Emitter>) -> Self {
		let scheduler = Arc::new(Scheduler::new(config.scheduler()));
		let dispatcher = Dispatcher::new(scheduler);
		let (stop_timeout, join_timeout) = (config.shutdown_stop_timeout, config.worker_join_timeout);
		let registry = Arc::new(Registry::new(config, dispatcher, factory));
		Self {
			router: Router::new(Arc::clone(&registry), emitter),
			coordinator: ShutdownCoordinator::new(Arc::clone(&registry), stop_timeout, join_timeout),
			registry,
		}
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn router(&self) -> &Router {
		&self.router
	}

	pub fn route(&self, session: &SessionId, event: InboundEvent) -> Routed {
		self.router.route(session, event)
	}

	/// Runs the shutdown sequence once; later calls return `None`.
	pub fn shutdown(&self) -> Option<ShutdownSummary> {
		self.coordinator.run()
	}
}

impl Drop for Bridge {
	fn drop(&mut self) {
		self.coordinator.run();
	}
}
