//! Interfaces the bridge consumes from the assistant engine and the transport.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::{ServerEvent, SessionId};
use parking_lot::RwLock;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by an engine operation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
	#[error("{0}")]
	Failed(String),

	/// The engine's tasks are not running.
	#[error("engine is not running")]
	Closed,
}

/// Failure to construct an engine instance.
#[derive(Debug, Clone, Error)]
pub enum ConstructionError {
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("resource unavailable: {0}")]
	Resource(String),
}

/// The session an engine instance currently serves.
///
/// Shared between the registry, which rebinds it on reconnect, and the engine,
/// which reads it whenever it addresses output.
#[derive(Debug, Clone)]
pub struct BoundSession(Arc<RwLock<SessionId>>);

impl BoundSession {
	pub fn new(session: SessionId) -> Self {
		Self(Arc::new(RwLock::new(session)))
	}

	pub fn get(&self) -> SessionId {
		self.0.read().clone()
	}

	pub fn is(&self, session: &SessionId) -> bool {
		*self.0.read() == *session
	}

	/// Replaces the bound session, returning the previous one.
	pub fn rebind(&self, session: SessionId) -> SessionId {
		std::mem::replace(&mut *self.0.write(), session)
	}
}

/// The assistant engine. Every async method runs on the bridge's scheduler
/// thread.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
	/// Spawns the engine's long-running tasks and returns once it is ready to
	/// take input.
	async fn start_tasks(&self) -> EngineResult<()>;

	/// Stops every task started by [`Engine::start_tasks`].
	async fn stop_tasks(&self) -> EngineResult<()>;

	async fn process_input(&self, text: String, end_of_turn: bool) -> EngineResult<()>;

	async fn process_video_frame(&self, frame_data_url: String) -> EngineResult<()>;

	async fn clear_video_queue(&self) -> EngineResult<()>;
}

/// Builds engine instances. Called on a transport thread.
pub trait EngineFactory: Send + Sync {
	fn create(&self, session: BoundSession) -> Result<Arc<dyn Engine>, ConstructionError>;
}

/// Outbound primitive of the session transport.
pub trait Emitter: Send + Sync {
	fn emit(&self, session: &SessionId, event: ServerEvent);
}
