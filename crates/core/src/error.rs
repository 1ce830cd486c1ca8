use bridge_protocol::SessionId;
use thiserror::Error;

use crate::engine::{ConstructionError, EngineError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The engine factory refused to build an instance. The registry stays empty.
	#[error("failed to initialize assistant: {0}")]
	Construction(#[from] ConstructionError),

	/// The instance was built but its startup operation failed.
	#[error("assistant startup failed: {0}")]
	Startup(#[source] EngineError),

	/// The event's session is not the one bound to the live instance.
	#[error("session {0} is not bound to the assistant")]
	SessionMismatch(SessionId),

	#[error(transparent)]
	Runtime(#[from] bridge_runtime::Error),
}

impl Error {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Runtime(err) if err.is_timeout())
	}

	pub fn is_unavailable(&self) -> bool {
		matches!(self, Error::Runtime(err) if err.is_unavailable())
	}

	/// Message shown to the end user when a connect fails.
	pub fn client_message(&self) -> String {
		match self {
			Error::Construction(err) => format!("Failed to initialize assistant: {err}"),
			Error::Startup(err) => format!("Assistant failed to start: {err}"),
			Error::SessionMismatch(_) => "Assistant not ready or session mismatch.".to_string(),
			Error::Runtime(err) if err.is_timeout() => "Assistant is taking too long to start.".to_string(),
			Error::Runtime(err) if err.is_unavailable() => {
				"Assistant initialization error (scheduler unavailable).".to_string()
			}
			Error::Runtime(err) => format!("Unexpected error initializing assistant: {err}"),
		}
	}
}
