//! Event router: turns transport events into registry calls and engine work.
//!
//! Connect and disconnect go through the registry and may block the calling
//! thread for their bounded waits. Everything else is checked against the
//! bound session and handed to the scheduler fire-and-forget, in the order it
//! was delivered.

use std::future::Future;
use std::sync::Arc;

use bridge_protocol::{ClientEvent, ServerEvent, SessionId};
use tracing::{debug, info, trace, warn};

use crate::engine::{Emitter, EngineResult};
use crate::error::Error;
use crate::registry::{ConnectOutcome, DisconnectOutcome, Registry};

pub const CONNECTED_MESSAGE: &str = "Connected to assistant";
pub const MISMATCH_MESSAGE: &str = "Assistant not ready or session mismatch.";
pub const BUSY_MESSAGE: &str = "Assistant busy or scheduler error.";

/// One event delivered by the transport for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
	Connect,
	Disconnect,
	Client(ClientEvent),
}

impl From<ClientEvent> for InboundEvent {
	fn from(event: ClientEvent) -> Self {
		InboundEvent::Client(event)
	}
}

/// What the router did with an event.
#[derive(Debug)]
pub enum Routed {
	Connected(ConnectOutcome),
	Disconnected(DisconnectOutcome),
	/// Submitted to the engine.
	Forwarded,
	/// The sender is not the designated session; nothing was forwarded.
	Mismatch,
	/// Ignored: empty payload, or a silent-drop event with no scheduler.
	Dropped,
	Failed(Error),
}

#[derive(Clone)]
pub struct Router {
	registry: Arc<Registry>,
	emitter: Arc<dyn Emitter>,
}

impl Router {
	pub fn new(registry: Arc<Registry>, emitter: Arc<dyn Emitter>) -> Self {
		Self { registry, emitter }
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn route(&self, session: &SessionId, event: InboundEvent) -> Routed {
		match event {
			InboundEvent::Connect => self.connect(session),
			InboundEvent::Disconnect => Routed::Disconnected(self.registry.on_disconnect(session)),
			InboundEvent::Client(ClientEvent::SendTextMessage(msg)) => self.text_message(session, msg.message),
			InboundEvent::Client(ClientEvent::SendTranscribedText(t)) => self.transcript(session, t.transcript),
			InboundEvent::Client(ClientEvent::SendVideoFrame(frame)) => self.video_frame(session, frame.frame),
			InboundEvent::Client(ClientEvent::VideoFeedStopped) => self.video_feed_stopped(session),
		}
	}

	fn connect(&self, session: &SessionId) -> Routed {
		match self.registry.on_connect(session) {
			Ok(outcome) => {
				self.emitter.emit(session, ServerEvent::status(CONNECTED_MESSAGE));
				Routed::Connected(outcome)
			}
			Err(err) => {
				warn!(target = "bridge.router", session = %session, error = %err, "connect failed");
				self.emitter.emit(session, ServerEvent::error(err.client_message()));
				Routed::Failed(err)
			}
		}
	}

	fn text_message(&self, session: &SessionId, text: String) -> Routed {
		let engine = match self.registry.engine_for(session) {
			Ok(engine) => engine,
			Err(_) => {
				debug!(target = "bridge.router", session = %session, "text message from non-designated session");
				self.emitter.emit(session, ServerEvent::error(MISMATCH_MESSAGE));
				return Routed::Mismatch;
			}
		};
		match self.forward(session, "process_input", async move { engine.process_input(text, true).await }) {
			Ok(()) => Routed::Forwarded,
			Err(err) => {
				self.emitter.emit(session, ServerEvent::error(BUSY_MESSAGE));
				Routed::Failed(err)
			}
		}
	}

	fn transcript(&self, session: &SessionId, text: String) -> Routed {
		if text.is_empty() {
			debug!(target = "bridge.router", session = %session, "empty transcript ignored");
			return Routed::Dropped;
		}
		let engine = match self.registry.engine_for(session) {
			Ok(engine) => engine,
			Err(_) => {
				info!(target = "bridge.router", session = %session, "transcript from non-designated session ignored");
				return Routed::Mismatch;
			}
		};
		match self.forward(session, "process_input", async move { engine.process_input(text, true).await }) {
			Ok(()) => Routed::Forwarded,
			Err(err) => {
				self.emitter.emit(session, ServerEvent::error(BUSY_MESSAGE));
				Routed::Failed(err)
			}
		}
	}

	fn video_frame(&self, session: &SessionId, frame: Option<String>) -> Routed {
		let Some(frame) = frame.filter(|f| !f.is_empty()) else {
			return Routed::Dropped;
		};
		let Ok(engine) = self.registry.engine_for(session) else {
			trace!(target = "bridge.router", session = %session, "video frame dropped: not designated");
			return Routed::Mismatch;
		};
		match self.forward(session, "process_video_frame", async move {
			engine.process_video_frame(frame).await
		}) {
			Ok(()) => Routed::Forwarded,
			Err(err) => {
				trace!(target = "bridge.router", session = %session, error = %err, "video frame dropped");
				Routed::Dropped
			}
		}
	}

	fn video_feed_stopped(&self, session: &SessionId) -> Routed {
		let Ok(engine) = self.registry.engine_for(session) else {
			info!(target = "bridge.router", session = %session, "video feed stopped by non-designated session");
			return Routed::Mismatch;
		};
		match self.forward(session, "clear_video_queue", async move { engine.clear_video_queue().await }) {
			Ok(()) => Routed::Forwarded,
			Err(err) => {
				warn!(target = "bridge.router", session = %session, error = %err, "could not clear video queue");
				Routed::Dropped
			}
		}
	}

	/// Submits an engine operation fire-and-forget. Its own failure is only
	/// logged; the engine reports to the client itself.
	fn forward<F>(&self, session: &SessionId, label: &'static str, operation: F) -> Result<(), Error>
	where
		F: Future<Output = EngineResult<()>> + Send + 'static,
	{
		let owner = session.clone();
		self.registry
			.dispatcher()
			.fire_and_forget(label, async move {
				if let Err(err) = operation.await {
					debug!(target = "bridge.router", session = %owner, label, error = %err, "engine operation failed");
				}
			})
			.map_err(|err| {
				warn!(target = "bridge.router", session = %session, label, error = %err, "submission refused");
				Error::from(err)
			})
	}
}
