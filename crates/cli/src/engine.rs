//! Loopback assistant engine.
//!
//! Stands in for the real assistant so the server runs end to end: every
//! completed turn is answered with a `receive_text_chunk` echo addressed to
//! whichever session is bound when the reply goes out. Video frames are
//! validated and kept in a bounded queue, oldest dropped first.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bridge::{BoundSession, ConstructionError, Emitter, Engine, EngineError, EngineFactory, EngineResult, ServerEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const FRAME_PREFIX: &str = "data:image/";
const FRAME_ENCODING: &str = ";base64,";

/// One completed user turn handed to the reply task.
#[derive(Debug)]
struct Turn {
	text: String,
	frames_in_view: usize,
}

pub struct LoopbackEngine {
	session: BoundSession,
	emitter: Arc<dyn Emitter>,
	capacity: usize,
	frames: Mutex<VecDeque<String>>,
	partial: Mutex<String>,
	turns: Mutex<Option<mpsc::UnboundedSender<Turn>>>,
	reply: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackEngine {
	fn new(session: BoundSession, emitter: Arc<dyn Emitter>, capacity: usize) -> Self {
		Self {
			session,
			emitter,
			capacity,
			frames: Mutex::new(VecDeque::with_capacity(capacity)),
			partial: Mutex::new(String::new()),
			turns: Mutex::new(None),
			reply: Mutex::new(None),
		}
	}

	pub fn queued_frames(&self) -> usize {
		self.frames.lock().len()
	}

	pub fn is_running(&self) -> bool {
		self.turns.lock().is_some()
	}
}

fn reply_text(turn: &Turn) -> String {
	match turn.frames_in_view {
		0 => format!("You said: {}", turn.text),
		1 => format!("You said: {} (1 frame in view)", turn.text),
		n => format!("You said: {} ({n} frames in view)", turn.text),
	}
}

#[async_trait]
impl Engine for LoopbackEngine {
	async fn start_tasks(&self) -> EngineResult<()> {
		let mut turns = self.turns.lock();
		if turns.is_some() {
			return Ok(());
		}

		let (tx, mut rx) = mpsc::unbounded_channel::<Turn>();
		let session = self.session.clone();
		let emitter = Arc::clone(&self.emitter);
		let handle = tokio::spawn(async move {
			while let Some(turn) = rx.recv().await {
				let to = session.get();
				trace!(target = "bridge.loopback", session = %to, "replying");
				emitter.emit(&to, ServerEvent::ReceiveTextChunk { text: reply_text(&turn) });
			}
			debug!(target = "bridge.loopback", "reply task finished");
		});

		*turns = Some(tx);
		*self.reply.lock() = Some(handle);
		debug!(target = "bridge.loopback", session = %self.session.get(), "loopback engine started");
		Ok(())
	}

	async fn stop_tasks(&self) -> EngineResult<()> {
		self.turns.lock().take();
		let reply = self.reply.lock().take();
		if let Some(reply) = reply {
			reply.await.map_err(|err| EngineError::Failed(err.to_string()))?;
		}
		Ok(())
	}

	async fn process_input(&self, text: String, end_of_turn: bool) -> EngineResult<()> {
		let text = {
			let mut partial = self.partial.lock();
			partial.push_str(&text);
			if !end_of_turn {
				return Ok(());
			}
			std::mem::take(&mut *partial)
		};
		if text.trim().is_empty() {
			return Ok(());
		}

		let turn = Turn {
			text,
			frames_in_view: self.queued_frames(),
		};
		let turns = self.turns.lock();
		let tx = turns.as_ref().ok_or(EngineError::Closed)?;
		tx.send(turn).map_err(|_| EngineError::Closed)
	}

	async fn process_video_frame(&self, frame_data_url: String) -> EngineResult<()> {
		let valid = frame_data_url
			.strip_prefix(FRAME_PREFIX)
			.and_then(|rest| rest.split_once(FRAME_ENCODING))
			.is_some_and(|(mime, payload)| !mime.is_empty() && !payload.is_empty());
		if !valid {
			return Err(EngineError::Failed("frame is not a base64 image data URL".to_string()));
		}

		let mut frames = self.frames.lock();
		while frames.len() >= self.capacity {
			frames.pop_front();
		}
		frames.push_back(frame_data_url);
		Ok(())
	}

	async fn clear_video_queue(&self) -> EngineResult<()> {
		self.frames.lock().clear();
		Ok(())
	}
}

impl Drop for LoopbackEngine {
	fn drop(&mut self) {
		if let Some(reply) = self.reply.get_mut().take() {
			reply.abort();
		}
	}
}

/// Builds [`LoopbackEngine`]s that reply through `emitter`.
pub struct LoopbackFactory {
	emitter: Arc<dyn Emitter>,
	frame_queue_capacity: usize,
}

impl LoopbackFactory {
	pub fn new(emitter: Arc<dyn Emitter>, frame_queue_capacity: usize) -> Self {
		Self {
			emitter,
			frame_queue_capacity,
		}
	}
}

impl EngineFactory for LoopbackFactory {
	fn create(&self, session: BoundSession) -> Result<Arc<dyn Engine>, ConstructionError> {
		if self.frame_queue_capacity == 0 {
			return Err(ConstructionError::InvalidConfig(
				"frame queue capacity must be at least 1".to_string(),
			));
		}
		Ok(Arc::new(LoopbackEngine::new(
			session,
			Arc::clone(&self.emitter),
			self.frame_queue_capacity,
		)))
	}
}
