//! Test doubles for the engine and transport seams.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bridge_protocol::{ServerEvent, SessionId};
use parking_lot::Mutex;

use crate::engine::{BoundSession, ConstructionError, Emitter, Engine, EngineError, EngineFactory, EngineResult};

/// One engine operation as observed by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Start,
	Stop,
	Input { text: String, end_of_turn: bool },
	VideoFrame(String),
	ClearVideoQueue,
}

#[derive(Debug, Clone, Default)]
struct Behavior {
	start_delay: Duration,
	stop_delay: Duration,
	start_error: Option<String>,
}

/// Engine that records every call together with the thread it ran on.
pub struct FakeEngine {
	binding: BoundSession,
	behavior: Behavior,
	calls: Mutex<Vec<(Call, Option<String>)>>,
}

impl FakeEngine {
	pub fn session(&self) -> SessionId {
		self.binding.get()
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().iter().map(|(call, _)| call.clone()).collect()
	}

	/// Names of the threads each call ran on, in call order.
	pub fn threads(&self) -> Vec<Option<String>> {
		self.calls.lock().iter().map(|(_, thread)| thread.clone()).collect()
	}

	/// Polls until at least `count` calls were recorded.
	pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		while self.calls.lock().len() < count {
			if Instant::now() >= deadline {
				return false;
			}
			std::thread::sleep(Duration::from_millis(5));
		}
		true
	}

	fn record(&self, call: Call) {
		let thread = std::thread::current().name().map(str::to_string);
		self.calls.lock().push((call, thread));
	}
}

#[async_trait]
impl Engine for FakeEngine {
	async fn start_tasks(&self) -> EngineResult<()> {
		self.record(Call::Start);
		if !self.behavior.start_delay.is_zero() {
			tokio::time::sleep(self.behavior.start_delay).await;
		}
		match &self.behavior.start_error {
			Some(message) => Err(EngineError::Failed(message.clone())),
			None => Ok(()),
		}
	}

	async fn stop_tasks(&self) -> EngineResult<()> {
		self.record(Call::Stop);
		if !self.behavior.stop_delay.is_zero() {
			tokio::time::sleep(self.behavior.stop_delay).await;
		}
		Ok(())
	}

	async fn process_input(&self, text: String, end_of_turn: bool) -> EngineResult<()> {
		self.record(Call::Input { text, end_of_turn });
		Ok(())
	}

	async fn process_video_frame(&self, frame_data_url: String) -> EngineResult<()> {
		self.record(Call::VideoFrame(frame_data_url));
		Ok(())
	}

	async fn clear_video_queue(&self) -> EngineResult<()> {
		self.record(Call::ClearVideoQueue);
		Ok(())
	}
}

/// Factory handing out [`FakeEngine`]s and counting constructions.
#[derive(Default)]
pub struct FakeFactory {
	behavior: Behavior,
	refuse: Option<ConstructionError>,
	attempts: AtomicUsize,
	engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_start_delay(mut self, delay: Duration) -> Self {
		self.behavior.start_delay = delay;
		self
	}

	pub fn with_stop_delay(mut self, delay: Duration) -> Self {
		self.behavior.stop_delay = delay;
		self
	}

	/// Engines built by this factory fail `start_tasks` with `message`.
	pub fn failing_start(mut self, message: impl Into<String>) -> Self {
		self.behavior.start_error = Some(message.into());
		self
	}

	/// Every construction is refused with `err`.
	pub fn refusing(mut self, err: ConstructionError) -> Self {
		self.refuse = Some(err);
		self
	}

	/// Construction attempts, including refused ones.
	pub fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}

	/// Engines actually constructed.
	pub fn constructions(&self) -> usize {
		self.engines.lock().len()
	}

	pub fn last(&self) -> Option<Arc<FakeEngine>> {
		self.engines.lock().last().cloned()
	}
}

impl EngineFactory for FakeFactory {
	fn create(&self, session: BoundSession) -> Result<Arc<dyn Engine>, ConstructionError> {
		self.attempts.fetch_add(1, Ordering::SeqCst);
		if let Some(err) = &self.refuse {
			return Err(err.clone());
		}
		let engine = Arc::new(FakeEngine {
			binding: session,
			behavior: self.behavior.clone(),
			calls: Mutex::new(Vec::new()),
		});
		self.engines.lock().push(Arc::clone(&engine));
		Ok(engine)
	}
}

/// Emitter that keeps every event it was asked to deliver.
#[derive(Default)]
pub struct RecordingEmitter {
	events: Mutex<Vec<(SessionId, ServerEvent)>>,
}

impl RecordingEmitter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<(SessionId, ServerEvent)> {
		self.events.lock().clone()
	}

	pub fn events_for(&self, session: &SessionId) -> Vec<ServerEvent> {
		self.events
			.lock()
			.iter()
			.filter(|(to, _)| to == session)
			.map(|(_, event)| event.clone())
			.collect()
	}

	pub fn clear(&self) {
		self.events.lock().clear();
	}
}

impl Emitter for RecordingEmitter {
	fn emit(&self, session: &SessionId, event: ServerEvent) {
		self.events.lock().push((session.clone(), event));
	}
}
