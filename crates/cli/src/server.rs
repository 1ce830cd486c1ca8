//! Websocket transport.
//!
//! Each websocket connection becomes one session with a fresh UUID. Connect
//! and disconnect are routed on the blocking pool because they wait on the
//! scheduler; client frames are routed inline since dispatching them never
//! blocks. Outbound events go through [`Clients`], the bridge's emitter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::Response;
use axum::routing::get;
use bridge::{Bridge, ClientEvent, Emitter, EngineFactory, InboundEvent, ServerEvent, ShutdownSummary};
use bridge_protocol::SessionId;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::engine::LoopbackFactory;
use crate::error::Rejection;

/// Outbound queues of the connected websocket clients, keyed by session.
#[derive(Default)]
pub struct Clients {
	senders: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
}

impl Clients {
	fn register(&self, session: SessionId) -> mpsc::UnboundedReceiver<Message> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.senders.write().insert(session, tx);
		rx
	}

	fn unregister(&self, session: &SessionId) {
		self.senders.write().remove(session);
	}

	pub fn len(&self) -> usize {
		self.senders.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.senders.read().is_empty()
	}
}

impl Emitter for Clients {
	fn emit(&self, session: &SessionId, event: ServerEvent) {
		let frame = match event.encode() {
			Ok(frame) => frame,
			Err(err) => {
				warn!(target = "bridge.server", session = %session, error = %err, "failed to encode event");
				return;
			}
		};
		let senders = self.senders.read();
		let Some(tx) = senders.get(session) else {
			debug!(target = "bridge.server", session = %session, "no client for session; event dropped");
			return;
		};
		if tx.send(Message::Text(frame.into())).is_err() {
			debug!(target = "bridge.server", session = %session, "client outbound queue closed");
		}
	}
}

#[derive(Clone)]
struct AppState {
	bridge: Arc<Bridge>,
	clients: Arc<Clients>,
	config: Arc<ServerConfig>,
	shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
	key: Option<String>,
}

/// The bridge, its websocket clients and the loopback engine, wired together.
pub struct Server {
	state: AppState,
	shutdown: watch::Sender<bool>,
}

impl Server {
	pub fn new(config: ServerConfig) -> Self {
		let capacity = config.frame_queue_capacity;
		Self::with_factory(config, move |emitter| {
			Arc::new(LoopbackFactory::new(emitter, capacity)) as Arc<dyn EngineFactory>
		})
	}

	/// Like [`Server::new`], with the engine factory built by `factory` from
	/// the server's emitter.
	pub fn with_factory(
		config: ServerConfig,
		factory: impl FnOnce(Arc<dyn Emitter>) -> Arc<dyn EngineFactory>,
	) -> Self {
		let clients = Arc::new(Clients::default());
		let emitter: Arc<dyn Emitter> = Arc::clone(&clients) as _;
		let factory = factory(Arc::clone(&emitter));
		let bridge = Arc::new(Bridge::new(config.bridge.clone(), factory, emitter));
		let (shutdown, shutdown_rx) = watch::channel(false);

		Self {
			state: AppState {
				bridge,
				clients,
				config: Arc::new(config),
				shutdown: shutdown_rx,
			},
			shutdown,
		}
	}

	pub fn bridge(&self) -> &Arc<Bridge> {
		&self.state.bridge
	}

	pub fn clients(&self) -> &Arc<Clients> {
		&self.state.clients
	}

	/// Sending `true` stops the server and closes every websocket.
	pub fn shutdown_handle(&self) -> watch::Sender<bool> {
		self.shutdown.clone()
	}

	/// Serves until the shutdown handle fires, then tears the bridge down.
	pub async fn run(self, listener: TcpListener) -> Result<Option<ShutdownSummary>> {
		let addr = listener.local_addr().context("Failed to read listener address")?;
		info!(target = "bridge.server", %addr, "listening");

		let mut stop = self.shutdown.subscribe();
		axum::serve(listener, app(self.state.clone()).into_make_service())
			.with_graceful_shutdown(async move { stopped(&mut stop).await })
			.await
			.context("Server error")?;

		let _ = self.shutdown.send(true);
		info!(target = "bridge.server", "transport stopped; shutting down bridge");
		let bridge = Arc::clone(&self.state.bridge);
		tokio::task::spawn_blocking(move || bridge.shutdown())
			.await
			.context("Bridge shutdown task failed")
	}
}

fn app(state: AppState) -> Router {
	let origins = state
		.config
		.allowed_origins
		.iter()
		.filter_map(|origin| HeaderValue::from_str(origin).ok())
		.collect::<Vec<_>>();
	let cors = CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET]);

	Router::new()
		.route("/", get(|| async { "OK" }))
		.route("/ws", get(ws_upgrade))
		.layer(cors)
		.with_state(state)
}

async fn ws_upgrade(
	ws: WebSocketUpgrade,
	headers: HeaderMap,
	Query(params): Query<ConnectParams>,
	State(state): State<AppState>,
) -> Result<Response, Rejection> {
	authorize(&state.config, &headers, params.key.as_deref()).inspect_err(|err| {
		warn!(target = "bridge.server", error = %err, "websocket upgrade refused");
	})?;
	Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

fn authorize(config: &ServerConfig, headers: &HeaderMap, key: Option<&str>) -> Result<(), Rejection> {
	if let Some(origin) = headers.get(header::ORIGIN) {
		let origin = origin.to_str().unwrap_or_default();
		if !config.origin_allowed(origin) {
			return Err(Rejection::Origin(origin.to_string()));
		}
	}
	if !config.key_accepted(key) {
		return Err(Rejection::Key);
	}
	Ok(())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
	let session = SessionId::new(Uuid::new_v4().to_string());
	let mut outbound = UnboundedReceiverStream::new(state.clients.register(session.clone()));
	let (mut ws_tx, mut ws_rx) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(msg) = outbound.next().await {
			if ws_tx.send(msg).await.is_err() {
				break;
			}
		}
		let _ = ws_tx.close().await;
	});

	info!(target = "bridge.server", session = %session, "client connected");
	route_lifecycle(&state.bridge, &session, InboundEvent::Connect).await;

	let mut shutdown = state.shutdown.clone();
	loop {
		tokio::select! {
			_ = stopped(&mut shutdown) => {
				debug!(target = "bridge.server", session = %session, "closing client for shutdown");
				break;
			}
			msg = ws_rx.next() => match msg {
				Some(Ok(Message::Text(text))) => route_frame(&state.bridge, &session, text.as_str()),
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					warn!(target = "bridge.server", session = %session, error = %err, "websocket error");
					break;
				}
			},
		}
	}

	route_lifecycle(&state.bridge, &session, InboundEvent::Disconnect).await;
	state.clients.unregister(&session);
	send_task.abort();
	info!(target = "bridge.server", session = %session, "client disconnected");
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Routes connect/disconnect on the blocking pool; both wait on the scheduler.
async fn route_lifecycle(bridge: &Arc<Bridge>, session: &SessionId, event: InboundEvent) {
	let bridge = Arc::clone(bridge);
	let owner = session.clone();
	match tokio::task::spawn_blocking(move || bridge.route(&owner, event)).await {
		Ok(routed) => debug!(target = "bridge.server", session = %session, ?routed, "lifecycle event routed"),
		Err(err) => warn!(target = "bridge.server", session = %session, error = %err, "lifecycle routing panicked"),
	}
}

fn route_frame(bridge: &Bridge, session: &SessionId, raw: &str) {
	match ClientEvent::parse(raw) {
		Ok(event) => {
			let name = event.name();
			let routed = bridge.route(session, event.into());
			trace!(target = "bridge.server", session = %session, event = name, ?routed, "frame routed");
		}
		Err(err) => warn!(target = "bridge.server", session = %session, error = %err, "ignoring malformed frame"),
	}
}

/// Resolves on SIGINT or SIGTERM with the signal's name.
#[cfg(unix)]
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
	let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
	Ok(async move {
		tokio::select! {
			_ = sigterm.recv() => "SIGTERM",
			_ = sigint.recv() => "SIGINT",
		}
	})
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
	Ok(async {
		let _ = tokio::signal::ctrl_c().await;
		"Ctrl+C"
	})
}
