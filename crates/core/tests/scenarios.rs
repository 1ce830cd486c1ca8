//! End-to-end lifecycle scenarios driven through the `Bridge` facade.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bridge::testing::{Call, FakeFactory, RecordingEmitter};
use bridge::{
	Bridge, BridgeConfig, ClientEvent, ConnectOutcome, DisconnectOutcome, InboundEvent, Routed,
	ServerEvent,
};
use bridge_protocol::{SessionId, TextMessage};

fn build(factory: FakeFactory, config: BridgeConfig) -> (Bridge, Arc<FakeFactory>, Arc<RecordingEmitter>) {
	let factory = Arc::new(factory);
	let emitter = Arc::new(RecordingEmitter::new());
	let bridge = Bridge::new(config, Arc::clone(&factory) as _, Arc::clone(&emitter) as _);
	(bridge, factory, emitter)
}

fn text(message: &str) -> InboundEvent {
	ClientEvent::SendTextMessage(TextMessage {
		message: message.to_string(),
	})
	.into()
}

#[test]
fn concurrent_connects_construct_one_instance() {
	let (bridge, factory, _emitter) = build(FakeFactory::new(), BridgeConfig::default());
	let bridge = Arc::new(bridge);

	let handles: Vec<_> = (0..8)
		.map(|i| {
			let bridge = Arc::clone(&bridge);
			thread::spawn(move || bridge.route(&SessionId::new(format!("s{i}")), InboundEvent::Connect))
		})
		.collect();
	let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

	let created = outcomes
		.iter()
		.filter(|routed| matches!(routed, Routed::Connected(ConnectOutcome::Created)))
		.count();
	assert_eq!(created, 1);
	assert_eq!(factory.constructions(), 1);
	assert!(bridge.registry().current_instance().is_some());
	bridge.shutdown();
}

#[test]
fn scenario_a_rebind_then_release() {
	let (bridge, factory, emitter) = build(FakeFactory::new(), BridgeConfig::default());
	let s1 = SessionId::from("s1");
	let s2 = SessionId::from("s2");

	assert!(matches!(bridge.route(&s1, InboundEvent::Connect), Routed::Connected(ConnectOutcome::Created)));
	assert_eq!(bridge.registry().bound_session(), Some(s1.clone()));

	match bridge.route(&s2, InboundEvent::Connect) {
		Routed::Connected(ConnectOutcome::Rebound { previous }) => assert_eq!(previous, s1),
		other => panic!("expected rebind, got {other:?}"),
	}
	assert_eq!(factory.constructions(), 1);
	assert_eq!(bridge.registry().bound_session(), Some(s2.clone()));

	assert!(matches!(
		bridge.route(&s1, InboundEvent::Disconnect),
		Routed::Disconnected(DisconnectOutcome::NotDesignated { .. })
	));
	assert!(bridge.registry().current_instance().is_some());
	assert!(!factory.last().unwrap().calls().contains(&Call::Stop));

	assert!(matches!(
		bridge.route(&s2, InboundEvent::Disconnect),
		Routed::Disconnected(DisconnectOutcome::Released { stopped_cleanly: true })
	));
	assert!(bridge.registry().current_instance().is_none());

	assert_eq!(emitter.events_for(&s1), vec![ServerEvent::status("Connected to assistant")]);
	assert_eq!(emitter.events_for(&s2), vec![ServerEvent::status("Connected to assistant")]);
	bridge.shutdown();
}

#[test]
fn scenario_b_only_designated_text_is_forwarded() {
	let (bridge, factory, emitter) = build(FakeFactory::new(), BridgeConfig::default());
	let s1 = SessionId::from("s1");
	let s2 = SessionId::from("s2");
	bridge.route(&s1, InboundEvent::Connect);
	bridge.route(&s2, InboundEvent::Connect);

	assert!(matches!(bridge.route(&s2, text("hello")), Routed::Forwarded));
	assert!(matches!(bridge.route(&s1, text("hi")), Routed::Mismatch));

	let engine = factory.last().unwrap();
	assert!(engine.wait_for_calls(2, Duration::from_secs(1)));
	thread::sleep(Duration::from_millis(50));
	assert_eq!(
		engine.calls(),
		vec![
			Call::Start,
			Call::Input {
				text: "hello".into(),
				end_of_turn: true
			}
		]
	);
	assert_eq!(
		emitter.events_for(&s1).last(),
		Some(&ServerEvent::error("Assistant not ready or session mismatch."))
	);
	bridge.shutdown();
}

#[test]
fn scenario_c_slow_stop_bounded_by_timeouts() {
	let config = BridgeConfig {
		shutdown_stop_timeout: Duration::from_millis(150),
		worker_join_timeout: Duration::from_millis(500),
		..BridgeConfig::default()
	};
	let bound = config.shutdown_stop_timeout + config.worker_join_timeout;
	let (bridge, _factory, _emitter) = build(FakeFactory::new().with_stop_delay(Duration::from_secs(10)), config);
	bridge.route(&SessionId::from("s1"), InboundEvent::Connect);

	let started = Instant::now();
	let summary = bridge.shutdown().unwrap();

	assert!(started.elapsed() < bound, "shutdown took {:?}", started.elapsed());
	assert_eq!(summary.engine, Some(false));
	assert!(summary.scheduler.joined);
	assert!(bridge.shutdown().is_none(), "second shutdown is a no-op");
}

#[test]
fn scenario_c_holds_while_the_designated_client_disconnects() {
	let config = BridgeConfig {
		disconnect_stop_timeout: Duration::from_secs(3),
		shutdown_stop_timeout: Duration::from_millis(100),
		worker_join_timeout: Duration::from_millis(200),
		..BridgeConfig::default()
	};
	let bound = config.shutdown_stop_timeout + config.worker_join_timeout;
	let (bridge, factory, _emitter) = build(FakeFactory::new().with_stop_delay(Duration::from_secs(30)), config);
	let bridge = Arc::new(bridge);
	let s1 = SessionId::from("s1");
	bridge.route(&s1, InboundEvent::Connect);

	let disconnecting = {
		let bridge = Arc::clone(&bridge);
		thread::spawn(move || bridge.route(&s1, InboundEvent::Disconnect))
	};
	assert!(factory.last().unwrap().wait_for_calls(2, Duration::from_secs(1)), "stop never began");

	let started = Instant::now();
	let summary = bridge.shutdown().unwrap();

	assert!(started.elapsed() < bound, "shutdown took {:?}", started.elapsed());
	assert_eq!(summary.engine, Some(false), "the slow stop must not be hidden");
	assert!(summary.scheduler.joined);
	assert!(matches!(
		disconnecting.join().unwrap(),
		Routed::Disconnected(DisconnectOutcome::Released { stopped_cleanly: false })
	));
}

#[test]
fn connect_after_shutdown_is_refused() {
	let (bridge, factory, emitter) = build(FakeFactory::new(), BridgeConfig::default());
	bridge.route(&SessionId::from("s1"), InboundEvent::Connect);
	bridge.shutdown().unwrap();

	let s2 = SessionId::from("s2");
	match bridge.route(&s2, InboundEvent::Connect) {
		Routed::Failed(err) => assert!(err.is_unavailable(), "expected unavailable, got {err:?}"),
		other => panic!("expected refusal, got {other:?}"),
	}
	assert_eq!(factory.constructions(), 1);
	assert!(!bridge.registry().dispatcher().is_ready(), "no worker may outlive shutdown");
	assert_eq!(
		emitter.events_for(&s2),
		vec![ServerEvent::error("Assistant initialization error (scheduler unavailable).")]
	);
}

#[test]
fn text_before_any_connect_fails_fast() {
	let (bridge, _factory, emitter) = build(FakeFactory::new(), BridgeConfig::default());
	let s1 = SessionId::from("s1");

	let started = Instant::now();
	assert!(matches!(bridge.route(&s1, text("early")), Routed::Mismatch));
	assert!(started.elapsed() < Duration::from_millis(100));
	assert!(!bridge.registry().dispatcher().is_ready());
	assert_eq!(emitter.events_for(&s1).len(), 1);
}

#[test]
fn dropping_bridge_stops_engine() {
	let (bridge, factory, _emitter) = build(FakeFactory::new(), BridgeConfig::default());
	bridge.route(&SessionId::from("s1"), InboundEvent::Connect);
	let dispatcher = bridge.registry().dispatcher().clone();

	drop(bridge);

	assert_eq!(factory.last().unwrap().calls(), vec![Call::Start, Call::Stop]);
	assert!(!dispatcher.is_ready());
}
