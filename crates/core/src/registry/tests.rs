use std::time::{Duration, Instant};

use bridge_runtime::{DEFAULT_THREAD_NAME, Scheduler};

use super::*;
use crate::engine::{ConstructionError, EngineError};
use crate::testing::{Call, FakeFactory};

fn config() -> BridgeConfig {
	BridgeConfig {
		startup_timeout: Duration::from_millis(500),
		disconnect_stop_timeout: Duration::from_millis(500),
		..BridgeConfig::default()
	}
}

fn registry_with(config: BridgeConfig, factory: Arc<FakeFactory>) -> Registry {
	let scheduler = Arc::new(Scheduler::new(config.scheduler()));
	Registry::new(config, Dispatcher::new(scheduler), factory)
}

fn stop_scheduler(registry: &Registry) {
	registry.dispatcher().scheduler().shutdown(Duration::from_secs(1));
}

#[test]
fn first_connect_creates_and_starts_on_worker() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	let s1 = SessionId::from("s1");

	let outcome = registry.on_connect(&s1).unwrap();

	assert_eq!(outcome, ConnectOutcome::Created);
	assert_eq!(factory.constructions(), 1);
	assert!(registry.is_bound_to(&s1));
	assert_eq!(registry.bound_session(), Some(s1));
	let engine = factory.last().unwrap();
	assert_eq!(engine.calls(), vec![Call::Start]);
	assert_eq!(engine.threads(), vec![Some(DEFAULT_THREAD_NAME.to_string())]);
	stop_scheduler(&registry);
}

#[test]
fn second_connect_rebinds_without_restart() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	let s1 = SessionId::from("s1");
	let s2 = SessionId::from("s2");

	registry.on_connect(&s1).unwrap();
	let outcome = registry.on_connect(&s2).unwrap();

	assert_eq!(outcome, ConnectOutcome::Rebound { previous: s1.clone() });
	assert_eq!(factory.constructions(), 1);
	assert!(registry.is_bound_to(&s2));
	assert!(!registry.is_bound_to(&s1));
	let engine = factory.last().unwrap();
	assert_eq!(engine.session(), s2, "engine must see the new binding");
	assert_eq!(engine.calls(), vec![Call::Start]);
	stop_scheduler(&registry);
}

#[test]
fn refused_construction_leaves_registry_empty() {
	let factory = Arc::new(FakeFactory::new().refusing(ConstructionError::Resource("no api key".into())));
	let registry = registry_with(config(), Arc::clone(&factory));

	let err = registry.on_connect(&SessionId::from("s1")).unwrap_err();

	assert!(matches!(err, Error::Construction(ConstructionError::Resource(_))));
	assert!(err.client_message().starts_with("Failed to initialize assistant"));
	assert!(registry.current_instance().is_none());
	assert_eq!(factory.attempts(), 1);
	stop_scheduler(&registry);
}

#[test]
fn failed_startup_removes_instance() {
	let factory = Arc::new(FakeFactory::new().failing_start("upstream refused"));
	let registry = registry_with(config(), Arc::clone(&factory));

	let err = registry.on_connect(&SessionId::from("s1")).unwrap_err();

	assert!(matches!(err, Error::Startup(EngineError::Failed(ref msg)) if msg == "upstream refused"));
	assert!(registry.current_instance().is_none());
	stop_scheduler(&registry);
}

#[test]
fn startup_timeout_keeps_instance() {
	let factory = Arc::new(FakeFactory::new().with_start_delay(Duration::from_secs(2)));
	let registry = registry_with(
		BridgeConfig {
			startup_timeout: Duration::from_millis(50),
			..config()
		},
		Arc::clone(&factory),
	);
	let s1 = SessionId::from("s1");

	let started = Instant::now();
	let err = registry.on_connect(&s1).unwrap_err();

	assert!(err.is_timeout(), "expected timeout, got {err:?}");
	assert!(started.elapsed() < Duration::from_millis(500));
	assert!(registry.is_bound_to(&s1));
	stop_scheduler(&registry);
}

#[test]
fn disconnect_from_other_session_is_ignored() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	let s1 = SessionId::from("s1");
	registry.on_connect(&s1).unwrap();

	let outcome = registry.on_disconnect(&SessionId::from("s9"));

	assert_eq!(outcome, DisconnectOutcome::NotDesignated { bound: s1.clone() });
	assert!(registry.is_bound_to(&s1));
	assert!(!factory.last().unwrap().calls().contains(&Call::Stop));
	stop_scheduler(&registry);
}

#[test]
fn designated_disconnect_stops_and_releases() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	let s1 = SessionId::from("s1");
	registry.on_connect(&s1).unwrap();

	let outcome = registry.on_disconnect(&s1);

	assert_eq!(outcome, DisconnectOutcome::Released { stopped_cleanly: true });
	assert!(registry.current_instance().is_none());
	assert_eq!(factory.last().unwrap().calls(), vec![Call::Start, Call::Stop]);
	assert!(registry.dispatcher().is_ready(), "scheduler outlives the instance");
	stop_scheduler(&registry);
}

#[test]
fn slow_stop_still_releases_instance() {
	let factory = Arc::new(FakeFactory::new().with_stop_delay(Duration::from_secs(2)));
	let registry = registry_with(
		BridgeConfig {
			disconnect_stop_timeout: Duration::from_millis(50),
			..config()
		},
		Arc::clone(&factory),
	);
	let s1 = SessionId::from("s1");
	registry.on_connect(&s1).unwrap();

	let outcome = registry.on_disconnect(&s1);

	assert_eq!(outcome, DisconnectOutcome::Released { stopped_cleanly: false });
	assert!(registry.current_instance().is_none());
	stop_scheduler(&registry);
}

#[test]
fn disconnect_without_instance() {
	let registry = registry_with(config(), Arc::new(FakeFactory::new()));
	assert_eq!(registry.on_disconnect(&SessionId::from("s1")), DisconnectOutcome::NoInstance);
}

#[test]
fn engine_for_checks_binding() {
	let registry = registry_with(config(), Arc::new(FakeFactory::new()));
	let s1 = SessionId::from("s1");
	let s2 = SessionId::from("s2");

	assert!(matches!(registry.engine_for(&s1), Err(Error::SessionMismatch(_))));
	registry.on_connect(&s1).unwrap();
	assert!(registry.engine_for(&s1).is_ok());
	match registry.engine_for(&s2) {
		Err(Error::SessionMismatch(session)) => assert_eq!(session, s2),
		_ => panic!("expected session mismatch"),
	}
	stop_scheduler(&registry);
}

#[test]
fn teardown_with_nothing_live() {
	let registry = registry_with(config(), Arc::new(FakeFactory::new()));
	assert_eq!(registry.teardown(Duration::from_millis(100)), None);
	assert!(registry.is_closed());
}

#[test]
fn teardown_clears_any_binding() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	registry.on_connect(&SessionId::from("s1")).unwrap();
	registry.on_connect(&SessionId::from("s2")).unwrap();

	assert_eq!(registry.teardown(Duration::from_millis(500)), Some(true));
	assert!(registry.current_instance().is_none());
	assert_eq!(factory.last().unwrap().calls(), vec![Call::Start, Call::Stop]);
	stop_scheduler(&registry);
}

#[test]
fn connect_after_teardown_is_refused() {
	let factory = Arc::new(FakeFactory::new());
	let registry = registry_with(config(), Arc::clone(&factory));
	registry.on_connect(&SessionId::from("s1")).unwrap();
	assert_eq!(registry.teardown(Duration::from_millis(500)), Some(true));
	stop_scheduler(&registry);

	let err = registry.on_connect(&SessionId::from("s2")).unwrap_err();

	assert!(err.is_unavailable(), "expected unavailable, got {err:?}");
	assert_eq!(err.client_message(), "Assistant initialization error (scheduler unavailable).");
	assert_eq!(factory.attempts(), 1);
	assert!(registry.current_instance().is_none());
	assert!(!registry.dispatcher().is_ready(), "no worker may be started after teardown");
}

#[test]
fn teardown_takes_over_an_inflight_disconnect() {
	let factory = Arc::new(FakeFactory::new().with_stop_delay(Duration::from_secs(30)));
	let registry = Arc::new(registry_with(
		BridgeConfig {
			disconnect_stop_timeout: Duration::from_secs(3),
			..config()
		},
		Arc::clone(&factory),
	));
	let s1 = SessionId::from("s1");
	registry.on_connect(&s1).unwrap();

	let disconnecting = {
		let registry = Arc::clone(&registry);
		let s1 = s1.clone();
		std::thread::spawn(move || registry.on_disconnect(&s1))
	};
	assert!(factory.last().unwrap().wait_for_calls(2, Duration::from_secs(1)));

	let timeout = Duration::from_millis(100);
	let started = Instant::now();
	let torn_down = registry.teardown(timeout);
	let elapsed = started.elapsed();

	assert_eq!(torn_down, Some(false), "the slow stop must be reported");
	assert!(elapsed < timeout + HANDOVER_GRACE + Duration::from_millis(100), "took {elapsed:?}");
	assert_eq!(
		disconnecting.join().unwrap(),
		DisconnectOutcome::Released { stopped_cleanly: false }
	);
	assert!(registry.current_instance().is_none());
	assert_eq!(factory.last().unwrap().calls(), vec![Call::Start, Call::Stop]);
	stop_scheduler(&registry);
}

#[test]
fn teardown_cuts_short_an_inflight_startup() {
	let factory = Arc::new(FakeFactory::new().with_start_delay(Duration::from_secs(30)));
	let registry = Arc::new(registry_with(
		BridgeConfig {
			startup_timeout: Duration::from_secs(3),
			..config()
		},
		Arc::clone(&factory),
	));

	let connecting = {
		let registry = Arc::clone(&registry);
		std::thread::spawn(move || registry.on_connect(&SessionId::from("s1")))
	};
	let deadline = Instant::now() + Duration::from_secs(1);
	while factory.last().is_none_or(|engine| engine.calls().is_empty()) {
		assert!(Instant::now() < deadline, "startup never began");
		std::thread::sleep(Duration::from_millis(5));
	}

	let started = Instant::now();
	let torn_down = registry.teardown(Duration::from_millis(100));

	// the startup used up the whole budget; nothing is left for the stop
	assert_eq!(torn_down, Some(false));
	assert!(started.elapsed() < Duration::from_millis(500), "took {:?}", started.elapsed());
	assert!(connecting.join().unwrap().unwrap_err().is_timeout());
	assert!(registry.current_instance().is_none());
	stop_scheduler(&registry);
}
