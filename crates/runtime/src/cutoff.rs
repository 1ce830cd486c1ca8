//! Deadline that another thread can pull in while bounded waits are running.

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

struct State {
	at: Option<Instant>,
	/// Dropped and replaced on every cut; waiters watch the receiver side.
	_wake: Sender<()>,
	changed: Receiver<()>,
}

impl State {
	fn new(at: Option<Instant>) -> Self {
		let (wake, changed) = bounded(0);
		Self {
			at,
			_wake: wake,
			changed,
		}
	}
}

/// Caps bounded waits at a deadline chosen later, from another thread.
///
/// Until [`Cutoff::cut`] is called it has no effect. Every waiter blocked in
/// [`crate::TaskHandle::wait_capped`] when it fires wakes up and re-checks its
/// deadline.
pub struct Cutoff {
	state: Mutex<State>,
}

impl Default for Cutoff {
	fn default() -> Self {
		Self {
			state: Mutex::new(State::new(None)),
		}
	}
}

impl Cutoff {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the cutoff to `at`. An earlier cutoff already in place wins.
	pub fn cut(&self, at: Instant) {
		let mut state = self.state.lock();
		let at = state.at.map_or(at, |current| current.min(at));
		// replacing the state drops the old sender, which wakes every waiter
		*state = State::new(Some(at));
	}

	pub fn is_cut(&self) -> bool {
		self.state.lock().at.is_some()
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.state.lock().at
	}

	/// The earlier of `deadline` and the cutoff, plus a receiver that
	/// disconnects when the cutoff moves.
	pub(crate) fn watch(&self, deadline: Instant) -> (Instant, Receiver<()>) {
		let state = self.state.lock();
		let capped = state.at.map_or(deadline, |at| at.min(deadline));
		(capped, state.changed.clone())
	}
}
