//! Bridge Runtime - dedicated-thread scheduler and cross-thread dispatch
//!
//! Engine work runs on a cooperative scheduler that owns one OS thread. The
//! transport side runs elsewhere and only ever talks to it through this crate:
//!
//! - **Scheduler**: lazy start with an explicit readiness signal, ordered
//!   submission, cancellation and bounded teardown
//! - **Dispatcher**: fire-and-forget and bounded-wait call shapes
//! - **Cutoff**: a deadline pulled in from another thread, so teardown can
//!   cut short waits that are already blocked
//!
//! ```text
//! transport threads ──submit──▶ command channel ──▶ ┌───────────────────┐
//!                                                   │ bridge-scheduler  │
//!         ◀──── TaskHandle::wait(timeout) ───────── │ current-thread rt │
//!                                                   └───────────────────┘
//! ```

pub mod cutoff;
pub mod dispatch;
pub mod error;
pub mod scheduler;

pub use cutoff::Cutoff;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use scheduler::{
	ACK_MARGIN, DEFAULT_READY_TIMEOUT, DEFAULT_THREAD_NAME, Scheduler, SchedulerConfig, ShutdownReport,
	TaskHandle,
};
