//! Wire types for the assistant bridge.
//!
//! The transport speaks JSON text frames of the form
//! `{"event": "<name>", "data": {...}}` in both directions.
//!
//! - [`SessionId`] - transport-assigned identifier of one remote connection
//! - [`ClientEvent`] - events sent by the browser client
//! - [`ServerEvent`] - events emitted back to a specific session

pub mod events;
pub mod session;

pub use events::{ClientEvent, ServerEvent, TextMessage, Transcript, VideoFrame};
pub use session::SessionId;
