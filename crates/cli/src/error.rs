use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Reasons a websocket upgrade is refused before it reaches the bridge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
	#[error("origin not allowed: {0}")]
	Origin(String),

	#[error("missing or invalid key")]
	Key,
}

impl Rejection {
	pub fn status(&self) -> StatusCode {
		match self {
			Rejection::Origin(_) => StatusCode::FORBIDDEN,
			Rejection::Key => StatusCode::UNAUTHORIZED,
		}
	}
}

impl IntoResponse for Rejection {
	fn into_response(self) -> Response {
		(self.status(), self.to_string()).into_response()
	}
}
