//! Event frames exchanged between the browser client and the bridge.
//!
//! Every frame is a JSON object with an `event` name and an optional `data`
//! payload, mirroring the named-event style of the client UI:
//!
//! 1. Client sends [`ClientEvent::SendTextMessage`] / [`ClientEvent::SendTranscribedText`]
//!    for user input, [`ClientEvent::SendVideoFrame`] for camera frames and
//!    [`ClientEvent::VideoFeedStopped`] when the camera turns off
//! 2. Bridge answers with [`ServerEvent::Status`] / [`ServerEvent::Error`]
//!    acknowledgements; the engine streams [`ServerEvent::ReceiveTextChunk`]

use serde::{Deserialize, Serialize};

/// Event sent from the browser client to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
	/// Text typed into the client's input box.
	SendTextMessage(TextMessage),
	/// Final transcript produced by the client's speech recognition.
	SendTranscribedText(Transcript),
	/// One camera frame encoded as a data URL.
	SendVideoFrame(VideoFrame),
	/// The client stopped its camera feed.
	VideoFeedStopped,
}

impl ClientEvent {
	/// Parses one text frame.
	pub fn parse(raw: &str) -> serde_json::Result<Self> {
		serde_json::from_str(raw)
	}

	/// Wire name of the event, used in log fields.
	pub fn name(&self) -> &'static str {
		match self {
			ClientEvent::SendTextMessage(_) => "send_text_message",
			ClientEvent::SendTranscribedText(_) => "send_transcribed_text",
			ClientEvent::SendVideoFrame(_) => "send_video_frame",
			ClientEvent::VideoFeedStopped => "video_feed_stopped",
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
	#[serde(default)]
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
	#[serde(default)]
	pub transcript: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFrame {
	/// Data URL such as `data:image/jpeg;base64,...`.
	#[serde(default)]
	pub frame: Option<String>,
}

/// Event emitted by the bridge (or the engine) to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
	/// Lifecycle acknowledgement, e.g. a successful connect.
	Status { message: String },
	/// Failure the end user should see.
	Error { message: String },
	/// A chunk of assistant output text.
	ReceiveTextChunk { text: String },
}

impl ServerEvent {
	pub fn status(message: impl Into<String>) -> Self {
		ServerEvent::Status {
			message: message.into(),
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		ServerEvent::Error {
			message: message.into(),
		}
	}

	/// Encodes the event as one text frame.
	pub fn encode(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}
