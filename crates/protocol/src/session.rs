use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identifier the transport assigns to one remote connection.
///
/// Cloning is cheap; the bridge copies it into every routed event and into the
/// engine's bound-session cell.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SessionId({})", self.0)
	}
}

impl From<&str> for SessionId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for SessionId {
	fn from(value: String) -> Self {
		Self(Arc::from(value))
	}
}

impl AsRef<str> for SessionId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl Serialize for SessionId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for SessionId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Ok(Self::from(s))
	}
}
