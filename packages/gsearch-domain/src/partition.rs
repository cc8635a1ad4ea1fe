use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one independently stored partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);
impl PartitionId {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}
}
impl fmt::Display for PartitionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
impl From<&str> for PartitionId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}
impl From<String> for PartitionId {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Borrow<str> for PartitionId {
	fn borrow(&self) -> &str {
		self.0.as_str()
	}
}
