use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gsearch_domain::{PartitionId, Value};

/// Identifies a record inside its partition: the key column values in configured order, plus
/// the locale when a query asked for distinct-by-locale records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
	pub parts: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
}
impl RecordKey {
	pub fn new(parts: Vec<String>) -> Self {
		Self { parts, locale: None }
	}

	pub fn with_locale(mut self, locale: Option<String>) -> Self {
		self.locale = locale.filter(|value| !value.is_empty());

		self
	}

	/// `"<partition>:<part1>.<part2>"`. The locale is not part of the identifier.
	pub fn identifier(&self, partition: &PartitionId) -> String {
		format!("{partition}:{}", self.parts.join("."))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
	pub partition: PartitionId,
	pub key: RecordKey,
	pub fields: BTreeMap<String, Value>,
}
impl Record {
	pub fn field(&self, name: &str) -> Option<&Value> {
		self.fields.get(name)
	}

	pub fn identifier(&self) -> String {
		self.key.identifier(&self.partition)
	}
}
