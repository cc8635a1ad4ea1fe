use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{PartitionId, Result, Value, columns};

/// One logical query against a set of partitions, with its pagination window.
///
/// `max == 0` means unbounded. An empty partition set lets the executor pick the targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
	query: String,
	#[serde(default)]
	parameters: Vec<Value>,
	#[serde(default)]
	partitions: BTreeSet<PartitionId>,
	#[serde(default)]
	start: usize,
	#[serde(default)]
	max: usize,
}
impl QueryDescriptor {
	pub fn new(query: impl Into<String>) -> Self {
		Self { query: query.into(), ..Default::default() }
	}

	pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
		self.parameters = parameters;

		self
	}

	pub fn with_partitions<I, P>(mut self, partitions: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PartitionId>,
	{
		self.partitions = partitions.into_iter().map(Into::into).collect();

		self
	}

	pub fn with_window(mut self, start: usize, max: usize) -> Self {
		self.start = start;
		self.max = max;

		self
	}

	pub fn set_query(&mut self, query: impl Into<String>) {
		self.query = query.into();
	}

	pub fn query(&self) -> &str {
		&self.query
	}

	pub fn parameters(&self) -> &[Value] {
		&self.parameters
	}

	pub fn partitions(&self) -> &BTreeSet<PartitionId> {
		&self.partitions
	}

	pub fn start(&self) -> usize {
		self.start
	}

	pub fn max(&self) -> usize {
		self.max
	}

	/// Rows each partition may return and the merge may retain: `start + max`, or 0 for unbounded.
	pub fn row_cap(&self) -> usize {
		if self.max == 0 { 0 } else { self.start.saturating_add(self.max) }
	}
}

/// Synthesizes `select distinct <key columns>[, <order columns>] from <source> [<condition>]`.
///
/// Order columns named by a trailing `order by` in the condition are appended to the selection
/// when missing so the merge can still sort on them.
pub fn build_default_query(
	condition: &str,
	key_columns: &[String],
	extra_columns: &[String],
	source: &str,
) -> Result<String> {
	let condition = condition.trim();
	let mut selected: Vec<&str> = Vec::with_capacity(key_columns.len() + extra_columns.len());

	for column in key_columns.iter().chain(extra_columns) {
		if !selected.contains(&column.as_str()) {
			selected.push(column.as_str());
		}
	}

	let terms = columns::parse_order_terms(condition)?;

	for term in &terms {
		if !selected.contains(&term.column.as_str()) {
			selected.push(term.column.as_str());
		}
	}

	let mut query = format!("select distinct {} from {}", selected.join(", "), source.trim());

	if !condition.is_empty() {
		query.push(' ');

		if !starts_with_clause(condition) {
			query.push_str("where ");
		}

		query.push_str(condition);
	}

	Ok(query)
}

fn starts_with_clause(condition: &str) -> bool {
	let mut words = condition.split_whitespace();
	let first = words.next().unwrap_or_default();

	first.eq_ignore_ascii_case("where")
		|| (first.eq_ignore_ascii_case("order")
			&& words.next().map(|word| word.eq_ignore_ascii_case("by")).unwrap_or(false))
}
