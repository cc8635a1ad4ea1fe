//! Static extraction of the selected columns and sort keys of a query string.
//!
//! Preconditions callers must honor: no wildcard selector, and every ordering column is also
//! selected. Both are reported as errors instead of producing a wrong merge.

use serde::{Deserialize, Serialize};

use crate::{
	Error, Result,
	scan::{self, Word},
};

/// Selected column names in selection order. Positions line up with result tuples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSpec(Vec<String>);
impl ColumnSpec {
	pub fn new(columns: Vec<String>) -> Self {
		Self(columns)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn position(&self, column: &str) -> Option<usize> {
		self.0.iter().position(|candidate| candidate == column)
	}

	pub fn contains(&self, column: &str) -> bool {
		self.position(column).is_some()
	}

	pub fn names(&self) -> &[String] {
		&self.0
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
	pub column: String,
	pub ascending: bool,
}

/// An ordering term resolved against a [`ColumnSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
	pub column: String,
	pub index: usize,
	pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSpec(Vec<SortKey>);
impl OrderSpec {
	pub fn resolve(terms: &[OrderTerm], columns: &ColumnSpec) -> Result<Self> {
		let mut keys = Vec::with_capacity(terms.len());

		for term in terms {
			let index = columns
				.position(&term.column)
				.ok_or_else(|| Error::OrderColumnNotSelected { column: term.column.clone() })?;

			keys.push(SortKey { column: term.column.clone(), index, ascending: term.ascending });
		}

		Ok(Self(keys))
	}

	pub fn keys(&self) -> &[SortKey] {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryShape {
	pub distinct: bool,
	pub columns: ColumnSpec,
	pub order: OrderSpec,
}

/// Parses the first top-level `select [distinct] ... from` and the last top-level `order by`.
pub fn parse(query: &str) -> Result<QueryShape> {
	let words = scan::top_level_words(query);
	let select_at = words.iter().position(|word| word.is("select")).ok_or(Error::MissingSelect)?;
	let select = words[select_at];
	let (distinct, columns_start) = match words.get(select_at + 1) {
		Some(next) if next.is("distinct") && query[select.end..next.start].trim().is_empty() =>
			(true, next.end),
		_ => (false, select.end),
	};
	let from = words[select_at + 1..]
		.iter()
		.find(|word| word.is("from") && word.start >= columns_start)
		.ok_or(Error::MissingFrom)?;
	let columns = parse_columns(&query[columns_start..from.start])?;
	let terms = order_terms_after(query, &words, from.end)?;
	let order = OrderSpec::resolve(&terms, &columns)?;

	Ok(QueryShape { distinct, columns, order })
}

/// Ordering terms of the last top-level `order by`, for text that may lack a select clause.
pub fn parse_order_terms(text: &str) -> Result<Vec<OrderTerm>> {
	let words = scan::top_level_words(text);

	order_terms_after(text, &words, 0)
}

/// Whether the text carries its own top-level select clause.
pub fn has_select(text: &str) -> bool {
	scan::top_level_words(text).iter().any(|word| word.is("select"))
}

/// The top-level `where` clause body, up to a trailing `order by` if any.
pub fn where_clause(query: &str) -> Option<&str> {
	let words = scan::top_level_words(query);
	let start = words.iter().find(|word| word.is("where"))?.end;
	let end = scan::last_order_by(&words)
		.map(|(order_start, _)| order_start)
		.filter(|order_start| *order_start >= start)
		.unwrap_or(query.len());

	Some(query[start..end].trim())
}

fn parse_columns(clause: &str) -> Result<ColumnSpec> {
	let mut columns = Vec::new();

	for (position, token) in scan::split_top_level(clause, ',').into_iter().enumerate() {
		let Some(column) = token.split_whitespace().next() else {
			return Err(Error::EmptyColumn { position });
		};

		if column == "*" || column.ends_with(".*") {
			return Err(Error::Wildcard { column: column.to_string() });
		}

		columns.push(column.to_string());
	}

	Ok(ColumnSpec(columns))
}

fn order_terms_after(text: &str, words: &[Word<'_>], min_start: usize) -> Result<Vec<OrderTerm>> {
	let Some((order_start, by_end)) = scan::last_order_by(words) else {
		return Ok(Vec::new());
	};

	if order_start < min_start {
		return Ok(Vec::new());
	}

	let mut terms = Vec::new();

	for (position, token) in scan::split_top_level(&text[by_end..], ',').into_iter().enumerate() {
		let mut parts = token.split_whitespace();
		let Some(column) = parts.next() else {
			return Err(Error::EmptyOrderTerm { position });
		};
		let ascending = !parts.next().map(|dir| dir.eq_ignore_ascii_case("desc")).unwrap_or(false);

		terms.push(OrderTerm { column: column.to_string(), ascending });
	}

	Ok(terms)
}
