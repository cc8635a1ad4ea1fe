//! Fixture-backed partition store.
//!
//! Understands just enough of a query to be a faithful stand-in for a per-partition executor:
//! equality filters joined by `and`, projection, `distinct`, ordering and the row cap.

use std::{
	collections::{BTreeMap, HashSet},
	fs,
	path::Path,
};

use serde::Deserialize;

use gsearch_domain::{PartitionId, Value, columns, merge, value};

use crate::{
	Error, Result,
	models::{Record, RecordKey},
};

pub const ANY_USER: &str = "*";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
	pub partitions: Vec<PartitionFixture>,
	/// Optional. Users allowed to use the search feature at all; absent means everyone.
	#[serde(default)]
	pub feature_users: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionFixture {
	pub id: PartitionId,
	#[serde(default)]
	pub records: Vec<BTreeMap<String, Value>>,
	#[serde(default)]
	pub denied: Vec<Denial>,
}

/// Denies `user` (or everybody, with "*") access to the record with key parts `key`.
#[derive(Debug, Clone, Deserialize)]
pub struct Denial {
	pub user: String,
	pub key: Vec<String>,
}

#[derive(Debug)]
pub struct MemoryStore {
	partitions: BTreeMap<PartitionId, MemoryPartition>,
	key_columns: Vec<String>,
	locale_column: Option<String>,
	feature_users: Option<HashSet<String>>,
}

#[derive(Debug)]
struct MemoryPartition {
	records: Vec<BTreeMap<String, Value>>,
	denied: Vec<Denial>,
}

impl MemoryStore {
	pub fn from_fixture(
		fixture: Fixture,
		key_columns: Vec<String>,
		locale_column: Option<String>,
	) -> Self {
		let partitions = fixture
			.partitions
			.into_iter()
			.map(|partition| {
				(
					partition.id,
					MemoryPartition { records: partition.records, denied: partition.denied },
				)
			})
			.collect();
		let feature_users = fixture.feature_users.map(|users| users.into_iter().collect());

		Self { partitions, key_columns, locale_column, feature_users }
	}

	pub fn from_json(
		raw: &str,
		key_columns: Vec<String>,
		locale_column: Option<String>,
	) -> Result<Self> {
		let fixture: Fixture = serde_json::from_str(raw)?;

		Ok(Self::from_fixture(fixture, key_columns, locale_column))
	}

	pub fn load(
		path: &Path,
		key_columns: Vec<String>,
		locale_column: Option<String>,
	) -> Result<Self> {
		let raw = fs::read_to_string(path)
			.map_err(|err| Error::ReadFixture { path: path.to_path_buf(), source: err })?;

		Self::from_json(&raw, key_columns, locale_column)
	}

	pub fn partition_ids(&self) -> Vec<PartitionId> {
		self.partitions.keys().cloned().collect()
	}

	pub fn query(
		&self,
		partition: &PartitionId,
		query: &str,
		row_cap: usize,
		parameters: &[Value],
	) -> Result<Vec<Vec<Value>>> {
		let stored = self.partition(partition)?;
		let shape = columns::parse(query)?;
		let filter = match columns::where_clause(query) {
			Some(clause) => EqualityFilter::parse(clause, parameters)?,
			None => EqualityFilter::default(),
		};
		let mut rows: Vec<Vec<Value>> = Vec::new();

		for record in stored.records.iter().filter(|record| filter.matches(record)) {
			let row = shape
				.columns
				.names()
				.iter()
				.map(|column| record.get(column).cloned().unwrap_or(Value::Null))
				.collect::<Vec<_>>();

			if shape.distinct && rows.contains(&row) {
				continue;
			}

			rows.push(row);
		}

		rows.sort_by(|left, right| merge::compare_tuples(left, right, &shape.order));

		if row_cap > 0 {
			rows.truncate(row_cap);
		}

		tracing::trace!(partition = %partition, rows = rows.len(), "Memory partition answered query.");

		Ok(rows)
	}

	pub fn load_by_key(&self, partition: &PartitionId, key: &RecordKey) -> Result<Option<Record>> {
		let stored = self.partition(partition)?;
		let found = stored.records.iter().find(|record| {
			if self.key_parts(record) != key.parts {
				return false;
			}

			match (key.locale.as_deref(), self.locale_column.as_deref()) {
				(Some(locale), Some(column)) =>
					record.get(column).map(Value::to_key_part).as_deref() == Some(locale),
				_ => true,
			}
		});

		Ok(found.map(|fields| Record {
			partition: partition.clone(),
			key: RecordKey::new(self.key_parts(fields))
				.with_locale(self.locale_of(fields).filter(|_| key.locale.is_some())),
			fields: fields.clone(),
		}))
	}

	pub fn is_denied(&self, user: &str, record: &Record) -> bool {
		self.partitions
			.get(&record.partition)
			.map(|stored| {
				stored.denied.iter().any(|denial| {
					(denial.user == user || denial.user == ANY_USER) && denial.key == record.key.parts
				})
			})
			.unwrap_or(true)
	}

	pub fn feature_allowed(&self, user: &str) -> bool {
		self.feature_users.as_ref().map(|users| users.contains(user)).unwrap_or(true)
	}

	fn partition(&self, partition: &PartitionId) -> Result<&MemoryPartition> {
		self.partitions
			.get(partition)
			.ok_or_else(|| Error::UnknownPartition(partition.to_string()))
	}

	fn key_parts(&self, record: &BTreeMap<String, Value>) -> Vec<String> {
		self.key_columns
			.iter()
			.map(|column| record.get(column).map(Value::to_key_part).unwrap_or_default())
			.collect()
	}

	fn locale_of(&self, record: &BTreeMap<String, Value>) -> Option<String> {
		let column = self.locale_column.as_deref()?;

		record.get(column).map(Value::to_key_part)
	}
}

/// Conjunction of `column = operand` terms.
#[derive(Debug, Default)]
struct EqualityFilter {
	terms: Vec<(String, Value)>,
}
impl EqualityFilter {
	fn parse(clause: &str, parameters: &[Value]) -> Result<Self> {
		let tokens = tokenize(clause)?;
		let mut terms = Vec::new();
		let mut next_parameter = 0;
		let mut idx = 0;

		while idx < tokens.len() {
			if !terms.is_empty() {
				match &tokens[idx] {
					Token::Word(word) if word.eq_ignore_ascii_case("and") => idx += 1,
					other => return Err(unsupported(clause, &format!("expected 'and', got {other:?}"))),
				}
			}

			let (Some(Token::Word(column)), Some(Token::Equals), Some(operand)) =
				(tokens.get(idx), tokens.get(idx + 1), tokens.get(idx + 2))
			else {
				return Err(unsupported(clause, "expected '<column> = <operand>'"));
			};
			let operand = match operand {
				Token::Placeholder => {
					let value = parameters.get(next_parameter).cloned().ok_or_else(|| {
						unsupported(clause, "more placeholders than bound parameters")
					})?;

					next_parameter += 1;

					value
				},
				Token::Text(text) => Value::Text(text.clone()),
				Token::Word(word) => literal(word),
				Token::Equals => return Err(unsupported(clause, "unexpected '='")),
			};

			terms.push((column.clone(), operand));

			idx += 3;
		}

		Ok(Self { terms })
	}

	fn matches(&self, record: &BTreeMap<String, Value>) -> bool {
		self.terms.iter().all(|(column, expected)| {
			let actual = record.get(column).unwrap_or(&Value::Null);

			match (actual, expected) {
				(Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) =>
					value::compare_values(actual, expected).is_eq(),
				_ => actual == expected,
			}
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Word(String),
	Text(String),
	Equals,
	Placeholder,
}

fn tokenize(clause: &str) -> Result<Vec<Token>> {
	let mut tokens = Vec::new();
	let mut chars = clause.chars().peekable();

	while let Some(&ch) = chars.peek() {
		match ch {
			_ if ch.is_whitespace() => {
				chars.next();
			},
			'=' => {
				chars.next();
				tokens.push(Token::Equals);
			},
			'?' => {
				chars.next();
				tokens.push(Token::Placeholder);
			},
			'\'' => {
				chars.next();

				let mut text = String::new();
				let mut closed = false;

				while let Some(next) = chars.next() {
					if next == '\'' {
						// '' escapes a quote inside a literal.
						if chars.peek() == Some(&'\'') {
							chars.next();
							text.push('\'');

							continue;
						}

						closed = true;

						break;
					}

					text.push(next);
				}

				if !closed {
					return Err(unsupported(clause, "unterminated string literal"));
				}

				tokens.push(Token::Text(text));
			},
			_ => {
				let mut word = String::new();

				while let Some(&next) = chars.peek() {
					if next.is_whitespace() || matches!(next, '=' | '?' | '\'') {
						break;
					}

					word.push(next);
					chars.next();
				}

				tokens.push(Token::Word(word));
			},
		}
	}

	Ok(tokens)
}

fn literal(word: &str) -> Value {
	if word.eq_ignore_ascii_case("null") {
		return Value::Null;
	}
	if word.eq_ignore_ascii_case("true") {
		return Value::Bool(true);
	}
	if word.eq_ignore_ascii_case("false") {
		return Value::Bool(false);
	}
	if let Ok(integer) = word.parse::<i64>() {
		return Value::Integer(integer);
	}
	if let Ok(float) = word.parse::<f64>() {
		return Value::Float(float);
	}

	Value::Text(word.to_string())
}

fn unsupported(clause: &str, reason: &str) -> Error {
	Error::Query(format!("where clause {clause:?}: {reason}."))
}
