use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// A positional cell of a result tuple or a bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	Null,
	Bool(bool),
	Integer(i64),
	Float(f64),
	Text(String),
}
impl Value {
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text.as_str()),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Renders the value the way it appears inside a record identifier.
	pub fn to_key_part(&self) -> String {
		match self {
			Self::Null => String::new(),
			Self::Text(text) => text.clone(),
			other => other.to_string(),
		}
	}
}
impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("null"),
			Self::Bool(value) => write!(f, "{value}"),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Text(value) => f.write_str(value),
		}
	}
}
impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}
impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}
impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}
impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// Ascending comparison of two cells. A total order, so sorts and binary searches stay sound.
///
/// Kinds rank `Null < Bool < number < Text`. Text compares case-insensitively. Integers and
/// floats compare exactly against each other, `-0.0` equals `0.0` and NaN sorts past every
/// other number.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
	match (left, right) {
		(Value::Text(left), Value::Text(right)) => left
			.chars()
			.flat_map(char::to_lowercase)
			.cmp(right.chars().flat_map(char::to_lowercase)),
		(Value::Integer(left), Value::Integer(right)) => left.cmp(right),
		(Value::Float(left), Value::Float(right)) => float_key(*left).total_cmp(&float_key(*right)),
		(Value::Integer(left), Value::Float(right)) => compare_int_float(*left, *right),
		(Value::Float(left), Value::Integer(right)) => compare_int_float(*right, *left).reverse(),
		(Value::Bool(left), Value::Bool(right)) => left.cmp(right),
		_ => kind_rank(left).cmp(&kind_rank(right)),
	}
}

fn kind_rank(value: &Value) -> u8 {
	match value {
		Value::Null => 0,
		Value::Bool(_) => 1,
		Value::Integer(_) | Value::Float(_) => 2,
		Value::Text(_) => 3,
	}
}

// Folds -0.0 into 0.0 and every NaN into the positive one.
fn float_key(value: f64) -> f64 {
	if value == 0.0 {
		0.0
	} else if value.is_nan() {
		f64::NAN
	} else {
		value
	}
}

fn compare_int_float(int: i64, float: f64) -> Ordering {
	// 2^63: the first float above every i64.
	const I64_END: f64 = 9_223_372_036_854_775_808.0;

	if float.is_nan() || float >= I64_END {
		return Ordering::Less;
	}
	if float < -I64_END {
		return Ordering::Greater;
	}

	let whole = float.trunc();

	match int.cmp(&(whole as i64)) {
		Ordering::Equal => 0.0_f64.total_cmp(&float_key(float - whole)),
		other => other,
	}
}
