use std::sync::Arc;

use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::{ColumnSpec, Error, PartitionId, Result, Value};

/// A positional tuple tagged with its origin partition.
///
/// `ordinal` is the row's position in its partition's result and only serves as a stable
/// tie-breaker for the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
	partition: PartitionId,
	columns: Arc<ColumnSpec>,
	values: Vec<Value>,
	ordinal: usize,
}
impl ResultRow {
	pub fn new(
		partition: PartitionId,
		columns: Arc<ColumnSpec>,
		values: Vec<Value>,
		ordinal: usize,
	) -> Result<Self> {
		if values.len() != columns.len() {
			return Err(Error::RowWidth {
				partition: partition.to_string(),
				expected: columns.len(),
				actual: values.len(),
			});
		}

		Ok(Self { partition, columns, values, ordinal })
	}

	pub fn partition(&self) -> &PartitionId {
		&self.partition
	}

	pub fn columns(&self) -> &ColumnSpec {
		&self.columns
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn ordinal(&self) -> usize {
		self.ordinal
	}

	pub fn value(&self, column: &str) -> Option<&Value> {
		self.columns.position(column).and_then(|index| self.values.get(index))
	}
}
impl Serialize for ResultRow {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut state = serializer.serialize_struct("ResultRow", 3)?;

		state.serialize_field("partition", &self.partition)?;
		state.serialize_field("columns", self.columns.as_ref())?;
		state.serialize_field("values", &self.values)?;
		state.end()
	}
}
