pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Query has no top-level select clause.")]
	MissingSelect,
	#[error("Query has no top-level from clause after select.")]
	MissingFrom,
	#[error("Wildcard selector {column:?} is not supported; list the columns explicitly.")]
	Wildcard { column: String },
	#[error("Select clause has an empty column at position {position}.")]
	EmptyColumn { position: usize },
	#[error("Order by clause has an empty term at position {position}.")]
	EmptyOrderTerm { position: usize },
	#[error("Order column {column:?} must also appear in the select clause.")]
	OrderColumnNotSelected { column: String },
	#[error("Row from partition {partition} has {actual} values for {expected} columns.")]
	RowWidth { partition: String, expected: usize, actual: usize },
}
