//! Bounded, always-sorted accumulation of rows arriving from many partitions.

use std::cmp::Ordering;

use crate::{OrderSpec, ResultRow, Value, value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
	Inserted { position: usize },
	/// Inserted, and the previous tail fell past the bound and was discarded.
	Displaced { position: usize },
	/// The candidate sorts past the bound and was discarded.
	Dropped,
}

/// Rows kept sorted by an [`OrderSpec`] after every insertion, never longer than `bound`.
#[derive(Debug, Clone)]
pub struct MergedResultSet {
	order: OrderSpec,
	bound: Option<usize>,
	rows: Vec<ResultRow>,
}
impl MergedResultSet {
	/// `row_cap == 0` leaves the set unbounded.
	pub fn new(order: OrderSpec, row_cap: usize) -> Self {
		let bound = (row_cap > 0).then_some(row_cap);
		let rows = Vec::with_capacity(bound.unwrap_or_default().min(1_024));

		Self { order, bound, rows }
	}

	pub fn insert(&mut self, row: ResultRow) -> Insertion {
		if self.rows.is_empty() {
			self.rows.push(row);

			return Insertion::Inserted { position: 0 };
		}

		let position =
			self.rows.partition_point(|existing| merge_cmp(existing, &row, &self.order).is_le());

		match self.bound {
			Some(bound) if position >= bound => Insertion::Dropped,
			Some(bound) => {
				self.rows.insert(position, row);

				if self.rows.len() > bound {
					self.rows.truncate(bound);

					Insertion::Displaced { position }
				} else {
					Insertion::Inserted { position }
				}
			},
			None => {
				self.rows.insert(position, row);

				Insertion::Inserted { position }
			},
		}
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn bound(&self) -> Option<usize> {
		self.bound
	}

	pub fn is_full(&self) -> bool {
		self.bound.map(|bound| self.rows.len() >= bound).unwrap_or(false)
	}

	pub fn order(&self) -> &OrderSpec {
		&self.order
	}

	pub fn rows(&self) -> &[ResultRow] {
		&self.rows
	}

	pub fn into_rows(self) -> Vec<ResultRow> {
		self.rows
	}
}

/// Compares two rows on the sort keys only. The first differing key decides.
pub fn compare_rows(left: &ResultRow, right: &ResultRow, order: &OrderSpec) -> Ordering {
	compare_tuples(left.values(), right.values(), order)
}

pub fn compare_tuples(left: &[Value], right: &[Value], order: &OrderSpec) -> Ordering {
	for key in order.keys() {
		let (Some(a), Some(b)) = (left.get(key.index), right.get(key.index)) else {
			continue;
		};
		let ordering = value::compare_values(a, b);
		let ordering = if key.ascending { ordering } else { ordering.reverse() };

		if ordering != Ordering::Equal {
			return ordering;
		}
	}

	Ordering::Equal
}

/// Sort-key comparison with partition id and partition-local position as final tie-breakers, so
/// the merged order never depends on which partition answered first.
pub fn merge_cmp(left: &ResultRow, right: &ResultRow, order: &OrderSpec) -> Ordering {
	compare_rows(left, right, order)
		.then_with(|| left.partition().cmp(right.partition()))
		.then_with(|| left.ordinal().cmp(&right.ordinal()))
}
