use serde::Serialize;
use uuid::Uuid;

use gsearch_domain::{PartitionId, ResultRow};
use gsearch_storage::models::{Record, RecordKey};

use crate::{Error, GlobalSearch, Result, SearchContext};

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedRecord {
	pub partition: PartitionId,
	/// `"<partition>:<key1>.<key2>"`.
	pub identifier: String,
	pub record: Record,
}
impl From<Record> for MaterializedRecord {
	fn from(record: Record) -> Self {
		Self { partition: record.partition.clone(), identifier: record.identifier(), record }
	}
}

impl GlobalSearch {
	/// Rebuilds a record key from the row's key columns, plus the locale when `with_locale`.
	pub(crate) fn row_key(&self, row: &ResultRow, with_locale: bool) -> Result<RecordKey> {
		let mut parts = Vec::with_capacity(self.cfg.query.key_columns.len());

		for column in &self.cfg.query.key_columns {
			let value = row.value(column).ok_or_else(|| Error::InvalidRequest {
				message: format!("Query does not select key column {column:?}."),
			})?;

			parts.push(value.to_key_part());
		}

		let locale = match (with_locale, self.cfg.query.locale_column.as_deref()) {
			(true, Some(column)) => row.value(column).map(|value| value.to_key_part()),
			_ => None,
		};

		Ok(RecordKey::new(parts).with_locale(locale))
	}

	/// Loads the record behind `row` in its owning partition.
	///
	/// `Ok(None)` means the row produced no visible record: it vanished since the query ran, or
	/// the caller is not allowed to see it.
	pub(crate) async fn materialize_row(
		&self,
		ctx: &mut SearchContext,
		row: &ResultRow,
		with_locale: bool,
		check_rights: bool,
		trace_id: Uuid,
	) -> Result<Option<Record>> {
		let key = self.row_key(row, with_locale)?;
		let scope = ctx.enter(row.partition().clone());
		let partition = scope.active_partition();
		let loaded = self
			.collaborators
			.store
			.load_by_key(partition, &key)
			.await
			.map_err(|err| Error::Storage { message: format!("{partition}: {err}") })?;
		let Some(record) = loaded else {
			tracing::warn!(
				trace_id = %trace_id,
				identifier = %key.identifier(partition),
				"Record listed by the query could not be loaded. Skipping."
			);

			return Ok(None);
		};

		if !check_rights {
			return Ok(Some(record));
		}

		let right = self.cfg.materialize.access_right.as_str();

		match self.collaborators.access.check_access(scope.caller(), right, &record).await {
			Ok(true) => Ok(Some(record)),
			Ok(false) => {
				tracing::debug!(
					trace_id = %trace_id,
					identifier = %record.identifier(),
					right,
					"Record filtered by access check."
				);

				Ok(None)
			},
			Err(err) => {
				tracing::warn!(
					trace_id = %trace_id,
					identifier = %record.identifier(),
					right,
					error = %err,
					"Access check failed. Treating the record as denied."
				);

				Ok(None)
			},
		}
	}

	pub(crate) async fn materialize(
		&self,
		ctx: &mut SearchContext,
		rows: &[ResultRow],
		with_locale: bool,
		check_rights: bool,
		trace_id: Uuid,
	) -> Result<Vec<MaterializedRecord>> {
		let mut records = Vec::with_capacity(rows.len());

		for row in rows {
			if let Some(record) =
				self.materialize_row(ctx, row, with_locale, check_rights, trace_id).await?
			{
				records.push(MaterializedRecord::from(record));
			}
		}

		Ok(records)
	}
}
