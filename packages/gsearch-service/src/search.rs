use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use gsearch_domain::{
	PartitionId, QueryDescriptor, QueryShape, ResultRow, Value, columns,
	query::build_default_query, window,
};
use gsearch_storage::models::RecordKey;

use crate::{Error, GlobalSearch, MaterializedRecord, Result, SearchContext};

/// A records query: a filter condition, or a full query with its own `select`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
	pub condition: String,
	#[serde(default)]
	pub parameters: Vec<Value>,
	/// Empty lets the topology decide.
	#[serde(default)]
	pub partitions: Vec<PartitionId>,
	#[serde(default)]
	pub start: usize,
	#[serde(default)]
	pub max: usize,
	/// One result per locale variant of a record instead of one per record.
	#[serde(default)]
	pub distinct_by_locale: bool,
	#[serde(default)]
	pub check_rights: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub trace_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub partitions: Vec<PartitionId>,
	/// Partitions that timed out and contributed nothing under the degrade policy.
	pub degraded: Vec<PartitionId>,
	pub rows: Vec<ResultRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordsResponse {
	pub trace_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub partitions: Vec<PartitionId>,
	pub degraded: Vec<PartitionId>,
	pub records: Vec<MaterializedRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifiersResponse {
	pub trace_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub partitions: Vec<PartitionId>,
	pub degraded: Vec<PartitionId>,
	pub identifiers: Vec<String>,
}

struct RecordPage {
	records: Vec<MaterializedRecord>,
	partitions: Vec<PartitionId>,
	degraded: Vec<PartitionId>,
}

impl GlobalSearch {
	/// Runs `descriptor` against every target partition and returns the merged page of rows.
	pub async fn search(
		&self,
		ctx: &mut SearchContext,
		descriptor: &QueryDescriptor,
	) -> Result<SearchResponse> {
		let trace_id = Uuid::new_v4();
		let created_at = OffsetDateTime::now_utc();

		if !self.feature_allowed(ctx, trace_id).await {
			return Ok(SearchResponse {
				trace_id,
				created_at,
				partitions: Vec::new(),
				degraded: Vec::new(),
				rows: Vec::new(),
			});
		}

		let shape = columns::parse(descriptor.query())?;
		let outcome = self.fan_out(ctx, descriptor, &shape, descriptor.row_cap(), trace_id).await?;
		let rows = window::slice(outcome.merged.into_rows(), descriptor.start(), descriptor.max());

		tracing::info!(
			trace_id = %trace_id,
			partitions = outcome.partitions.len(),
			degraded = outcome.degraded.len(),
			start = descriptor.start(),
			max = descriptor.max(),
			rows = rows.len(),
			"Search completed."
		);

		Ok(SearchResponse {
			trace_id,
			created_at,
			partitions: outcome.partitions,
			degraded: outcome.degraded,
			rows,
		})
	}

	pub async fn search_records(
		&self,
		ctx: &mut SearchContext,
		query: &RecordQuery,
	) -> Result<RecordsResponse> {
		let trace_id = Uuid::new_v4();
		let created_at = OffsetDateTime::now_utc();

		if !self.feature_allowed(ctx, trace_id).await {
			return Ok(RecordsResponse {
				trace_id,
				created_at,
				partitions: Vec::new(),
				degraded: Vec::new(),
				records: Vec::new(),
			});
		}

		let descriptor = self.record_descriptor(query)?;
		let shape = self.record_shape(&descriptor)?;
		let page = self.collect_records(ctx, query, &descriptor, &shape, trace_id).await?;

		tracing::info!(
			trace_id = %trace_id,
			partitions = page.partitions.len(),
			degraded = page.degraded.len(),
			start = query.start,
			max = query.max,
			records = page.records.len(),
			"Record search completed."
		);

		Ok(RecordsResponse {
			trace_id,
			created_at,
			partitions: page.partitions,
			degraded: page.degraded,
			records: page.records,
		})
	}

	/// Like [`GlobalSearch::search_records`], but only returns `"<partition>:<key1>.<key2>"`
	/// identifiers. Records are only loaded when rights must be checked.
	pub async fn search_identifiers(
		&self,
		ctx: &mut SearchContext,
		query: &RecordQuery,
	) -> Result<IdentifiersResponse> {
		let trace_id = Uuid::new_v4();
		let created_at = OffsetDateTime::now_utc();

		if !self.feature_allowed(ctx, trace_id).await {
			return Ok(IdentifiersResponse {
				trace_id,
				created_at,
				partitions: Vec::new(),
				degraded: Vec::new(),
				identifiers: Vec::new(),
			});
		}

		let descriptor = self.record_descriptor(query)?;
		let shape = self.record_shape(&descriptor)?;
		let (identifiers, partitions, degraded) = if query.check_rights {
			let page = self.collect_records(ctx, query, &descriptor, &shape, trace_id).await?;
			let identifiers = page.records.into_iter().map(|record| record.identifier).collect();

			(identifiers, page.partitions, page.degraded)
		} else {
			let outcome =
				self.fan_out(ctx, &descriptor, &shape, descriptor.row_cap(), trace_id).await?;
			let rows = window::slice(outcome.merged.into_rows(), query.start, query.max);
			let mut identifiers = Vec::with_capacity(rows.len());

			for row in &rows {
				identifiers.push(self.row_key(row, false)?.identifier(row.partition()));
			}

			(identifiers, outcome.partitions, outcome.degraded)
		};

		tracing::info!(
			trace_id = %trace_id,
			partitions = partitions.len(),
			identifiers = identifiers.len(),
			"Identifier search completed."
		);

		Ok(IdentifiersResponse { trace_id, created_at, partitions, degraded, identifiers })
	}

	/// Fail-closed gate on the search feature as a whole.
	async fn feature_allowed(&self, ctx: &SearchContext, trace_id: Uuid) -> bool {
		match self.collaborators.access.feature_allowed(ctx.caller()).await {
			Ok(true) => true,
			Ok(false) => {
				tracing::info!(
					trace_id = %trace_id,
					user = %ctx.caller().user,
					"Caller may not use search. Returning an empty result."
				);

				false
			},
			Err(err) => {
				tracing::warn!(
					trace_id = %trace_id,
					user = %ctx.caller().user,
					error = %err,
					"Feature check failed. Returning an empty result."
				);

				false
			},
		}
	}

	fn record_descriptor(&self, query: &RecordQuery) -> Result<QueryDescriptor> {
		let text = if columns::has_select(&query.condition) {
			query.condition.trim().to_string()
		} else {
			let mut extra = Vec::new();

			if query.distinct_by_locale {
				let Some(locale) = self.cfg.query.locale_column.clone() else {
					return Err(Error::InvalidRequest {
						message: "distinct_by_locale requires query.locale_column to be configured."
							.to_string(),
					});
				};

				extra.push(locale);
			}

			build_default_query(
				&query.condition,
				&self.cfg.query.key_columns,
				&extra,
				&self.cfg.query.default_source,
			)?
		};

		Ok(QueryDescriptor::new(text)
			.with_parameters(query.parameters.clone())
			.with_partitions(query.partitions.iter().cloned())
			.with_window(query.start, query.max))
	}

	fn record_shape(&self, descriptor: &QueryDescriptor) -> Result<QueryShape> {
		let shape = columns::parse(descriptor.query())?;

		if let Some(missing) =
			self.cfg.query.key_columns.iter().find(|column| !shape.columns.contains(column))
		{
			return Err(Error::InvalidRequest {
				message: format!("Query does not select key column {missing:?}."),
			});
		}

		Ok(shape)
	}

	async fn collect_records(
		&self,
		ctx: &mut SearchContext,
		query: &RecordQuery,
		descriptor: &QueryDescriptor,
		shape: &QueryShape,
		trace_id: Uuid,
	) -> Result<RecordPage> {
		let with_locale = query.distinct_by_locale;

		if !self.cfg.materialize.backfill || descriptor.max() == 0 {
			let outcome =
				self.fan_out(ctx, descriptor, shape, descriptor.row_cap(), trace_id).await?;
			let rows = window::slice(outcome.merged.into_rows(), query.start, query.max);
			let records = self
				.materialize(ctx, &rows, with_locale, query.check_rights, trace_id)
				.await?;

			return Ok(RecordPage {
				records,
				partitions: outcome.partitions,
				degraded: outcome.degraded,
			});
		}

		let wanted = descriptor.row_cap();
		let mut row_cap = wanted;
		// Outcome of every row materialized so far, visible or not, by owning partition and key.
		let mut seen: HashMap<(PartitionId, RecordKey), Option<MaterializedRecord>> = HashMap::new();
		let mut visible: Vec<MaterializedRecord> = Vec::new();
		let mut partitions = Vec::new();
		let mut degraded = Vec::new();

		for round in 0..self.cfg.materialize.backfill_max_rounds {
			let outcome = self.fan_out(ctx, descriptor, shape, row_cap, trace_id).await?;
			let exhausted = outcome.merged.len() < row_cap && outcome.degraded.is_empty();
			let rows = outcome.merged.into_rows();
			let mut loaded = 0;

			// A partition that timed out earlier may answer now, so the whole prefix is walked again.
			visible.clear();

			for row in &rows {
				let key = (row.partition().clone(), self.row_key(row, with_locale)?);
				let record = match seen.get(&key) {
					Some(record) => record.clone(),
					None => {
						let record = self
							.materialize_row(ctx, row, with_locale, query.check_rights, trace_id)
							.await?
							.map(MaterializedRecord::from);

						loaded += 1;

						seen.insert(key, record.clone());

						record
					},
				};

				if let Some(record) = record {
					visible.push(record);
				}
			}

			partitions = outcome.partitions;
			degraded = outcome.degraded;

			tracing::debug!(
				trace_id = %trace_id,
				round,
				row_cap,
				merged = rows.len(),
				loaded,
				visible = visible.len(),
				degraded = degraded.len(),
				"Backfill round finished."
			);

			if visible.len() >= wanted || exhausted {
				break;
			}

			row_cap = row_cap.saturating_mul(2);
		}

		let records = visible.into_iter().skip(query.start).take(query.max).collect();

		Ok(RecordPage { records, partitions, degraded })
	}
}
