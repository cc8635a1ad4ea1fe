use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use tokio::{sync::Semaphore, task::JoinSet};
use uuid::Uuid;

use gsearch_config::Config;
use gsearch_domain::{
	ColumnSpec, Insertion, MergedResultSet, PartitionId, QueryDescriptor, QueryShape, ResultRow,
	Value,
};

use crate::{Error, GlobalSearch, PartitionStore, Result, SearchContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanoutMode {
	Sequential,
	Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeoutPolicy {
	FailFast,
	Degrade,
}

pub(crate) struct FanoutOutcome {
	pub(crate) merged: MergedResultSet,
	pub(crate) partitions: Vec<PartitionId>,
	pub(crate) degraded: Vec<PartitionId>,
}

struct Collector {
	merged: MergedResultSet,
	columns: Arc<ColumnSpec>,
	policy: TimeoutPolicy,
	degraded: Vec<PartitionId>,
	trace_id: Uuid,
}
impl Collector {
	fn absorb(
		&mut self,
		partition: &PartitionId,
		answer: Result<Vec<Vec<Value>>>,
		elapsed: Duration,
	) -> Result<()> {
		let tuples = match answer {
			Ok(tuples) => tuples,
			Err(Error::PartitionTimeout { partition: timed_out, timeout_ms })
				if self.policy == TimeoutPolicy::Degrade =>
			{
				tracing::warn!(
					trace_id = %self.trace_id,
					partition = %timed_out,
					timeout_ms,
					"Partition timed out. Continuing without its rows."
				);

				self.degraded.push(partition.clone());

				return Ok(());
			},
			Err(err) => return Err(err),
		};
		let returned = tuples.len();
		let mut kept = 0;

		for (ordinal, values) in tuples.into_iter().enumerate() {
			let row = ResultRow::new(partition.clone(), self.columns.clone(), values, ordinal)
				.map_err(|err| Error::Partition {
					partition: partition.to_string(),
					message: err.to_string(),
				})?;

			if self.merged.insert(row) != Insertion::Dropped {
				kept += 1;
			}
		}

		tracing::debug!(
			trace_id = %self.trace_id,
			partition = %partition,
			returned,
			kept,
			elapsed_ms = elapsed.as_millis() as u64,
			"Partition answered."
		);

		Ok(())
	}
}

pub(crate) fn resolve_fanout_mode(cfg: &Config) -> FanoutMode {
	match cfg.fanout.mode.as_str() {
		"sequential" => FanoutMode::Sequential,
		_ => FanoutMode::Concurrent,
	}
}

pub(crate) fn resolve_timeout_policy(cfg: &Config) -> TimeoutPolicy {
	match cfg.fanout.timeout_policy.as_str() {
		"degrade" => TimeoutPolicy::Degrade,
		_ => TimeoutPolicy::FailFast,
	}
}

impl GlobalSearch {
	/// Explicit partitions win, then the topology in multi-partition mode, then the default
	/// partition.
	pub(crate) async fn resolve_partitions(
		&self,
		descriptor: &QueryDescriptor,
	) -> Result<Vec<PartitionId>> {
		if !descriptor.partitions().is_empty() {
			if let Some(invalid) = descriptor
				.partitions()
				.iter()
				.find(|partition| !gsearch_config::is_valid_partition_id(partition.as_str()))
			{
				return Err(Error::InvalidRequest {
					message: format!("Partition id {invalid:?} is not valid."),
				});
			}

			return Ok(descriptor.partitions().iter().cloned().collect());
		}
		if !self.cfg.topology.multi_partition {
			return Ok(vec![self.default_partition()]);
		}

		let mut partitions = self
			.collaborators
			.topology
			.list_partitions()
			.await
			.map_err(|err| Error::Topology { message: err.to_string() })?;

		partitions.retain(|partition| {
			let valid = gsearch_config::is_valid_partition_id(partition.as_str());

			if !valid {
				tracing::warn!(partition = %partition, "Topology listed an invalid partition id. Skipping.");
			}

			valid
		});
		partitions.sort();
		partitions.dedup();

		if partitions.is_empty() {
			tracing::warn!("Topology listed no partitions. Falling back to the default partition.");

			return Ok(vec![self.default_partition()]);
		}

		Ok(partitions)
	}

	/// Queries every target partition with `row_cap` and merges the answers under that same
	/// bound.
	pub(crate) async fn fan_out(
		&self,
		ctx: &mut SearchContext,
		descriptor: &QueryDescriptor,
		shape: &QueryShape,
		row_cap: usize,
		trace_id: Uuid,
	) -> Result<FanoutOutcome> {
		let partitions = self.resolve_partitions(descriptor).await?;
		let mut collector = Collector {
			merged: MergedResultSet::new(shape.order.clone(), row_cap),
			columns: Arc::new(shape.columns.clone()),
			policy: resolve_timeout_policy(&self.cfg),
			degraded: Vec::new(),
			trace_id,
		};

		match resolve_fanout_mode(&self.cfg) {
			FanoutMode::Sequential =>
				self.fan_out_sequential(ctx, descriptor, &partitions, row_cap, &mut collector).await?,
			FanoutMode::Concurrent =>
				self.fan_out_concurrent(descriptor, &partitions, row_cap, &mut collector).await?,
		}

		Ok(FanoutOutcome { merged: collector.merged, partitions, degraded: collector.degraded })
	}

	async fn fan_out_sequential(
		&self,
		ctx: &mut SearchContext,
		descriptor: &QueryDescriptor,
		partitions: &[PartitionId],
		row_cap: usize,
		collector: &mut Collector,
	) -> Result<()> {
		let store = self.collaborators.store.as_ref();
		let timeout_ms = self.cfg.fanout.partition_timeout_ms;

		for partition in partitions {
			let started = Instant::now();
			let answer = {
				let scope = ctx.enter(partition.clone());

				run_query(
					store,
					scope.active_partition(),
					descriptor.query(),
					row_cap,
					descriptor.parameters(),
					timeout_ms,
				)
				.await
			};

			collector.absorb(partition, answer, started.elapsed())?;
		}

		Ok(())
	}

	async fn fan_out_concurrent(
		&self,
		descriptor: &QueryDescriptor,
		partitions: &[PartitionId],
		row_cap: usize,
		collector: &mut Collector,
	) -> Result<()> {
		let permits = Arc::new(Semaphore::new(self.cfg.fanout.max_concurrency.max(1)));
		let query: Arc<str> = Arc::from(descriptor.query());
		let parameters: Arc<[Value]> = Arc::from(descriptor.parameters());
		let timeout_ms = self.cfg.fanout.partition_timeout_ms;
		let mut tasks = JoinSet::new();

		for partition in partitions {
			let store = self.collaborators.store.clone();
			let permits = permits.clone();
			let query = query.clone();
			let parameters = parameters.clone();
			let partition = partition.clone();

			tasks.spawn(async move {
				let answer = match permits.acquire_owned().await {
					Ok(_permit) => {
						let started = Instant::now();
						let answer = run_query(
							store.as_ref(),
							&partition,
							&query,
							row_cap,
							&parameters,
							timeout_ms,
						)
						.await;

						(answer, started.elapsed())
					},
					Err(err) =>
						(Err(Error::Task { message: err.to_string() }), Duration::default()),
				};

				(partition, answer)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			let absorbed = match joined {
				Ok((partition, (answer, elapsed))) => collector.absorb(&partition, answer, elapsed),
				Err(err) => Err(Error::Task { message: err.to_string() }),
			};

			if let Err(err) = absorbed {
				tasks.abort_all();

				tracing::warn!(
					trace_id = %collector.trace_id,
					error = %err,
					pending = tasks.len(),
					"Fan-out aborted."
				);

				return Err(err);
			}
		}

		Ok(())
	}
}

async fn run_query(
	store: &dyn PartitionStore,
	partition: &PartitionId,
	query: &str,
	row_cap: usize,
	parameters: &[Value],
	timeout_ms: u64,
) -> Result<Vec<Vec<Value>>> {
	let call = store.query(partition, query, row_cap, parameters);
	let answer = if timeout_ms == 0 {
		call.await
	} else {
		tokio::time::timeout(Duration::from_millis(timeout_ms), call).await.map_err(|_| {
			Error::PartitionTimeout { partition: partition.to_string(), timeout_ms }
		})?
	};

	answer.map_err(|err| Error::Partition { partition: partition.to_string(), message: err.to_string() })
}
