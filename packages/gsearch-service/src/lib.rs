pub mod context;
pub mod search;
pub mod time_serde;

mod error;
mod fanout;
mod materialize;

pub use context::{Caller, PartitionGuard, SearchContext};
pub use error::{Error, Result};
pub use materialize::MaterializedRecord;
pub use search::{IdentifiersResponse, RecordQuery, RecordsResponse, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use gsearch_config::Config;
use gsearch_domain::{PartitionId, Value};
use gsearch_storage::{
	memory::MemoryStore,
	models::{Record, RecordKey},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes queries and loads records in one explicitly addressed partition.
///
/// `query` must return rows already ordered by the query's `order by` clause and at most
/// `row_cap` of them (0 means no cap).
pub trait PartitionStore
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>>;

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>>;
}

pub trait Topology
where
	Self: Send + Sync,
{
	fn list_partitions<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<PartitionId>>>;
}

pub trait AccessChecker
where
	Self: Send + Sync,
{
	/// Capability on the search feature as a whole.
	fn feature_allowed<'a>(&'a self, caller: &'a Caller) -> BoxFuture<'a, color_eyre::Result<bool>>;

	fn check_access<'a>(
		&'a self,
		caller: &'a Caller,
		right: &'a str,
		record: &'a Record,
	) -> BoxFuture<'a, color_eyre::Result<bool>>;
}

#[derive(Clone)]
pub struct Collaborators {
	pub store: Arc<dyn PartitionStore>,
	pub topology: Arc<dyn Topology>,
	pub access: Arc<dyn AccessChecker>,
}
impl Collaborators {
	pub fn memory(store: Arc<MemoryStore>) -> Self {
		Self { store: store.clone(), topology: store.clone(), access: store }
	}
}

pub struct GlobalSearch {
	pub cfg: Config,
	pub collaborators: Collaborators,
}
impl GlobalSearch {
	pub fn new(cfg: Config, collaborators: Collaborators) -> Self {
		Self { cfg, collaborators }
	}

	pub fn default_partition(&self) -> PartitionId {
		PartitionId::from(self.cfg.topology.default_partition.as_str())
	}

	/// A context for `caller` that starts out on the default partition.
	pub fn context(&self, caller: Caller) -> SearchContext {
		SearchContext::new(caller, self.default_partition())
	}
}

impl PartitionStore for MemoryStore {
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>> {
		Box::pin(async move { Ok(MemoryStore::query(self, partition, query, row_cap, parameters)?) })
	}

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move { Ok(MemoryStore::load_by_key(self, partition, key)?) })
	}
}

impl Topology for MemoryStore {
	fn list_partitions<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<PartitionId>>> {
		Box::pin(async move { Ok(self.partition_ids()) })
	}
}

impl AccessChecker for MemoryStore {
	fn feature_allowed<'a>(&'a self, caller: &'a Caller) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Ok(MemoryStore::feature_allowed(self, &caller.user)) })
	}

	fn check_access<'a>(
		&'a self,
		caller: &'a Caller,
		_right: &'a str,
		record: &'a Record,
	) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Ok(!self.is_denied(&caller.user, record)) })
	}
}
