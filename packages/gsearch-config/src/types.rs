use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub topology: Topology,
	pub fanout: Fanout,
	pub query: Query,
	pub materialize: Materialize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
	/// When false, queries without an explicit partition list only touch `default_partition`.
	pub multi_partition: bool,
	pub default_partition: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fanout {
	#[serde(default = "default_fanout_mode")]
	pub mode: String,
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: usize,
	/// Zero disables the per-partition timeout.
	#[serde(default)]
	pub partition_timeout_ms: u64,
	#[serde(default = "default_timeout_policy")]
	pub timeout_policy: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Query {
	/// Entity source spliced into generated queries, e.g. "Document as doc".
	pub default_source: String,
	/// Columns that identify a record inside its partition, in identifier order.
	pub key_columns: Vec<String>,
	/// Optional. Selected in addition to `key_columns` for distinct-by-locale record queries.
	pub locale_column: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Materialize {
	#[serde(default = "default_access_right")]
	pub access_right: String,
	/// Over-fetch until the page is full when rights filtering drops records.
	#[serde(default)]
	pub backfill: bool,
	#[serde(default = "default_backfill_max_rounds")]
	pub backfill_max_rounds: u32,
}

fn default_fanout_mode() -> String {
	"concurrent".to_string()
}

fn default_max_concurrency() -> usize {
	8
}

fn default_timeout_policy() -> String {
	"fail_fast".to_string()
}

fn default_access_right() -> String {
	"view".to_string()
}

fn default_backfill_max_rounds() -> u32 {
	4
}
