//! Shared fixtures: a test configuration and the two-wiki scenario.

mod error;

pub use error::{Error, Result};

use gsearch_config::Config;
use gsearch_storage::memory::MemoryStore;

/// Multi-partition, concurrent fan-out, no timeout, no backfill.
pub const TEST_CONFIG: &str = r#"
[service]
log_level = "debug"

[topology]
multi_partition = true
default_partition = "wiki1"

[fanout]
mode = "concurrent"
max_concurrency = 2
partition_timeout_ms = 0
timeout_policy = "fail_fast"

[query]
default_source = "Document as doc"
key_columns = ["doc.space", "doc.name"]
locale_column = "doc.locale"

[materialize]
access_right = "view"
backfill = false
backfill_max_rounds = 4
"#;

/// `wiki1 = {A(5), A/fr(5), B(2)}`, `wiki2 = {C(8), D(1)}`.
///
/// Only alice and bob may search. Bob may not view `wiki2:Main.C`.
pub const TWO_WIKI_FIXTURE: &str = r#"{
	"feature_users": ["alice", "bob"],
	"partitions": [
		{
			"id": "wiki1",
			"records": [
				{ "doc.space": "Main", "doc.name": "A", "doc.locale": "", "score": 5, "title": "Alpha" },
				{ "doc.space": "Main", "doc.name": "A", "doc.locale": "fr", "score": 5, "title": "Alpha (fr)" },
				{ "doc.space": "Blog", "doc.name": "B", "doc.locale": "", "score": 2, "title": "Bravo" }
			]
		},
		{
			"id": "wiki2",
			"records": [
				{ "doc.space": "Main", "doc.name": "C", "doc.locale": "", "score": 8, "title": "Charlie" },
				{ "doc.space": "Main", "doc.name": "D", "doc.locale": "", "score": 1, "title": "Delta" }
			],
			"denied": [ { "user": "bob", "key": ["Main", "C"] } ]
		}
	]
}"#;

pub fn test_config() -> Result<Config> {
	Ok(gsearch_config::parse(TEST_CONFIG)?)
}

/// The two-wiki store, keyed the way `cfg` says.
pub fn two_wiki_store(cfg: &Config) -> Result<MemoryStore> {
	Ok(MemoryStore::from_json(
		TWO_WIKI_FIXTURE,
		cfg.query.key_columns.clone(),
		cfg.query.locale_column.clone(),
	)?)
}
