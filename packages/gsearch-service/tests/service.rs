use std::{
	collections::HashSet,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use gsearch_config::Config;
use gsearch_domain::{PartitionId, QueryDescriptor, Value};
use gsearch_service::{
	AccessChecker, BoxFuture, Caller, Collaborators, Error, GlobalSearch, PartitionStore,
	RecordQuery, Topology,
};
use gsearch_storage::{
	memory::MemoryStore,
	models::{Record, RecordKey},
};

const SCORE_QUERY: &str = "select distinct doc.name, score from Document as doc order by score desc";

/// Delegates to the memory store, except that `failing` partitions error out.
struct FailingStore {
	inner: Arc<MemoryStore>,
	failing: HashSet<PartitionId>,
}
impl PartitionStore for FailingStore {
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>> {
		Box::pin(async move {
			if self.failing.contains(partition) {
				return Err(color_eyre::eyre::eyre!("connection reset"));
			}

			Ok(self.inner.as_ref().query(partition, query, row_cap, parameters)?)
		})
	}

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move { Ok(self.inner.as_ref().load_by_key(partition, key)?) })
	}
}

/// Delegates to the memory store, sleeping first on `slow` partitions.
struct SlowStore {
	inner: Arc<MemoryStore>,
	slow: PartitionId,
	delay: Duration,
}
impl PartitionStore for SlowStore {
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>> {
		Box::pin(async move {
			if partition == &self.slow {
				tokio::time::sleep(self.delay).await;
			}

			Ok(self.inner.as_ref().query(partition, query, row_cap, parameters)?)
		})
	}

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move { Ok(self.inner.as_ref().load_by_key(partition, key)?) })
	}
}

/// Delegates to the memory store, sleeping only on the first query sent to `slow`.
struct FirstCallSlowStore {
	inner: Arc<MemoryStore>,
	slow: PartitionId,
	delay: Duration,
	calls: AtomicUsize,
}
impl PartitionStore for FirstCallSlowStore {
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>> {
		let first = partition == &self.slow && self.calls.fetch_add(1, Ordering::SeqCst) == 0;

		Box::pin(async move {
			if first {
				tokio::time::sleep(self.delay).await;
			}

			Ok(self.inner.as_ref().query(partition, query, row_cap, parameters)?)
		})
	}

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move { Ok(self.inner.as_ref().load_by_key(partition, key)?) })
	}
}

/// A fixed partition list, valid or not.
struct FixedTopology(Vec<PartitionId>);
impl Topology for FixedTopology {
	fn list_partitions<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<PartitionId>>> {
		Box::pin(async move { Ok(self.0.clone()) })
	}
}

/// Records every query call and every record load.
struct SpyStore {
	inner: Arc<MemoryStore>,
	queries: Mutex<Vec<(PartitionId, usize)>>,
	loads: AtomicUsize,
}
impl SpyStore {
	fn new(inner: Arc<MemoryStore>) -> Self {
		Self { inner, queries: Mutex::new(Vec::new()), loads: AtomicUsize::new(0) }
	}

	fn queried(&self) -> Vec<(PartitionId, usize)> {
		let mut calls = self.queries.lock().unwrap_or_else(|err| err.into_inner()).clone();

		calls.sort();

		calls
	}

	fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}
impl PartitionStore for SpyStore {
	fn query<'a>(
		&'a self,
		partition: &'a PartitionId,
		query: &'a str,
		row_cap: usize,
		parameters: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<Value>>>> {
		self.queries
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((partition.clone(), row_cap));

		Box::pin(async move { Ok(self.inner.as_ref().query(partition, query, row_cap, parameters)?) })
	}

	fn load_by_key<'a>(
		&'a self,
		partition: &'a PartitionId,
		key: &'a RecordKey,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(self.inner.as_ref().load_by_key(partition, key)?) })
	}
}

/// Every feature and record check errors out.
struct BrokenAccess;
impl AccessChecker for BrokenAccess {
	fn feature_allowed<'a>(&'a self, _caller: &'a Caller) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Err(color_eyre::eyre::eyre!("rights service unavailable")) })
	}

	fn check_access<'a>(
		&'a self,
		_caller: &'a Caller,
		_right: &'a str,
		_record: &'a Record,
	) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Err(color_eyre::eyre::eyre!("rights service unavailable")) })
	}
}

/// Lets everyone use search, but every per-record check errors out.
struct FlakyRecordAccess;
impl AccessChecker for FlakyRecordAccess {
	fn feature_allowed<'a>(&'a self, _caller: &'a Caller) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Ok(true) })
	}

	fn check_access<'a>(
		&'a self,
		_caller: &'a Caller,
		_right: &'a str,
		_record: &'a Record,
	) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Err(color_eyre::eyre::eyre!("rights service unavailable")) })
	}
}

fn config() -> Config {
	gsearch_testkit::test_config().expect("test config parses")
}

fn memory(cfg: &Config) -> Arc<MemoryStore> {
	Arc::new(gsearch_testkit::two_wiki_store(cfg).expect("fixture loads"))
}

fn service(cfg: Config) -> GlobalSearch {
	let store = memory(&cfg);

	GlobalSearch::new(cfg, Collaborators::memory(store))
}

fn with_store(cfg: Config, store: Arc<dyn PartitionStore>) -> GlobalSearch {
	let memory = memory(&cfg);
	let collaborators = Collaborators { store, topology: memory.clone(), access: memory };

	GlobalSearch::new(cfg, collaborators)
}

fn names(rows: &[gsearch_domain::ResultRow]) -> Vec<String> {
	rows.iter().map(|row| row.values()[0].to_string()).collect()
}

#[tokio::test]
async fn two_partition_page_matches_in_both_fanout_modes() {
	for mode in ["concurrent", "sequential"] {
		let mut cfg = config();

		cfg.fanout.mode = mode.to_string();

		let search = service(cfg);
		let mut ctx = search.context(Caller::new("alice"));
		let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
		let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

		assert_eq!(names(&response.rows), vec!["C", "A"], "mode {mode}");
		assert_eq!(response.partitions, vec![PartitionId::from("wiki1"), PartitionId::from("wiki2")]);
		assert!(response.degraded.is_empty());
		assert_eq!(ctx.active_partition().as_str(), "wiki1");
	}
}

#[tokio::test]
async fn later_page_is_cut_from_the_global_order() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(1, 3);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert_eq!(names(&response.rows), vec!["A", "B", "D"]);

	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(10, 3);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert!(response.rows.is_empty());
}

#[tokio::test]
async fn every_partition_is_asked_for_the_window_end() {
	let cfg = config();
	let spy = Arc::new(SpyStore::new(memory(&cfg)));
	let search = with_store(cfg, spy.clone());
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(1, 2);

	search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert_eq!(
		spy.queried(),
		vec![(PartitionId::from("wiki1"), 3), (PartitionId::from("wiki2"), 3)]
	);
}

#[tokio::test]
async fn failing_partition_aborts_the_whole_query() {
	for mode in ["concurrent", "sequential"] {
		let mut cfg = config();

		cfg.fanout.mode = mode.to_string();

		let store = FailingStore {
			inner: memory(&cfg),
			failing: HashSet::from([PartitionId::from("wiki2")]),
		};
		let search = with_store(cfg, Arc::new(store));
		let mut ctx = search.context(Caller::new("alice"));
		let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
		let err = search.search(&mut ctx, &descriptor).await.expect_err("wiki2 fails");

		match err {
			Error::Partition { partition, message } => {
				assert_eq!(partition, "wiki2");
				assert!(message.contains("connection reset"), "unexpected message: {message}");
			},
			other => panic!("unexpected error: {other}"),
		}

		assert_eq!(ctx.active_partition().as_str(), "wiki1", "mode {mode}");
	}
}

#[tokio::test]
async fn slow_partition_fails_fast_by_default() {
	let mut cfg = config();

	cfg.fanout.partition_timeout_ms = 50;

	let store = SlowStore {
		inner: memory(&cfg),
		slow: PartitionId::from("wiki2"),
		delay: Duration::from_secs(5),
	};
	let search = with_store(cfg, Arc::new(store));
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
	let err = search.search(&mut ctx, &descriptor).await.expect_err("wiki2 times out");

	assert!(
		matches!(err, Error::PartitionTimeout { ref partition, timeout_ms: 50 } if partition == "wiki2"),
		"unexpected error: {err}"
	);
}

#[tokio::test]
async fn slow_partition_is_skipped_under_degrade_policy() {
	for mode in ["concurrent", "sequential"] {
		let mut cfg = config();

		cfg.fanout.mode = mode.to_string();
		cfg.fanout.partition_timeout_ms = 50;
		cfg.fanout.timeout_policy = "degrade".to_string();

		let store = SlowStore {
			inner: memory(&cfg),
			slow: PartitionId::from("wiki2"),
			delay: Duration::from_secs(5),
		};
		let search = with_store(cfg, Arc::new(store));
		let mut ctx = search.context(Caller::new("alice"));
		let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
		let response = search.search(&mut ctx, &descriptor).await.expect("degraded search succeeds");

		assert_eq!(names(&response.rows), vec!["A", "B"], "mode {mode}");
		assert_eq!(response.degraded, vec![PartitionId::from("wiki2")]);
	}
}

#[tokio::test]
async fn callers_without_the_feature_get_empty_results() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("carol"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
	let response = search.search(&mut ctx, &descriptor).await.expect("gate never errors");

	assert!(response.rows.is_empty());
	assert!(response.partitions.is_empty());

	let query = RecordQuery { condition: "order by doc.name".to_string(), ..Default::default() };
	let records = search.search_records(&mut ctx, &query).await.expect("gate never errors");
	let identifiers = search.search_identifiers(&mut ctx, &query).await.expect("gate never errors");

	assert!(records.records.is_empty());
	assert!(identifiers.identifiers.is_empty());
}

#[tokio::test]
async fn failing_feature_check_is_treated_as_denial() {
	let cfg = config();
	let memory = memory(&cfg);
	let collaborators =
		Collaborators { store: memory.clone(), topology: memory, access: Arc::new(BrokenAccess) };
	let search = GlobalSearch::new(cfg, collaborators);
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 2);
	let response = search.search(&mut ctx, &descriptor).await.expect("gate never errors");

	assert!(response.rows.is_empty());
}

#[tokio::test]
async fn records_carry_identifiers_and_full_fields() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let query = RecordQuery {
		condition: "order by score desc".to_string(),
		start: 0,
		max: 2,
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");
	let identifiers =
		response.records.iter().map(|record| record.identifier.as_str()).collect::<Vec<_>>();

	assert_eq!(identifiers, vec!["wiki2:Main.C", "wiki1:Main.A"]);
	assert_eq!(response.records[0].partition.as_str(), "wiki2");
	assert_eq!(response.records[0].record.field("title"), Some(&Value::from("Charlie")));
	assert_eq!(ctx.active_partition().as_str(), "wiki1");
}

#[tokio::test]
async fn rights_filtering_shrinks_the_page_without_backfill() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("bob"));
	let query = RecordQuery {
		condition: "order by score desc".to_string(),
		start: 0,
		max: 2,
		check_rights: true,
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");
	let identifiers =
		response.records.iter().map(|record| record.identifier.as_str()).collect::<Vec<_>>();

	assert_eq!(identifiers, vec!["wiki1:Main.A"]);
}

#[tokio::test]
async fn backfill_fills_the_page_over_visible_records() {
	let mut cfg = config();

	cfg.materialize.backfill = true;

	let spy = Arc::new(SpyStore::new(memory(&cfg)));
	let search = with_store(cfg, spy.clone());
	let mut ctx = search.context(Caller::new("bob"));
	let query = RecordQuery {
		condition: "order by score desc".to_string(),
		start: 0,
		max: 2,
		check_rights: true,
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");
	let identifiers =
		response.records.iter().map(|record| record.identifier.as_str()).collect::<Vec<_>>();

	assert_eq!(identifiers, vec!["wiki1:Main.A", "wiki1:Blog.B"]);
	// Round one loads C and A, round two only the new tail B and D.
	assert_eq!(spy.loads(), 4);
	assert_eq!(
		spy.queried(),
		vec![
			(PartitionId::from("wiki1"), 2),
			(PartitionId::from("wiki1"), 4),
			(PartitionId::from("wiki2"), 2),
			(PartitionId::from("wiki2"), 4),
		]
	);
}

#[tokio::test]
async fn failing_record_checks_drop_records() {
	let cfg = config();
	let memory = memory(&cfg);
	let collaborators = Collaborators {
		store: memory.clone(),
		topology: memory,
		access: Arc::new(FlakyRecordAccess),
	};
	let search = GlobalSearch::new(cfg, collaborators);
	let mut ctx = search.context(Caller::new("alice"));
	let query = RecordQuery {
		condition: "order by score desc".to_string(),
		max: 2,
		check_rights: true,
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");

	assert!(response.records.is_empty());
}

#[tokio::test]
async fn identifiers_skip_record_loads_unless_rights_are_checked() {
	let cfg = config();
	let spy = Arc::new(SpyStore::new(memory(&cfg)));
	let search = with_store(cfg, spy.clone());
	let mut ctx = search.context(Caller::new("bob"));
	let mut query =
		RecordQuery { condition: "order by doc.name".to_string(), ..Default::default() };
	let response = search.search_identifiers(&mut ctx, &query).await.expect("search succeeds");

	assert_eq!(
		response.identifiers,
		vec!["wiki1:Main.A", "wiki1:Blog.B", "wiki2:Main.C", "wiki2:Main.D"]
	);
	assert_eq!(spy.loads(), 0);

	query.check_rights = true;

	let response = search.search_identifiers(&mut ctx, &query).await.expect("search succeeds");

	assert_eq!(response.identifiers, vec!["wiki1:Main.A", "wiki1:Blog.B", "wiki2:Main.D"]);
	assert_eq!(spy.loads(), 4);
}

#[tokio::test]
async fn distinct_by_locale_returns_each_variant() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let mut query = RecordQuery {
		condition: "doc.name = ?".to_string(),
		parameters: vec![Value::from("A")],
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");

	assert_eq!(response.records.len(), 1);

	query.distinct_by_locale = true;

	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");
	let titles = response
		.records
		.iter()
		.map(|record| record.record.field("title").map(Value::to_string).unwrap_or_default())
		.collect::<Vec<_>>();

	assert_eq!(titles, vec!["Alpha", "Alpha (fr)"]);
	assert!(response.records.iter().all(|record| record.identifier == "wiki1:Main.A"));
}

#[tokio::test]
async fn explicit_partitions_override_the_topology() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor =
		QueryDescriptor::new(SCORE_QUERY).with_partitions(["wiki2"]).with_window(0, 10);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert_eq!(names(&response.rows), vec!["C", "D"]);
	assert_eq!(response.partitions, vec![PartitionId::from("wiki2")]);

	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_partitions(["wiki:2"]);
	let err = search.search(&mut ctx, &descriptor).await.expect_err("invalid partition id");

	assert!(matches!(err, Error::InvalidRequest { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn single_partition_mode_only_queries_the_default() {
	let mut cfg = config();

	cfg.topology.multi_partition = false;

	let search = service(cfg);
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert_eq!(names(&response.rows), vec!["A", "B"]);
	assert_eq!(response.partitions, vec![PartitionId::from("wiki1")]);
}

#[tokio::test]
async fn malformed_queries_are_rejected() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new("select * from Document as doc");
	let err = search.search(&mut ctx, &descriptor).await.expect_err("wildcard is rejected");

	assert!(matches!(err, Error::MalformedQuery(_)), "unexpected error: {err}");

	let query = RecordQuery {
		condition: "select doc.name from Document as doc".to_string(),
		..Default::default()
	};
	let err = search.search_records(&mut ctx, &query).await.expect_err("key column missing");

	assert!(matches!(err, Error::InvalidRequest { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn responses_serialize_with_rfc3339_timestamps() {
	let search = service(config());
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, 1);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");
	let json = serde_json::to_value(&response).expect("response serializes");

	assert_eq!(json["trace_id"], serde_json::json!(response.trace_id.to_string()));
	assert!(json["created_at"].as_str().map(|raw| raw.contains('T')).unwrap_or(false));
	assert_eq!(json["rows"][0]["partition"], serde_json::json!("wiki2"));
	assert_eq!(json["rows"][0]["values"], serde_json::json!(["C", 8]));
}

#[tokio::test]
async fn missing_scores_sort_last_and_never_hide_the_top_row() {
	let cfg = config();
	let store = MemoryStore::from_json(
		r#"{
			"partitions": [
				{ "id": "w1", "records": [ { "doc.space": "Main", "doc.name": "one", "score": 1 } ] },
				{ "id": "w2", "records": [ { "doc.space": "Main", "doc.name": "noscore" } ] },
				{ "id": "w3", "records": [ { "doc.space": "Main", "doc.name": "nine", "score": 9 } ] }
			]
		}"#,
		cfg.query.key_columns.clone(),
		cfg.query.locale_column.clone(),
	)
	.expect("fixture loads");
	let search = GlobalSearch::new(cfg, Collaborators::memory(Arc::new(store)));
	let mut ctx = search.context(Caller::new("alice"));

	for max in [2, 0] {
		let descriptor = QueryDescriptor::new(SCORE_QUERY).with_window(0, max);
		let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");
		let expected = if max == 2 { vec!["nine", "one"] } else { vec!["nine", "one", "noscore"] };

		assert_eq!(names(&response.rows), expected, "max {max}");
	}
}

#[tokio::test]
async fn backfill_rewalks_partitions_that_recover_from_a_timeout() {
	let mut cfg = config();

	cfg.materialize.backfill = true;
	cfg.fanout.partition_timeout_ms = 50;
	cfg.fanout.timeout_policy = "degrade".to_string();

	let store = FirstCallSlowStore {
		inner: memory(&cfg),
		slow: PartitionId::from("wiki1"),
		delay: Duration::from_secs(5),
		calls: AtomicUsize::new(0),
	};
	let search = with_store(cfg, Arc::new(store));
	let mut ctx = search.context(Caller::new("bob"));
	let query = RecordQuery {
		condition: "order by score desc".to_string(),
		max: 2,
		check_rights: true,
		..Default::default()
	};
	let response = search.search_records(&mut ctx, &query).await.expect("search succeeds");
	let identifiers =
		response.records.iter().map(|record| record.identifier.as_str()).collect::<Vec<_>>();

	// Round one only hears from wiki2 (C denied, D), round two adds A and B ahead of D.
	assert_eq!(identifiers, vec!["wiki1:Main.A", "wiki1:Blog.B"]);
	assert!(response.degraded.is_empty());
}

#[tokio::test]
async fn topology_ids_that_break_identifiers_are_skipped() {
	let cfg = config();
	let memory = memory(&cfg);
	let collaborators = Collaborators {
		store: memory.clone(),
		topology: Arc::new(FixedTopology(vec![
			PartitionId::from("wiki:2"),
			PartitionId::from("wiki1"),
		])),
		access: memory,
	};
	let search = GlobalSearch::new(cfg, collaborators);
	let mut ctx = search.context(Caller::new("alice"));
	let descriptor = QueryDescriptor::new(SCORE_QUERY);
	let response = search.search(&mut ctx, &descriptor).await.expect("search succeeds");

	assert_eq!(response.partitions, vec![PartitionId::from("wiki1")]);
	assert_eq!(names(&response.rows), vec!["A", "B"]);
}
