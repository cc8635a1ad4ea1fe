use std::{path::PathBuf, sync::Arc};

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gsearch_config::Config;
use gsearch_domain::{QueryDescriptor, Value};
use gsearch_service::{Caller, Collaborators, GlobalSearch, RecordQuery};
use gsearch_storage::memory::MemoryStore;

#[derive(Debug, Parser)]
#[command(
	version = gsearch_cli::VERSION,
	rename_all = "kebab",
	styles = gsearch_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON fixture describing the partitions and their records.
	#[arg(long, short = 'f', value_name = "FILE")]
	pub fixture: PathBuf,
	#[arg(long, short = 'u', value_name = "NAME", default_value = "admin")]
	pub user: String,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run a full query and print the merged page of rows.
	Rows(RowsArgs),
	/// Run a condition and print the matching records.
	Records(RecordArgs),
	/// Run a condition and print `<partition>:<key>` identifiers.
	Names(RecordArgs),
}

#[derive(Debug, ClapArgs)]
pub struct RowsArgs {
	#[arg(long, short = 'q')]
	pub query: String,
	#[command(flatten)]
	pub window: WindowArgs,
}

#[derive(Debug, ClapArgs)]
pub struct RecordArgs {
	/// Filter condition, optionally ending in `order by`. A full `select` is used as is.
	#[arg(long, default_value = "")]
	pub condition: String,
	#[arg(long)]
	pub distinct_by_locale: bool,
	#[arg(long)]
	pub check_rights: bool,
	#[command(flatten)]
	pub window: WindowArgs,
}

#[derive(Debug, ClapArgs)]
pub struct WindowArgs {
	#[arg(long, default_value_t = 0)]
	pub start: usize,
	/// 0 returns everything.
	#[arg(long, default_value_t = 0)]
	pub max: usize,
	#[arg(long = "partition", value_name = "ID")]
	pub partitions: Vec<String>,
	/// Positional parameter bound to a `?` placeholder. Parsed as JSON, else taken as text.
	#[arg(long = "param", value_name = "VALUE")]
	pub parameters: Vec<String>,
}
impl WindowArgs {
	fn parameters(&self) -> Vec<Value> {
		self.parameters
			.iter()
			.map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::Text(raw.clone())))
			.collect()
	}

	fn record_query(&self, args: &RecordArgs) -> RecordQuery {
		RecordQuery {
			condition: args.condition.clone(),
			parameters: self.parameters(),
			partitions: self.partitions.iter().map(|id| id.as_str().into()).collect(),
			start: self.start,
			max: self.max,
			distinct_by_locale: args.distinct_by_locale,
			check_rights: args.check_rights,
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = gsearch_config::load(&args.config)?;
	init_tracing(&config)?;
	let output = execute(&args, config).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

/// Runs the selected command against the fixture store and returns its JSON response.
pub async fn execute(args: &Args, config: Config) -> color_eyre::Result<serde_json::Value> {
	let store = MemoryStore::load(
		&args.fixture,
		config.query.key_columns.clone(),
		config.query.locale_column.clone(),
	)?;
	tracing::info!(
		fixture = %args.fixture.display(),
		partitions = store.partition_ids().len(),
		"Fixture loaded."
	);
	let search = GlobalSearch::new(config, Collaborators::memory(Arc::new(store)));
	let mut ctx = search.context(Caller::new(args.user.as_str()));

	let output = match &args.command {
		Command::Rows(rows) => {
			let descriptor = QueryDescriptor::new(rows.query.as_str())
				.with_parameters(rows.window.parameters())
				.with_partitions(rows.window.partitions.iter().map(String::as_str))
				.with_window(rows.window.start, rows.window.max);
			serde_json::to_value(search.search(&mut ctx, &descriptor).await?)?
		},
		Command::Records(records) => {
			let query = records.window.record_query(records);
			serde_json::to_value(search.search_records(&mut ctx, &query).await?)?
		},
		Command::Names(names) => {
			let query = names.window.record_query(names);
			serde_json::to_value(search.search_identifiers(&mut ctx, &query).await?)?
		},
	};

	Ok(output)
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
	Ok(())
}
