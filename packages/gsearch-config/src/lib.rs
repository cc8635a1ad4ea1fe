mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Fanout, Materialize, Query, Service, Topology};

use std::{collections::HashSet, fs, path::Path, sync::LazyLock};

use regex::Regex;

/// Partition ids end up in identifiers of the form "<partition>:<key>", so they never carry ':'.
pub const PARTITION_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$";

static PARTITION_ID: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(PARTITION_ID_PATTERN).ok());

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn is_valid_partition_id(value: &str) -> bool {
	PARTITION_ID.as_ref().map(|re| re.is_match(value)).unwrap_or(false)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if !is_valid_partition_id(&cfg.topology.default_partition) {
		return Err(Error::Validation {
			message: format!(
				"topology.default_partition must match {PARTITION_ID_PATTERN}, got {:?}.",
				cfg.topology.default_partition
			),
		});
	}

	if !matches!(cfg.fanout.mode.as_str(), "sequential" | "concurrent") {
		return Err(Error::Validation {
			message: "fanout.mode must be one of sequential or concurrent.".to_string(),
		});
	}
	if cfg.fanout.max_concurrency == 0 {
		return Err(Error::Validation {
			message: "fanout.max_concurrency must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.fanout.timeout_policy.as_str(), "fail_fast" | "degrade") {
		return Err(Error::Validation {
			message: "fanout.timeout_policy must be one of fail_fast or degrade.".to_string(),
		});
	}

	if cfg.query.default_source.trim().is_empty() {
		return Err(Error::Validation {
			message: "query.default_source must be non-empty.".to_string(),
		});
	}
	if cfg.query.key_columns.is_empty() {
		return Err(Error::Validation {
			message: "query.key_columns must be non-empty.".to_string(),
		});
	}

	let mut seen = HashSet::with_capacity(cfg.query.key_columns.len());

	for column in &cfg.query.key_columns {
		if column.trim().is_empty() || column.split_whitespace().count() != 1 {
			return Err(Error::Validation {
				message: format!("query.key_columns entry {column:?} must be a single column name."),
			});
		}
		if !seen.insert(column.as_str()) {
			return Err(Error::Validation {
				message: format!("query.key_columns contains duplicate column {column:?}."),
			});
		}
	}

	if let Some(locale) = cfg.query.locale_column.as_deref()
		&& seen.contains(locale)
	{
		return Err(Error::Validation {
			message: "query.locale_column must not repeat one of query.key_columns.".to_string(),
		});
	}

	if cfg.materialize.access_right.trim().is_empty() {
		return Err(Error::Validation {
			message: "materialize.access_right must be non-empty.".to_string(),
		});
	}
	if cfg.materialize.backfill && cfg.materialize.backfill_max_rounds == 0 {
		return Err(Error::Validation {
			message: "materialize.backfill_max_rounds must be greater than zero when backfill is enabled."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.query.locale_column.as_deref().map(|column| column.trim().is_empty()).unwrap_or(false) {
		cfg.query.locale_column = None;
	}

	for column in &mut cfg.query.key_columns {
		let trimmed = column.trim();

		if trimmed.len() != column.len() {
			*column = trimmed.to_string();
		}
	}
}
