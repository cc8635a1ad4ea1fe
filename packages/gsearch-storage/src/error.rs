#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unknown partition {0}.")]
	UnknownPartition(String),
	#[error("Unsupported query: {0}")]
	Query(String),
	#[error("Failed to read fixture file at {path:?}.")]
	ReadFixture { path: std::path::PathBuf, source: std::io::Error },
	#[error("Failed to parse fixture.")]
	ParseFixture(#[from] serde_json::Error),
	#[error(transparent)]
	Domain(#[from] gsearch_domain::Error),
}
