pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Malformed query: {0}")]
	MalformedQuery(#[from] gsearch_domain::Error),
	#[error("Partition {partition} failed: {message}")]
	Partition { partition: String, message: String },
	#[error("Partition {partition} timed out after {timeout_ms} ms.")]
	PartitionTimeout { partition: String, timeout_ms: u64 },
	#[error("Topology error: {message}")]
	Topology { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Fan-out task failed: {message}")]
	Task { message: String },
}
