pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] gsearch_config::Error),

	#[error(transparent)]
	Storage(#[from] gsearch_storage::Error),
}
