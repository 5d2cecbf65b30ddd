pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Configuration error: {message}")]
	Config { message: String },
}
impl From<lyra_storage::Error> for Error {
	fn from(err: lyra_storage::Error) -> Self {
		match err {
			lyra_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			lyra_storage::Error::Qdrant(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
