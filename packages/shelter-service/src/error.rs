use shelter_domain::{ChangeError, QueryError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Decode error: {message}")]
	Decode { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Search index error: {message}")]
	SearchIndex { message: String },
	#[error("Notification error: {message}")]
	Notification { message: String },
	#[error("Delivery error: {message}")]
	Delivery { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<shelter_storage::Error> for Error {
	fn from(err: shelter_storage::Error) -> Self {
		match err {
			shelter_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			shelter_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Decode { message: err.to_string() }
	}
}

impl From<ChangeError> for Error {
	fn from(err: ChangeError) -> Self {
		Self::Decode { message: err.to_string() }
	}
}

impl From<QueryError> for Error {
	fn from(err: QueryError) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
