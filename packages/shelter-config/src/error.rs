pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read config file at {path:?}.")]
	ReadConfig { path: std::path::PathBuf, source: std::io::Error },
	#[error("Failed to parse config file at {path:?}.")]
	ParseConfig { path: std::path::PathBuf, source: toml::de::Error },
	#[error("Invalid value for {key}: {message}")]
	Validation { key: &'static str, message: String },
}
impl Error {
	pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
		Self::Validation { key, message: message.into() }
	}
}
