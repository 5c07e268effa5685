use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub logger: Logger,
	pub service: Service,
	pub storage: Storage,
	pub nats: Nats,
	#[serde(default)]
	pub ingest: Ingest,
	#[serde(default)]
	pub notifications: Notifications,
	pub retention: Retention,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Logger {
	/// Human-readable output with source locations instead of JSON lines.
	pub developer_mode: bool,
	/// `EnvFilter` directive. Falls back to `debug` in developer mode and `info` otherwise.
	pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub elasticsearch: Elasticsearch,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Elasticsearch {
	pub url: String,
	#[serde(default = "default_index_prefix")]
	pub index_prefix: String,
	pub username: Option<String>,
	pub password: Option<String>,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Nats {
	pub url: String,
	pub username: Option<String>,
	pub password: Option<String>,
	/// Root of every subject the service publishes or subscribes to.
	#[serde(default = "default_subject_prefix")]
	pub subject_prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ingest {
	pub stream: String,
	pub consumer: String,
	pub batch_size: u32,
	pub max_wait_ms: u64,
}
impl Default for Ingest {
	fn default() -> Self {
		Self {
			stream: "log_shelter_append".to_string(),
			consumer: "append_stream".to_string(),
			batch_size: 100,
			max_wait_ms: 100,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Notifications {
	pub enabled: bool,
	pub api_base: String,
	pub api_key: Option<String>,
	/// Levels that trigger a notification, compared verbatim against `log_level`.
	pub levels: Vec<String>,
	/// Telegram chat ids.
	pub recipients: Vec<i64>,
	pub timeout_ms: u64,
}
impl Default for Notifications {
	fn default() -> Self {
		Self {
			enabled: false,
			api_base: "https://api.telegram.org".to_string(),
			api_key: None,
			levels: vec!["CRITICAL".to_string(), "FATAL".to_string()],
			recipients: Vec::new(),
			timeout_ms: default_timeout_ms(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Retention {
	/// Only `after_time` is supported. Other values stop the sweeper at runtime.
	pub policy: String,
	pub delete_after_seconds: u64,
	pub cycle_time_seconds: u64,
}

fn default_index_prefix() -> String {
	"log_shelter".to_string()
}

fn default_subject_prefix() -> String {
	"log_shelter".to_string()
}

fn default_timeout_ms() -> u64 {
	5_000
}
