use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Levels the timeline query correlates around an anchor entry.
pub const CRITICAL_LEVELS: [&str; 4] = ["WARN", "ERROR", "CRITICAL", "FATAL"];

pub fn is_critical_level(level: &str) -> bool {
	CRITICAL_LEVELS.contains(&level)
}

/// A producer-submitted log line that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRequest {
	pub raw_log: String,
	pub log_level: String,
	pub source: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logger_name: Option<String>,
}

/// A persisted log entry as returned to query clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
	pub id: i64,
	pub raw_log: String,
	pub log_level: String,
	pub source: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub request_id: Option<String>,
	pub logger_name: Option<String>,
	pub is_deleted: bool,
}

/// What the notifier receives for an entry whose level is configured to alert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyIntent {
	pub raw_log: String,
	pub log_level: String,
	pub source: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logger_name: Option<String>,
}
impl From<&AppendRequest> for NotifyIntent {
	fn from(req: &AppendRequest) -> Self {
		Self {
			raw_log: req.raw_log.clone(),
			log_level: req.log_level.clone(),
			source: req.source.clone(),
			request_id: req.request_id.clone(),
			logger_name: req.logger_name.clone(),
		}
	}
}
