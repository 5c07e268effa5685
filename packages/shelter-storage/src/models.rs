use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct LogEntry {
	pub id: i64,
	pub raw_log: String,
	pub log_level: String,
	pub source: String,
	pub created_at: OffsetDateTime,
	pub request_id: Option<String>,
	pub logger_name: Option<String>,
	pub is_deleted: bool,
}

#[derive(Debug)]
pub struct NewLog<'a> {
	pub raw_log: &'a str,
	pub log_level: &'a str,
	pub source: &'a str,
	pub created_at: OffsetDateTime,
	pub request_id: Option<&'a str>,
	pub logger_name: Option<&'a str>,
}

/// Listing predicates. `None` for `sources`/`levels` disables that filter; an empty slice
/// matches nothing.
#[derive(Debug, Default)]
pub struct LogFilter<'a> {
	pub sources: Option<&'a [String]>,
	pub levels: Option<&'a [String]>,
	pub after: Option<OffsetDateTime>,
	pub before: Option<OffsetDateTime>,
	pub request_id: Option<&'a str>,
	pub logger_name: Option<&'a str>,
	pub descending: bool,
	pub limit: i64,
	pub offset: i64,
}

/// Entries correlated with a timeline anchor: same request id, or same source inside
/// `[start, end]`, restricted to `levels`.
#[derive(Debug)]
pub struct TimelineFilter<'a> {
	pub levels: &'a [&'a str],
	pub request_id: Option<&'a str>,
	pub source: &'a str,
	pub start: OffsetDateTime,
	pub end: OffsetDateTime,
}
