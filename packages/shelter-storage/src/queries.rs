//! Statements over the `logs` relation.
//!
//! Every function runs on a caller-supplied connection, usually `&mut *tx`, and never begins,
//! commits or rolls back a transaction itself.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
	Result,
	models::{LogEntry, LogFilter, NewLog, TimelineFilter},
};

const LOG_COLUMNS: &str =
	"id, raw_log, log_level, source, created_at, request_id, logger_name, is_deleted";

pub async fn append_log(conn: &mut PgConnection, log: &NewLog<'_>) -> Result<i64> {
	let id: i64 = sqlx::query_scalar(
		"\
INSERT INTO logs (raw_log, log_level, source, created_at, request_id, logger_name)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id",
	)
	.bind(log.raw_log)
	.bind(log.log_level)
	.bind(log.source)
	.bind(log.created_at)
	.bind(log.request_id)
	.bind(log.logger_name)
	.fetch_one(conn)
	.await?;

	Ok(id)
}

pub async fn list_logs(conn: &mut PgConnection, filter: &LogFilter<'_>) -> Result<Vec<LogEntry>> {
	if filter.limit <= 0 || filter.offset < 0 {
		return Err(crate::Error::InvalidArgument(format!(
			"Page window must have a positive limit and a non-negative offset, got limit {} and offset {}.",
			filter.limit, filter.offset
		)));
	}

	let mut builder = list_query(filter);
	let rows = builder.build_query_as::<LogEntry>().fetch_all(conn).await?;

	Ok(rows)
}

/// Loads a live timeline anchor. Soft-deleted entries are treated as absent.
pub async fn fetch_anchor(conn: &mut PgConnection, id: i64) -> Result<Option<LogEntry>> {
	let sql = format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = $1 AND is_deleted = false");
	let row = sqlx::query_as::<_, LogEntry>(&sql).bind(id).fetch_optional(conn).await?;

	Ok(row)
}

pub async fn timeline_logs(
	conn: &mut PgConnection,
	filter: &TimelineFilter<'_>,
) -> Result<Vec<LogEntry>> {
	let sql = format!(
		"\
SELECT {LOG_COLUMNS}
FROM logs
WHERE is_deleted = false
	AND log_level = ANY($1)
	AND (
		($2::text IS NOT NULL AND request_id = $2::text)
		OR (source = $3 AND created_at >= $4 AND created_at <= $5)
	)
ORDER BY created_at ASC, id ASC"
	);
	let rows = sqlx::query_as::<_, LogEntry>(&sql)
		.bind(filter.levels)
		.bind(filter.request_id)
		.bind(filter.source)
		.bind(filter.start)
		.bind(filter.end)
		.fetch_all(conn)
		.await?;

	Ok(rows)
}

/// Flags live entries created before `cutoff` as deleted and returns how many changed.
pub async fn soft_delete_older_than(
	conn: &mut PgConnection,
	cutoff: OffsetDateTime,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE logs
SET is_deleted = true
WHERE created_at < $1 AND is_deleted = false",
	)
	.bind(cutoff)
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}

fn list_query<'a>(filter: &LogFilter<'a>) -> QueryBuilder<'a, Postgres> {
	let mut builder =
		QueryBuilder::new(format!("SELECT {LOG_COLUMNS} FROM logs WHERE is_deleted = false"));

	if let Some(sources) = filter.sources {
		builder.push(" AND source = ANY(").push_bind(sources).push(")");
	}
	if let Some(levels) = filter.levels {
		builder.push(" AND log_level = ANY(").push_bind(levels).push(")");
	}
	if let Some(after) = filter.after {
		builder.push(" AND created_at >= ").push_bind(after);
	}
	if let Some(before) = filter.before {
		builder.push(" AND created_at <= ").push_bind(before);
	}
	if let Some(request_id) = filter.request_id {
		builder.push(" AND request_id = ").push_bind(request_id);
	}
	if let Some(logger_name) = filter.logger_name {
		builder.push(" AND logger_name = ").push_bind(logger_name);
	}

	let direction = if filter.descending { "DESC" } else { "ASC" };

	builder.push(format!(" ORDER BY created_at {direction}, id {direction}"));
	builder.push(" LIMIT ").push_bind(filter.limit);
	builder.push(" OFFSET ").push_bind(filter.offset);

	builder
}
