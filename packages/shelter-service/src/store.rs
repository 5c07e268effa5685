use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};

use shelter_domain::{
	AppendRequest, ListQuery, LogRecord, Selector, TimelineQuery, log::CRITICAL_LEVELS, query::Order,
};
use shelter_storage::{
	db::Db,
	models::{LogEntry, LogFilter, NewLog, TimelineFilter},
	queries,
};

use crate::{BoxFuture, Error, LogStore, Result};

/// [`LogStore`] over Postgres. Every call acquires one pooled transaction and ends it with
/// exactly one commit or rollback.
pub struct PostgresLogStore {
	db: Db,
}
impl PostgresLogStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	async fn append_entry(&self, req: &AppendRequest) -> Result<i64> {
		let mut tx = self.db.pool.begin().await?;
		let new = NewLog {
			raw_log: &req.raw_log,
			log_level: &req.log_level,
			source: &req.source,
			created_at: req.created_at,
			request_id: req.request_id.as_deref(),
			logger_name: req.logger_name.as_deref(),
		};
		let result = queries::append_log(&mut tx, &new).await;

		finish(tx, "append", result).await
	}

	async fn list_entries(&self, query: &ListQuery) -> Result<Vec<LogRecord>> {
		let window = query.page_window();
		let filter = LogFilter {
			sources: selected(query.sources()),
			levels: selected(query.levels()),
			after: query.after,
			before: query.before,
			request_id: query.request_id.as_deref(),
			logger_name: query.logger_name.as_deref(),
			descending: query.order == Order::Desc,
			limit: window.limit,
			offset: window.offset,
		};
		let mut tx = self.db.pool.begin().await?;
		let result = queries::list_logs(&mut tx, &filter).await;
		let rows = finish(tx, "list", result).await?;

		Ok(rows.into_iter().map(to_record).collect())
	}

	async fn timeline_entries(&self, query: &TimelineQuery) -> Result<Vec<LogRecord>> {
		let mut tx = self.db.pool.begin().await?;
		let result = correlate(&mut tx, query).await;
		let rows = finish(tx, "timeline", result).await?;

		Ok(rows.into_iter().map(to_record).collect())
	}

	async fn soft_delete_entries(&self, age: Duration) -> Result<u64> {
		let cutoff = OffsetDateTime::now_utc().checked_sub(age).ok_or_else(|| {
			Error::InvalidRequest { message: format!("Retention age {age} is out of range.") }
		})?;
		let mut tx = self.db.pool.begin().await?;
		let result = queries::soft_delete_older_than(&mut tx, cutoff).await;

		finish(tx, "soft_delete_older_than", result).await
	}
}

impl LogStore for PostgresLogStore {
	fn append<'a>(&'a self, req: &'a AppendRequest) -> BoxFuture<'a, Result<i64>> {
		Box::pin(self.append_entry(req))
	}

	fn list<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>> {
		Box::pin(self.list_entries(query))
	}

	fn timeline<'a>(&'a self, query: &'a TimelineQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>> {
		Box::pin(self.timeline_entries(query))
	}

	fn soft_delete_older_than(&self, age: Duration) -> BoxFuture<'_, Result<u64>> {
		Box::pin(self.soft_delete_entries(age))
	}
}

async fn correlate(
	tx: &mut Transaction<'_, Postgres>,
	query: &TimelineQuery,
) -> Result<Vec<LogEntry>> {
	let Some(anchor) = queries::fetch_anchor(tx, query.id).await? else {
		return Ok(Vec::new());
	};
	let window = query.window_around(anchor.created_at)?;
	let filter = TimelineFilter {
		levels: &CRITICAL_LEVELS,
		request_id: anchor.request_id.as_deref(),
		source: &anchor.source,
		start: window.start,
		end: window.end,
	};

	Ok(queries::timeline_logs(tx, &filter).await?)
}

async fn finish<T, E>(
	tx: Transaction<'_, Postgres>,
	op: &'static str,
	result: std::result::Result<T, E>,
) -> Result<T>
where
	E: Into<Error>,
{
	match result {
		Ok(value) => {
			tx.commit().await?;

			Ok(value)
		},
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::warn!(error = %rollback_err, op, "Failed to roll back transaction.");
			}

			Err(err.into())
		},
	}
}

fn selected(selector: Selector<'_>) -> Option<&[String]> {
	match selector {
		Selector::Any => None,
		Selector::OneOf(values) => Some(values),
	}
}

fn to_record(entry: LogEntry) -> LogRecord {
	LogRecord {
		id: entry.id,
		raw_log: entry.raw_log,
		log_level: entry.log_level,
		source: entry.source,
		created_at: entry.created_at,
		request_id: entry.request_id,
		logger_name: entry.logger_name,
		is_deleted: entry.is_deleted,
	}
}
