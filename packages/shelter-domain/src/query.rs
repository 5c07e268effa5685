use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const WILDCARD: &str = "*";
pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 1_000;
pub const DEFAULT_TIMELINE_SPAN: Duration = Duration::SECOND;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
	#[error("{field} must not be negative.")]
	NegativeWindow { field: &'static str },
	#[error("Timeline window around {anchor} is out of range.")]
	WindowOutOfRange { anchor: OffsetDateTime },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
	#[default]
	Asc,
	Desc,
}

/// Membership filter over a string column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector<'a> {
	Any,
	OneOf(&'a [String]),
}
impl<'a> Selector<'a> {
	/// A list containing `*` selects everything; any other list, including an empty one, is an
	/// exact membership test.
	pub fn from_values(values: &'a [String]) -> Self {
		if values.iter().any(|value| value == WILDCARD) { Self::Any } else { Self::OneOf(values) }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
	pub limit: i64,
	pub offset: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
	/// 1-based. Page 0 is read as the first page.
	#[serde(default)]
	pub page: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_size: Option<u64>,
	#[serde(default)]
	pub sources: Vec<String>,
	#[serde(default)]
	pub levels: Vec<String>,
	#[serde(default, with = "crate::time_serde::option", skip_serializing_if = "Option::is_none")]
	pub before: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option", skip_serializing_if = "Option::is_none")]
	pub after: Option<OffsetDateTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logger_name: Option<String>,
	#[serde(default)]
	pub order: Order,
}
impl ListQuery {
	pub fn sources(&self) -> Selector<'_> {
		Selector::from_values(&self.sources)
	}

	pub fn levels(&self) -> Selector<'_> {
		Selector::from_values(&self.levels)
	}

	pub fn page_window(&self) -> PageWindow {
		let size = match self.page_size {
			None | Some(0) => DEFAULT_PAGE_SIZE,
			Some(size) => size.min(MAX_PAGE_SIZE),
		};
		let skipped_pages = self.page.max(1) - 1;
		let offset = skipped_pages.saturating_mul(size).min(i64::MAX as u64);

		PageWindow { limit: size as i64, offset: offset as i64 }
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineQuery {
	/// Anchor entry id.
	pub id: i64,
	#[serde(
		default,
		with = "crate::duration_nanos::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub before: Option<Duration>,
	#[serde(
		default,
		with = "crate::duration_nanos::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub after: Option<Duration>,
}
impl TimelineQuery {
	pub fn lookback(&self) -> Duration {
		self.before.unwrap_or(DEFAULT_TIMELINE_SPAN)
	}

	pub fn lookahead(&self) -> Duration {
		self.after.unwrap_or(DEFAULT_TIMELINE_SPAN)
	}

	pub fn window_around(&self, anchor: OffsetDateTime) -> Result<TimelineWindow, QueryError> {
		let lookback = self.lookback();
		let lookahead = self.lookahead();

		if lookback.is_negative() {
			return Err(QueryError::NegativeWindow { field: "before" });
		}
		if lookahead.is_negative() {
			return Err(QueryError::NegativeWindow { field: "after" });
		}

		let start =
			anchor.checked_sub(lookback).ok_or(QueryError::WindowOutOfRange { anchor })?;
		let end = anchor.checked_add(lookahead).ok_or(QueryError::WindowOutOfRange { anchor })?;

		Ok(TimelineWindow { start, end })
	}
}

/// Inclusive `created_at` range around a timeline anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineWindow {
	pub start: OffsetDateTime,
	pub end: OffsetDateTime,
}
