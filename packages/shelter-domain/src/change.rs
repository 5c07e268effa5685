//! Change-data-capture envelopes and how they map onto search index operations.
//!
//! Events follow the Debezium JSON layout. Both the schema-wrapped form
//! (`{"schema": ..., "payload": {...}}`) and the bare payload are accepted. A `null` payload is a
//! tombstone emitted after deletes and carries nothing to apply.

use serde::Deserialize;
use serde_json::{Map, Value};

pub type FieldMap = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
	#[error("Change event is not valid JSON: {0}")]
	Malformed(#[from] serde_json::Error),
	#[error("Change event has no source table.")]
	MissingTable,
	#[error("Change event for table {table} carries no document id.")]
	MissingDocumentId { table: String },
	#[error("Change event {op:?} for table {table} has no after image.")]
	MissingAfterImage { op: ChangeOp, table: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOp {
	Create,
	Update,
	/// Initial snapshot read.
	Read,
	Delete,
}
impl ChangeOp {
	pub fn from_code(code: &str) -> Option<Self> {
		match code {
			"c" => Some(Self::Create),
			"u" => Some(Self::Update),
			"r" => Some(Self::Read),
			"d" => Some(Self::Delete),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
	/// `None` for unrecognized operation codes.
	pub op: Option<ChangeOp>,
	pub before: Option<FieldMap>,
	pub after: Option<FieldMap>,
	pub table: String,
}
impl ChangeEvent {
	/// Returns `Ok(None)` for tombstones.
	pub fn parse(bytes: &[u8]) -> Result<Option<Self>, ChangeError> {
		let root: Value = serde_json::from_slice(bytes)?;
		let payload = match root {
			Value::Null => return Ok(None),
			Value::Object(mut object) if object.contains_key("payload") =>
				object.remove("payload").unwrap_or(Value::Null),
			other => other,
		};

		if payload.is_null() {
			return Ok(None);
		}

		let raw: RawPayload = serde_json::from_value(payload)?;
		let table = raw
			.source
			.and_then(|source| source.table)
			.filter(|table| !table.trim().is_empty())
			.ok_or(ChangeError::MissingTable)?;

		Ok(Some(Self {
			op: raw.op.as_deref().and_then(ChangeOp::from_code),
			before: raw.before,
			after: raw.after,
			table,
		}))
	}

	/// `after.id` when present and non-null, otherwise `before.id`.
	pub fn document_id(&self) -> Option<String> {
		id_of(self.after.as_ref()).or_else(|| id_of(self.before.as_ref()))
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum IndexAction {
	Upsert { index: String, doc_id: String, body: FieldMap },
	Delete { index: String, doc_id: String },
	Skip,
}

pub fn index_name(prefix: &str, table: &str) -> String {
	format!("{prefix}-{table}")
}

pub fn plan_index_action(prefix: &str, event: ChangeEvent) -> Result<IndexAction, ChangeError> {
	let Some(op) = event.op else {
		return Ok(IndexAction::Skip);
	};
	let doc_id = event
		.document_id()
		.ok_or_else(|| ChangeError::MissingDocumentId { table: event.table.clone() })?;
	let index = index_name(prefix, &event.table);

	match op {
		ChangeOp::Create | ChangeOp::Update | ChangeOp::Read => {
			let body =
				event.after.ok_or(ChangeError::MissingAfterImage { op, table: event.table })?;

			Ok(IndexAction::Upsert { index, doc_id, body })
		},
		ChangeOp::Delete => Ok(IndexAction::Delete { index, doc_id }),
	}
}

#[derive(Deserialize)]
struct RawPayload {
	op: Option<String>,
	before: Option<FieldMap>,
	after: Option<FieldMap>,
	source: Option<RawSource>,
}

#[derive(Deserialize)]
struct RawSource {
	table: Option<String>,
}

fn id_of(fields: Option<&FieldMap>) -> Option<String> {
	match fields?.get("id")? {
		Value::String(id) => Some(id.clone()),
		Value::Number(id) => Some(id.to_string()),
		Value::Bool(id) => Some(id.to_string()),
		_ => None,
	}
}
