use serde::{Deserialize as _, Deserializer, Serializer};
use time::OffsetDateTime;

pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value {
		Some(value) => crate::time_serde::serialize(value, serializer),
		None => serializer.serialize_none(),
	}
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(serde::Deserialize)]
	struct Wrapper(#[serde(with = "crate::time_serde")] OffsetDateTime);

	let raw = Option::<Wrapper>::deserialize(deserializer)?;

	Ok(raw.map(|Wrapper(value)| value))
}
