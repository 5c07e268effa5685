use serde::{Deserialize as _, Deserializer, Serializer};
use time::Duration;

pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value {
		Some(value) => crate::duration_nanos::serialize(value, serializer),
		None => serializer.serialize_none(),
	}
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<i64>::deserialize(deserializer)?;

	Ok(raw.map(Duration::nanoseconds))
}
