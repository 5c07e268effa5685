//! Durations as integer nanoseconds, matching how producers encode timeline windows.

pub mod option;

use serde::{Deserialize, Deserializer, Serializer};
use time::Duration;

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let nanos = i64::try_from(value.whole_nanoseconds()).map_err(|_| {
		serde::ser::Error::custom("duration does not fit in 64-bit nanoseconds")
	})?;

	serializer.serialize_i64(nanos)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	let nanos = i64::deserialize(deserializer)?;

	Ok(Duration::nanoseconds(nanos))
}
