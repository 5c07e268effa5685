/// The only retention policy the sweeper knows how to run.
pub const AFTER_TIME: &str = "after_time";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetentionPolicy {
	/// Soft-delete entries whose `created_at` is older than the configured age.
	AfterTime,
	Unsupported(String),
}
impl RetentionPolicy {
	pub fn parse(name: &str) -> Self {
		match name {
			AFTER_TIME => Self::AfterTime,
			other => Self::Unsupported(other.to_string()),
		}
	}
}
