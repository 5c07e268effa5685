use shelter_domain::{ListQuery, LogRecord, TimelineQuery};

use crate::{Result, ShelterService};

impl ShelterService {
	pub async fn list(&self, query: &ListQuery) -> Result<Vec<LogRecord>> {
		self.backends.store.list(query).await
	}

	pub async fn timeline(&self, query: &TimelineQuery) -> Result<Vec<LogRecord>> {
		self.backends.store.timeline(query).await
	}

	/// Encoded reply for a list request, or `None` when no reply should be sent.
	pub async fn respond_list(&self, payload: &[u8]) -> Option<Vec<u8>> {
		match self.answer_list(payload).await {
			Ok(reply) => Some(reply),
			Err(err) => {
				tracing::error!(error = %err, "Failed to answer list query.");

				None
			},
		}
	}

	/// Encoded reply for a timeline request, or `None` when no reply should be sent.
	pub async fn respond_timeline(&self, payload: &[u8]) -> Option<Vec<u8>> {
		match self.answer_timeline(payload).await {
			Ok(reply) => Some(reply),
			Err(err) => {
				tracing::error!(error = %err, "Failed to answer timeline query.");

				None
			},
		}
	}

	async fn answer_list(&self, payload: &[u8]) -> Result<Vec<u8>> {
		let query: ListQuery = serde_json::from_slice(payload)?;
		let records = self.list(&query).await?;

		Ok(serde_json::to_vec(&records)?)
	}

	async fn answer_timeline(&self, payload: &[u8]) -> Result<Vec<u8>> {
		let query: TimelineQuery = serde_json::from_slice(payload)?;
		let records = self.timeline(&query).await?;

		Ok(serde_json::to_vec(&records)?)
	}
}
