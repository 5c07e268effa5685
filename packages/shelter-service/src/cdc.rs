use shelter_domain::{ChangeEvent, IndexAction, change};

use crate::{Result, ShelterService};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
	Indexed { index: String, doc_id: String },
	Deleted { index: String, doc_id: String, existed: bool },
	/// Tombstones and unrecognized operations.
	Skipped,
}

impl ShelterService {
	/// Applies one change event to the search index. Nothing is retried here; the caller logs
	/// failures and the next replay of the same event converges.
	pub async fn apply_change(&self, payload: &[u8]) -> Result<ChangeOutcome> {
		let Some(event) = ChangeEvent::parse(payload)? else {
			return Ok(ChangeOutcome::Skipped);
		};
		let prefix = &self.cfg.storage.elasticsearch.index_prefix;

		match change::plan_index_action(prefix, event)? {
			IndexAction::Upsert { index, doc_id, body } => {
				self.backends.index.upsert(&index, &doc_id, &body).await?;

				Ok(ChangeOutcome::Indexed { index, doc_id })
			},
			IndexAction::Delete { index, doc_id } => {
				let existed = self.backends.index.delete(&index, &doc_id).await?;

				Ok(ChangeOutcome::Deleted { index, doc_id, existed })
			},
			IndexAction::Skip => Ok(ChangeOutcome::Skipped),
		}
	}
}
