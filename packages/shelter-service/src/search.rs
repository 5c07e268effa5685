use serde_json::Value;

use crate::{Error, Result, ShelterService};

impl ShelterService {
	/// Full-text search over the projected index. Returns each hit's source document.
	pub async fn search(&self, query: &str) -> Result<Vec<Value>> {
		let query = query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "q must be non-empty.".to_string() });
		}

		self.backends.index.search(query).await
	}
}
