//! Production implementations of the capability traits over the provider clients.

use serde_json::{Map, Value};

use shelter_config::Notifications;
use shelter_domain::NotifyIntent;
use shelter_providers::{elastic::ElasticClient, telegram, telegram::TelegramClient};

use crate::{BoxFuture, Error, Notifier, Result, SearchIndex};

impl SearchIndex for ElasticClient {
	fn upsert<'a>(
		&'a self,
		index: &'a str,
		doc_id: &'a str,
		body: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.index_document(index, doc_id, body).await.map_err(search_error)
		})
	}

	fn delete<'a>(&'a self, index: &'a str, doc_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { self.delete_document(index, doc_id).await.map_err(search_error) })
	}

	fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Value>>> {
		Box::pin(async move { ElasticClient::search(self, query).await.map_err(search_error) })
	}
}

/// Sends alerts for configured levels to every recipient chat. Disabled configurations never
/// build a client and never notify.
pub struct TelegramNotifier {
	client: Option<TelegramClient>,
	levels: Vec<String>,
	recipients: Vec<i64>,
}
impl TelegramNotifier {
	pub fn from_config(cfg: &Notifications) -> Result<Self> {
		let client = if cfg.enabled {
			Some(TelegramClient::new(cfg).map_err(notification_error)?)
		} else {
			None
		};

		Ok(Self { client, levels: cfg.levels.clone(), recipients: cfg.recipients.clone() })
	}

	pub fn disabled() -> Self {
		Self { client: None, levels: Vec::new(), recipients: Vec::new() }
	}

	async fn send_all(&self, intent: &NotifyIntent) -> Result<()> {
		let Some(client) = &self.client else {
			return Ok(());
		};
		let text = telegram::format_message(&intent.source, &intent.log_level, &intent.raw_log);
		let mut failed = 0_usize;

		for chat_id in &self.recipients {
			if let Err(err) = client.send_message(*chat_id, &text).await {
				failed += 1;

				tracing::warn!(error = %err, chat_id, "Failed to deliver notification.");
			}
		}

		if failed > 0 {
			return Err(Error::Notification {
				message: format!(
					"Delivery failed for {failed} of {} recipients.",
					self.recipients.len()
				),
			});
		}

		Ok(())
	}
}

impl Notifier for TelegramNotifier {
	fn should_notify(&self, level: &str) -> bool {
		self.client.is_some() && self.levels.iter().any(|configured| configured == level)
	}

	fn notify<'a>(&'a self, intent: &'a NotifyIntent) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.send_all(intent))
	}
}

fn search_error(err: shelter_providers::Error) -> Error {
	Error::SearchIndex { message: err.to_string() }
}

fn notification_error(err: shelter_providers::Error) -> Error {
	Error::Notification { message: err.to_string() }
}
