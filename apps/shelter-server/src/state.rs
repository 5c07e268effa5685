use std::sync::Arc;

use shelter_config::Config;
use shelter_providers::elastic::ElasticClient;
use shelter_service::{Backends, PostgresLogStore, ShelterService, TelegramNotifier};
use shelter_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ShelterService>,
}
impl AppState {
	/// Connects to Postgres, applies the schema and builds the production backends.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let index = ElasticClient::new(&config.storage.elasticsearch)?;
		let notifier = TelegramNotifier::from_config(&config.notifications)?;
		let backends = Backends::new(
			Arc::new(PostgresLogStore::new(db)),
			Arc::new(index),
			Arc::new(notifier),
		);

		Ok(Self::from_service(ShelterService::new(config, backends)))
	}

	pub fn from_service(service: ShelterService) -> Self {
		Self { service: Arc::new(service) }
	}
}
