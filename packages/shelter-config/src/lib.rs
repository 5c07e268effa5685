mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Elasticsearch, Ingest, Logger, Nats, Notifications, Postgres, Retention, Service,
	Storage,
};

use std::{fs, path::Path};

use tracing_subscriber::EnvFilter;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (key, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.elasticsearch.url", &cfg.storage.elasticsearch.url),
		("storage.elasticsearch.index_prefix", &cfg.storage.elasticsearch.index_prefix),
		("nats.url", &cfg.nats.url),
		("nats.subject_prefix", &cfg.nats.subject_prefix),
		("ingest.stream", &cfg.ingest.stream),
		("ingest.consumer", &cfg.ingest.consumer),
	] {
		if value.trim().is_empty() {
			return Err(Error::invalid(key, "must be non-empty."));
		}
	}

	if let Some(filter) = &cfg.logger.filter
		&& let Err(err) = EnvFilter::try_new(filter)
	{
		return Err(Error::invalid("logger.filter", format!("is not a valid filter: {err}.")));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be greater than zero."));
	}
	if cfg.storage.elasticsearch.timeout_ms == 0 {
		return Err(Error::invalid("storage.elasticsearch.timeout_ms", "must be greater than zero."));
	}
	if cfg.storage.elasticsearch.password.is_some() && cfg.storage.elasticsearch.username.is_none()
	{
		return Err(Error::invalid(
			"storage.elasticsearch.username",
			"must be set when storage.elasticsearch.password is set.",
		));
	}
	if cfg.nats.password.is_some() && cfg.nats.username.is_none() {
		return Err(Error::invalid("nats.username", "must be set when nats.password is set."));
	}
	if cfg.nats.subject_prefix.contains(['*', '>', ' ']) {
		return Err(Error::invalid("nats.subject_prefix", "must not contain wildcards or spaces."));
	}
	if cfg.ingest.batch_size == 0 {
		return Err(Error::invalid("ingest.batch_size", "must be greater than zero."));
	}
	if cfg.ingest.max_wait_ms == 0 {
		return Err(Error::invalid("ingest.max_wait_ms", "must be greater than zero."));
	}
	if cfg.notifications.enabled {
		if cfg.notifications.api_key.is_none() {
			return Err(Error::invalid(
				"notifications.api_key",
				"must be non-empty when notifications are enabled.",
			));
		}
		if cfg.notifications.recipients.is_empty() {
			return Err(Error::invalid(
				"notifications.recipients",
				"must be non-empty when notifications are enabled.",
			));
		}
		if cfg.notifications.timeout_ms == 0 {
			return Err(Error::invalid("notifications.timeout_ms", "must be greater than zero."));
		}
	}
	// The policy name itself is checked by the sweeper, which halts on unknown values.
	if cfg.retention.delete_after_seconds == 0 {
		return Err(Error::invalid("retention.delete_after_seconds", "must be greater than zero."));
	}
	if cfg.retention.cycle_time_seconds == 0 {
		return Err(Error::invalid("retention.cycle_time_seconds", "must be greater than zero."));
	}
	if i64::try_from(cfg.retention.delete_after_seconds).is_err() {
		return Err(Error::invalid("retention.delete_after_seconds", "is out of range."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for secret in [
		&mut cfg.storage.elasticsearch.username,
		&mut cfg.storage.elasticsearch.password,
		&mut cfg.nats.username,
		&mut cfg.nats.password,
		&mut cfg.notifications.api_key,
	] {
		if secret.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			*secret = None;
		}
	}

	if cfg.logger.filter.as_deref().map(|filter| filter.trim().is_empty()).unwrap_or(false) {
		cfg.logger.filter = None;
	}

	for level in &mut cfg.notifications.levels {
		*level = level.trim().to_string();
	}

	cfg.notifications.levels.retain(|level| !level.is_empty());
}
