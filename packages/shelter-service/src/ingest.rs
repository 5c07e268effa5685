use std::time::Duration;

use tokio::sync::watch;

use shelter_domain::{AppendRequest, NotifyIntent};

use crate::{BatchSource, Delivery, ShelterService};

/// Per-batch counters. Every delivery lands in exactly one of `persisted`, `malformed` or
/// `failed`; `acked` counts successful acknowledgements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
	pub persisted: usize,
	pub malformed: usize,
	pub failed: usize,
	pub acked: usize,
}
impl BatchReport {
	pub fn processed(&self) -> usize {
		self.persisted + self.malformed + self.failed
	}
}

enum ItemOutcome {
	Persisted,
	Malformed,
	Failed,
}

impl ShelterService {
	/// Processes deliveries in order. Each one is acknowledged once its attempt is over,
	/// whatever the outcome.
	pub async fn ingest_batch(&self, deliveries: Vec<Box<dyn Delivery>>) -> BatchReport {
		let mut report = BatchReport::default();

		for delivery in deliveries {
			match self.ingest_one(delivery.payload()).await {
				ItemOutcome::Persisted => report.persisted += 1,
				ItemOutcome::Malformed => report.malformed += 1,
				ItemOutcome::Failed => report.failed += 1,
			}

			match delivery.ack().await {
				Ok(()) => report.acked += 1,
				Err(err) => tracing::warn!(error = %err, "Failed to acknowledge delivery."),
			}
		}

		report
	}

	/// Pulls batches until shutdown is requested. A batch in progress always runs to completion.
	pub async fn run_ingest(&self, source: &dyn BatchSource, mut shutdown: watch::Receiver<bool>) {
		let max = self.cfg.ingest.batch_size as usize;
		let wait = Duration::from_millis(self.cfg.ingest.max_wait_ms);

		tracing::info!(
			batch_size = max,
			max_wait_ms = self.cfg.ingest.max_wait_ms,
			"Ingestion consumer started."
		);

		loop {
			let fetched = tokio::select! {
				biased;
				_ = crate::shutdown_requested(&mut shutdown) => break,
				fetched = source.fetch(max, wait) => fetched,
			};

			match fetched {
				Ok(deliveries) if deliveries.is_empty() => {},
				Ok(deliveries) => {
					let report = self.ingest_batch(deliveries).await;

					tracing::info!(
						persisted = report.persisted,
						malformed = report.malformed,
						failed = report.failed,
						acked = report.acked,
						"Processed append batch."
					);
				},
				Err(err) => {
					tracing::error!(error = %err, "Failed to fetch append batch.");

					tokio::select! {
						biased;
						_ = crate::shutdown_requested(&mut shutdown) => break,
						_ = tokio::time::sleep(wait) => {},
					}
				},
			}
		}

		tracing::info!("Ingestion consumer stopped.");
	}

	async fn ingest_one(&self, payload: &[u8]) -> ItemOutcome {
		let req: AppendRequest = match serde_json::from_slice(payload) {
			Ok(req) => req,
			Err(err) => {
				tracing::warn!(error = %err, bytes = payload.len(), "Dropping malformed append request.");

				return ItemOutcome::Malformed;
			},
		};

		match self.backends.store.append(&req).await {
			Ok(id) => {
				self.notify_if_needed(&req, id);

				ItemOutcome::Persisted
			},
			Err(err) => {
				tracing::error!(error = %err, source = %req.source, "Failed to persist log entry.");

				ItemOutcome::Failed
			},
		}
	}

	fn notify_if_needed(&self, req: &AppendRequest, id: i64) {
		if self.backends.notifier.should_notify(&req.log_level) {
			self.queue_alert(NotifyIntent::from(req), id);
		}
	}
}
