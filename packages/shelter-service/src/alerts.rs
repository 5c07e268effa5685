//! Notification hand-off. Ingestion only queues alerts; a separate worker talks to the
//! notifier, so a slow or unreachable transport never delays acknowledgements.

use tokio::sync::{mpsc::error::TrySendError, watch};

use shelter_domain::NotifyIntent;

use crate::ShelterService;

pub const ALERT_QUEUE_CAPACITY: usize = 1_024;

impl ShelterService {
	/// Never waits. A full or closed queue drops the alert with a warning.
	pub(crate) fn queue_alert(&self, intent: NotifyIntent, id: i64) {
		match self.alerts.try_send(intent) {
			Ok(()) => {},
			Err(TrySendError::Full(intent)) => {
				tracing::warn!(id, level = %intent.log_level, "Alert queue is full. Dropping notification.");
			},
			Err(TrySendError::Closed(intent)) => {
				tracing::warn!(id, level = %intent.log_level, "Notifier has stopped. Dropping notification.");
			},
		}
	}

	/// Delivers queued alerts until `stop` fires, then flushes whatever is still queued.
	/// Only the first caller gets the queue.
	pub async fn run_notifications(&self, mut stop: watch::Receiver<bool>) {
		let Some(mut inbox) = self.alert_inbox.lock().await.take() else {
			tracing::warn!("Notification worker is already running.");

			return;
		};

		tracing::info!(capacity = ALERT_QUEUE_CAPACITY, "Notification worker started.");

		loop {
			let intent = tokio::select! {
				biased;
				_ = crate::shutdown_requested(&mut stop) => break,
				intent = inbox.recv() => intent,
			};
			let Some(intent) = intent else {
				break;
			};

			self.deliver_alert(&intent).await;
		}

		inbox.close();

		while let Some(intent) = inbox.recv().await {
			self.deliver_alert(&intent).await;
		}

		tracing::info!("Notification worker stopped.");
	}

	async fn deliver_alert(&self, intent: &NotifyIntent) {
		if let Err(err) = self.backends.notifier.notify(intent).await {
			tracing::warn!(
				error = %err,
				source = %intent.source,
				level = %intent.log_level,
				"Failed to send notification."
			);
		}
	}
}
