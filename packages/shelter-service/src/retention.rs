use std::time::Duration as StdDuration;

use time::Duration;
use tokio::{sync::watch, time::MissedTickBehavior};

use shelter_domain::RetentionPolicy;

use crate::{Error, Result, ShelterService};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
	Deleted(u64),
	/// The configured policy is not supported. No store access happened.
	Halted,
}

impl ShelterService {
	pub async fn sweep_once(&self) -> Result<SweepOutcome> {
		match RetentionPolicy::parse(&self.cfg.retention.policy) {
			RetentionPolicy::AfterTime => {
				let seconds = i64::try_from(self.cfg.retention.delete_after_seconds).map_err(|_| {
					Error::InvalidRequest {
						message: "retention.delete_after_seconds is out of range.".to_string(),
					}
				})?;
				let count =
					self.backends.store.soft_delete_older_than(Duration::seconds(seconds)).await?;

				Ok(SweepOutcome::Deleted(count))
			},
			RetentionPolicy::Unsupported(_) => Ok(SweepOutcome::Halted),
		}
	}

	/// Sweeps every `retention.cycle_time_seconds`, starting immediately. Exits on shutdown or
	/// permanently on an unsupported policy.
	pub async fn run_retention(&self, mut shutdown: watch::Receiver<bool>) {
		let period = StdDuration::from_secs(self.cfg.retention.cycle_time_seconds);
		let mut ticker = tokio::time::interval(period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		tracing::info!(
			policy = %self.cfg.retention.policy,
			cycle_time_seconds = self.cfg.retention.cycle_time_seconds,
			"Retention sweeper started."
		);

		loop {
			tokio::select! {
				biased;
				_ = crate::shutdown_requested(&mut shutdown) => break,
				_ = ticker.tick() => {},
			}

			match self.sweep_once().await {
				Ok(SweepOutcome::Deleted(count)) => {
					tracing::info!(count, "Retention sweep soft-deleted expired entries.");
				},
				Ok(SweepOutcome::Halted) => {
					tracing::error!(
						policy = %self.cfg.retention.policy,
						"Unsupported retention policy. Retention sweeper halted."
					);

					return;
				},
				Err(err) => tracing::error!(error = %err, "Retention sweep failed."),
			}
		}

		tracing::info!("Retention sweeper stopped.");
	}
}
