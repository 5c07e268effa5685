//! The log-shelter core: ingestion, change synchronization, queries and retention.
//!
//! External systems are reached only through the capability traits below, so every worker can
//! run against in-memory implementations in tests.

pub mod alerts;
pub mod backends;
pub mod cdc;
pub mod ingest;
pub mod query;
pub mod retention;
pub mod search;
pub mod store;

mod error;

pub use backends::TelegramNotifier;
pub use cdc::ChangeOutcome;
pub use error::{Error, Result};
pub use ingest::BatchReport;
pub use retention::SweepOutcome;
pub use store::PostgresLogStore;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration as StdDuration};

use serde_json::{Map, Value};
use time::Duration;
use tokio::sync::{Mutex, mpsc, watch};

use shelter_config::Config;
use shelter_domain::{AppendRequest, ListQuery, LogRecord, NotifyIntent, TimelineQuery};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable log storage. Each call runs in its own transaction.
pub trait LogStore
where
	Self: Send + Sync,
{
	fn append<'a>(&'a self, req: &'a AppendRequest) -> BoxFuture<'a, Result<i64>>;

	fn list<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>>;

	fn timeline<'a>(&'a self, query: &'a TimelineQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>>;

	/// Soft-deletes live entries older than `age` and returns how many were flagged.
	fn soft_delete_older_than(&self, age: Duration) -> BoxFuture<'_, Result<u64>>;
}

/// The derived full-text projection.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		index: &'a str,
		doc_id: &'a str,
		body: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>>;

	/// Returns `false` when the document was already absent.
	fn delete<'a>(&'a self, index: &'a str, doc_id: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Value>>>;
}

pub trait Notifier
where
	Self: Send + Sync,
{
	fn should_notify(&self, level: &str) -> bool;

	fn notify<'a>(&'a self, intent: &'a NotifyIntent) -> BoxFuture<'a, Result<()>>;
}

/// One message handed out by a [`BatchSource`].
pub trait Delivery
where
	Self: Send + Sync,
{
	fn payload(&self) -> &[u8];

	fn ack(&self) -> BoxFuture<'_, Result<()>>;
}

/// Pull-based source of append requests.
pub trait BatchSource
where
	Self: Send + Sync,
{
	/// Returns up to `max` deliveries, waiting at most `wait` for the batch to fill.
	fn fetch(&self, max: usize, wait: StdDuration) -> BoxFuture<'_, Result<Vec<Box<dyn Delivery>>>>;
}

#[derive(Clone)]
pub struct Backends {
	pub store: Arc<dyn LogStore>,
	pub index: Arc<dyn SearchIndex>,
	pub notifier: Arc<dyn Notifier>,
}
impl Backends {
	pub fn new(
		store: Arc<dyn LogStore>,
		index: Arc<dyn SearchIndex>,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self { store, index, notifier }
	}
}

pub struct ShelterService {
	pub cfg: Config,
	pub backends: Backends,
	alerts: mpsc::Sender<NotifyIntent>,
	alert_inbox: Mutex<Option<mpsc::Receiver<NotifyIntent>>>,
}
impl ShelterService {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		let (alerts, inbox) = mpsc::channel(crate::alerts::ALERT_QUEUE_CAPACITY);

		Self { cfg, backends, alerts, alert_inbox: Mutex::new(Some(inbox)) }
	}
}

/// Resolves once shutdown is requested or the sender side is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}
