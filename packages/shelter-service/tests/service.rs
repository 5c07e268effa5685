use std::{
	collections::{BTreeMap, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};

use serde_json::{Map, Value, json};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;

use shelter_config::Config;
use shelter_domain::{AppendRequest, ListQuery, LogRecord, NotifyIntent, TimelineQuery};
use shelter_service::{
	Backends, BatchReport, BatchSource, BoxFuture, ChangeOutcome, Delivery, Error, LogStore,
	Notifier, Result, SearchIndex, ShelterService, SweepOutcome,
};

const CONFIG_TEMPLATE: &str = r#"
[service]
http_bind = "127.0.0.1:0"

[storage.postgres]
dsn            = "postgres://unused"
pool_max_conns = 1

[storage.elasticsearch]
url          = "http://127.0.0.1:9200"
index_prefix = "log_shelter"

[nats]
url = "nats://127.0.0.1:4222"

[ingest]
batch_size  = 10
max_wait_ms = 5

[retention]
policy               = "{policy}"
delete_after_seconds = 3600
cycle_time_seconds   = 3600
"#;

type Journal = Arc<Mutex<Vec<String>>>;

fn config(policy: &str) -> Config {
	toml::from_str(&CONFIG_TEMPLATE.replace("{policy}", policy)).expect("Failed to parse config.")
}

fn journal_entries(journal: &Journal) -> Vec<String> {
	journal.lock().expect("Journal lock poisoned.").clone()
}

#[derive(Default)]
struct MemoryStore {
	entries: Mutex<Vec<LogRecord>>,
	delete_calls: AtomicUsize,
	failing_source: Option<String>,
	journal: Journal,
}
impl MemoryStore {
	fn with_journal(journal: Journal) -> Self {
		Self { journal, ..Default::default() }
	}

	fn records(&self) -> Vec<LogRecord> {
		self.entries.lock().expect("Store lock poisoned.").clone()
	}

	fn insert(&self, req: &AppendRequest) -> Result<i64> {
		if self.failing_source.as_deref() == Some(req.source.as_str()) {
			return Err(Error::Storage { message: "connection reset".to_string() });
		}

		let mut entries = self.entries.lock().expect("Store lock poisoned.");
		let id = entries.len() as i64 + 1;

		entries.push(LogRecord {
			id,
			raw_log: req.raw_log.clone(),
			log_level: req.log_level.clone(),
			source: req.source.clone(),
			created_at: req.created_at,
			request_id: req.request_id.clone(),
			logger_name: req.logger_name.clone(),
			is_deleted: false,
		});
		self.journal.lock().expect("Journal lock poisoned.").push(format!("persist:{id}"));

		Ok(id)
	}
}
impl LogStore for MemoryStore {
	fn append<'a>(&'a self, req: &'a AppendRequest) -> BoxFuture<'a, Result<i64>> {
		let result = self.insert(req);

		Box::pin(async move { result })
	}

	fn list<'a>(&'a self, _query: &'a ListQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>> {
		let live = self.records().into_iter().filter(|record| !record.is_deleted).collect();

		Box::pin(async move { Ok(live) })
	}

	fn timeline<'a>(&'a self, query: &'a TimelineQuery) -> BoxFuture<'a, Result<Vec<LogRecord>>> {
		let result = if query.id < 0 {
			Err(Error::Storage { message: "timeline failed".to_string() })
		} else {
			Ok(self.records().into_iter().filter(|record| record.id == query.id).collect())
		};

		Box::pin(async move { result })
	}

	fn soft_delete_older_than(&self, age: Duration) -> BoxFuture<'_, Result<u64>> {
		self.delete_calls.fetch_add(1, Ordering::SeqCst);

		let cutoff = OffsetDateTime::now_utc() - age;
		let mut count = 0;

		for record in self.entries.lock().expect("Store lock poisoned.").iter_mut() {
			if record.created_at < cutoff && !record.is_deleted {
				record.is_deleted = true;
				count += 1;
			}
		}

		Box::pin(async move { Ok(count) })
	}
}

#[derive(Default)]
struct MemoryIndex {
	docs: Mutex<BTreeMap<(String, String), Map<String, Value>>>,
	fail: AtomicBool,
}
impl MemoryIndex {
	fn snapshot(&self) -> BTreeMap<(String, String), Map<String, Value>> {
		self.docs.lock().expect("Index lock poisoned.").clone()
	}

	fn check(&self) -> Result<()> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(Error::SearchIndex { message: "cluster unavailable".to_string() });
		}

		Ok(())
	}
}
impl SearchIndex for MemoryIndex {
	fn upsert<'a>(
		&'a self,
		index: &'a str,
		doc_id: &'a str,
		body: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		let result = self.check().map(|()| {
			self.docs
				.lock()
				.expect("Index lock poisoned.")
				.insert((index.to_string(), doc_id.to_string()), body.clone());
		});

		Box::pin(async move { result })
	}

	fn delete<'a>(&'a self, index: &'a str, doc_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		let result = self.check().map(|()| {
			self.docs
				.lock()
				.expect("Index lock poisoned.")
				.remove(&(index.to_string(), doc_id.to_string()))
				.is_some()
		});

		Box::pin(async move { result })
	}

	fn search<'a>(&'a self, _query: &'a str) -> BoxFuture<'a, Result<Vec<Value>>> {
		let result = self.check().map(|()| {
			self.snapshot().into_values().map(Value::Object).collect::<Vec<_>>()
		});

		Box::pin(async move { result })
	}
}

#[derive(Default)]
struct RecordingNotifier {
	levels: Vec<String>,
	sent: Mutex<Vec<NotifyIntent>>,
	fail: bool,
	stall: bool,
}
impl RecordingNotifier {
	fn for_levels(levels: &[&str]) -> Self {
		Self { levels: levels.iter().map(|level| level.to_string()).collect(), ..Default::default() }
	}

	fn sent(&self) -> Vec<NotifyIntent> {
		self.sent.lock().expect("Notifier lock poisoned.").clone()
	}
}
impl Notifier for RecordingNotifier {
	fn should_notify(&self, level: &str) -> bool {
		self.levels.iter().any(|configured| configured == level)
	}

	fn notify<'a>(&'a self, intent: &'a NotifyIntent) -> BoxFuture<'a, Result<()>> {
		self.sent.lock().expect("Notifier lock poisoned.").push(intent.clone());

		if self.stall {
			return Box::pin(std::future::pending());
		}

		let result = if self.fail {
			Err(Error::Notification { message: "bot blocked".to_string() })
		} else {
			Ok(())
		};

		Box::pin(async move { result })
	}
}

struct FakeDelivery {
	tag: usize,
	payload: Vec<u8>,
	journal: Journal,
}
impl Delivery for FakeDelivery {
	fn payload(&self) -> &[u8] {
		&self.payload
	}

	fn ack(&self) -> BoxFuture<'_, Result<()>> {
		self.journal.lock().expect("Journal lock poisoned.").push(format!("ack:{}", self.tag));

		Box::pin(async { Ok(()) })
	}
}

/// Hands out queued batches, then requests shutdown once drained.
struct ScriptedSource {
	batches: Mutex<VecDeque<Vec<Box<dyn Delivery>>>>,
	shutdown: watch::Sender<bool>,
	fetches: AtomicUsize,
}
impl BatchSource for ScriptedSource {
	fn fetch(
		&self,
		_max: usize,
		_wait: StdDuration,
	) -> BoxFuture<'_, Result<Vec<Box<dyn Delivery>>>> {
		Box::pin(async move {
			self.fetches.fetch_add(1, Ordering::SeqCst);

			let next = self.batches.lock().expect("Source lock poisoned.").pop_front();

			if next.is_none() {
				self.shutdown.send_replace(true);
			}

			Ok(next.unwrap_or_default())
		})
	}
}

struct Harness {
	service: ShelterService,
	store: Arc<MemoryStore>,
	index: Arc<MemoryIndex>,
	notifier: Arc<RecordingNotifier>,
	journal: Journal,
}

fn harness_with(policy: &str, store: MemoryStore, notifier: RecordingNotifier) -> Harness {
	let journal = store.journal.clone();
	let store = Arc::new(store);
	let index = Arc::new(MemoryIndex::default());
	let notifier = Arc::new(notifier);
	let backends = Backends::new(store.clone(), index.clone(), notifier.clone());

	Harness {
		service: ShelterService::new(config(policy), backends),
		store,
		index,
		notifier,
		journal,
	}
}

fn harness() -> Harness {
	harness_with(
		"after_time",
		MemoryStore::with_journal(Journal::default()),
		RecordingNotifier::for_levels(&["CRITICAL", "FATAL"]),
	)
}

fn append_payload(source: &str, level: &str) -> Vec<u8> {
	serde_json::to_vec(&json!({
		"raw_log": format!("{level} from {source}"),
		"log_level": level,
		"source": source,
		"created_at": "2025-03-01T10:15:30Z"
	}))
	.expect("Failed to encode payload.")
}

fn deliveries(journal: &Journal, payloads: Vec<Vec<u8>>) -> Vec<Box<dyn Delivery>> {
	payloads
		.into_iter()
		.enumerate()
		.map(|(tag, payload)| {
			Box::new(FakeDelivery { tag, payload, journal: journal.clone() }) as Box<dyn Delivery>
		})
		.collect()
}

#[tokio::test]
async fn malformed_item_is_acked_without_blocking_the_batch() {
	let h = harness();
	let batch = deliveries(
		&h.journal,
		vec![
			append_payload("api", "INFO"),
			b"{\"raw_log\":".to_vec(),
			append_payload("api", "ERROR"),
			append_payload("db", "INFO"),
			append_payload("db", "WARN"),
		],
	);
	let report = h.service.ingest_batch(batch).await;

	assert_eq!(report, BatchReport { persisted: 4, malformed: 1, failed: 0, acked: 5 });
	assert_eq!(report.processed(), 5);
	assert_eq!(h.store.records().len(), 4);
	assert_eq!(
		journal_entries(&h.journal),
		vec![
			"persist:1", "ack:0", "ack:1", "persist:2", "ack:2", "persist:3", "ack:3", "persist:4",
			"ack:4",
		]
	);
}

#[tokio::test]
async fn store_failure_is_isolated_to_its_item() {
	let journal = Journal::default();
	let store = MemoryStore {
		failing_source: Some("flaky".to_string()),
		..MemoryStore::with_journal(journal.clone())
	};
	let h = harness_with("after_time", store, RecordingNotifier::for_levels(&["FATAL"]));
	let batch = deliveries(
		&journal,
		vec![append_payload("flaky", "FATAL"), append_payload("api", "INFO")],
	);
	let report = h.service.ingest_batch(batch).await;

	assert_eq!(report, BatchReport { persisted: 1, malformed: 0, failed: 1, acked: 2 });
	assert!(h.notifier.sent().is_empty(), "Failed items must not notify.");
	assert_eq!(journal_entries(&journal), vec!["ack:0", "persist:1", "ack:1"]);
}

#[tokio::test]
async fn only_configured_levels_notify_and_failures_do_not_fail_items() {
	let journal = Journal::default();
	let notifier = RecordingNotifier { fail: true, ..RecordingNotifier::for_levels(&["FATAL"]) };
	let h = harness_with("after_time", MemoryStore::with_journal(journal.clone()), notifier);
	let batch = deliveries(
		&journal,
		vec![
			append_payload("api", "ERROR"),
			append_payload("api", "FATAL"),
			append_payload("api", "fatal"),
		],
	);
	let report = h.service.ingest_batch(batch).await;

	assert_eq!(report.persisted, 3);
	assert_eq!(report.acked, 3);

	let (_stop_tx, stop_rx) = watch::channel(true);

	tokio::time::timeout(StdDuration::from_secs(5), h.service.run_notifications(stop_rx))
		.await
		.expect("Notification worker did not flush.");

	let sent = h.notifier.sent();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].log_level, "FATAL");
	assert_eq!(sent[0].source, "api");
}

#[tokio::test]
async fn stalled_notifier_does_not_hold_back_acks() {
	let journal = Journal::default();
	let notifier = RecordingNotifier { stall: true, ..RecordingNotifier::for_levels(&["FATAL"]) };
	let h = harness_with("after_time", MemoryStore::with_journal(journal.clone()), notifier);
	let batch = deliveries(
		&journal,
		vec![
			append_payload("api", "FATAL"),
			append_payload("db", "FATAL"),
			append_payload("db", "INFO"),
		],
	);
	let report = tokio::time::timeout(StdDuration::from_secs(5), h.service.ingest_batch(batch))
		.await
		.expect("Batch waited on the notifier.");

	assert_eq!(report, BatchReport { persisted: 3, malformed: 0, failed: 0, acked: 3 });
	assert_eq!(
		journal_entries(&journal),
		vec!["persist:1", "ack:0", "persist:2", "ack:1", "persist:3", "ack:2"]
	);
	assert!(h.notifier.sent().is_empty(), "Alerts are delivered by the notification worker.");
}

#[tokio::test]
async fn notification_worker_flushes_queue_after_stop() {
	let h = harness();
	let batch = deliveries(
		&h.journal,
		vec![append_payload("api", "FATAL"), append_payload("api", "CRITICAL")],
	);

	h.service.ingest_batch(batch).await;

	let (stop_tx, stop_rx) = watch::channel(false);
	let service = Arc::new(h.service);
	let worker = {
		let service = service.clone();

		tokio::spawn(async move { service.run_notifications(stop_rx).await })
	};

	stop_tx.send_replace(true);
	tokio::time::timeout(StdDuration::from_secs(5), worker)
		.await
		.expect("Notification worker did not stop.")
		.expect("Notification worker panicked.");

	let levels = h.notifier.sent().into_iter().map(|intent| intent.log_level).collect::<Vec<_>>();

	assert_eq!(levels, vec!["FATAL", "CRITICAL"]);

	let (_stop_tx, stop_rx) = watch::channel(true);

	tokio::time::timeout(StdDuration::from_secs(5), service.run_notifications(stop_rx))
		.await
		.expect("Second worker should return at once.");
}

#[tokio::test]
async fn ingest_loop_drains_batches_and_stops_on_shutdown() {
	let h = harness();
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let source = ScriptedSource {
		batches: Mutex::new(VecDeque::from([
			deliveries(&h.journal, vec![append_payload("api", "INFO")]),
			deliveries(&h.journal, vec![append_payload("api", "WARN"), b"nope".to_vec()]),
		])),
		shutdown: shutdown_tx,
		fetches: AtomicUsize::new(0),
	};

	tokio::time::timeout(StdDuration::from_secs(5), h.service.run_ingest(&source, shutdown_rx))
		.await
		.expect("Ingestion loop did not stop.");

	assert_eq!(h.store.records().len(), 2);
	assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn ingest_loop_does_not_fetch_after_shutdown() {
	let h = harness();
	let (shutdown_tx, shutdown_rx) = watch::channel(true);
	let source = ScriptedSource {
		batches: Mutex::new(VecDeque::new()),
		shutdown: shutdown_tx,
		fetches: AtomicUsize::new(0),
	};

	tokio::time::timeout(StdDuration::from_secs(5), h.service.run_ingest(&source, shutdown_rx))
		.await
		.expect("Ingestion loop did not stop.");

	assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn replayed_changes_converge() {
	let h = harness();
	let create = serde_json::to_vec(&json!({
		"payload": {
			"op": "c",
			"after": { "id": 5, "raw_log": "disk full", "log_level": "ERROR" },
			"source": { "table": "logs" }
		}
	}))
	.expect("Failed to encode event.");
	let first = h.service.apply_change(&create).await.expect("Failed to apply change.");
	let once = h.index.snapshot();
	let second = h.service.apply_change(&create).await.expect("Failed to apply change.");

	assert_eq!(first, second);
	assert_eq!(
		first,
		ChangeOutcome::Indexed { index: "log_shelter-logs".to_string(), doc_id: "5".to_string() }
	);
	assert_eq!(h.index.snapshot(), once);

	let delete = serde_json::to_vec(&json!({
		"payload": { "op": "d", "before": { "id": 5 }, "after": null, "source": { "table": "logs" } }
	}))
	.expect("Failed to encode event.");

	assert!(matches!(
		h.service.apply_change(&delete).await,
		Ok(ChangeOutcome::Deleted { existed: true, .. })
	));
	assert!(matches!(
		h.service.apply_change(&delete).await,
		Ok(ChangeOutcome::Deleted { existed: false, .. })
	));
	assert!(h.index.snapshot().is_empty());
}

#[tokio::test]
async fn tombstones_skip_and_bad_events_surface_errors() {
	let h = harness();

	assert_eq!(
		h.service.apply_change(br#"{"payload":null}"#).await.expect("Failed to apply tombstone."),
		ChangeOutcome::Skipped
	);
	assert!(matches!(h.service.apply_change(b"garbage").await, Err(Error::Decode { .. })));

	h.index.fail.store(true, Ordering::SeqCst);

	let update = br#"{"op":"u","after":{"id":1},"source":{"table":"logs"}}"#;

	assert!(matches!(h.service.apply_change(update).await, Err(Error::SearchIndex { .. })));
}

#[tokio::test]
async fn query_handlers_reply_only_on_success() {
	let h = harness();
	let batch = deliveries(&h.journal, vec![append_payload("api", "ERROR")]);

	h.service.ingest_batch(batch).await;

	let reply = h
		.service
		.respond_list(br#"{"page":1,"levels":["*"],"sources":["*"],"order":"asc"}"#)
		.await
		.expect("Expected a list reply.");
	let records: Vec<LogRecord> = serde_json::from_slice(&reply).expect("Failed to decode reply.");

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].source, "api");
	assert!(h.service.respond_list(b"[1,2").await.is_none());

	let reply = h.service.respond_timeline(br#"{"id":1}"#).await.expect("Expected a reply.");
	let records: Vec<LogRecord> = serde_json::from_slice(&reply).expect("Failed to decode reply.");

	assert_eq!(records.len(), 1);
	assert!(h.service.respond_timeline(br#"{"id":-1}"#).await.is_none());
}

#[tokio::test]
async fn sweep_soft_deletes_expired_entries_idempotently() {
	let h = harness();
	let old = AppendRequest {
		raw_log: "old".to_string(),
		log_level: "INFO".to_string(),
		source: "api".to_string(),
		created_at: OffsetDateTime::now_utc() - Duration::days(2),
		request_id: None,
		logger_name: None,
	};
	let fresh = AppendRequest { created_at: OffsetDateTime::now_utc(), ..old.clone() };

	h.store.insert(&old).expect("Failed to insert.");
	h.store.insert(&fresh).expect("Failed to insert.");

	assert_eq!(h.service.sweep_once().await.expect("Sweep failed."), SweepOutcome::Deleted(1));
	assert_eq!(h.service.sweep_once().await.expect("Sweep failed."), SweepOutcome::Deleted(0));

	let live = h.service.list(&ListQuery::default()).await.expect("Failed to list.");

	assert_eq!(live.len(), 1);
	assert_eq!(live[0].created_at, fresh.created_at);
}

#[tokio::test]
async fn unsupported_policy_halts_without_touching_the_store() {
	let h = harness_with(
		"unsupported_value",
		MemoryStore::default(),
		RecordingNotifier::default(),
	);

	assert_eq!(h.service.sweep_once().await.expect("Sweep failed."), SweepOutcome::Halted);

	let (_shutdown_tx, shutdown_rx) = watch::channel(false);

	tokio::time::timeout(StdDuration::from_secs(5), h.service.run_retention(shutdown_rx))
		.await
		.expect("Retention sweeper did not halt.");

	assert_eq!(h.store.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retention_sweeps_immediately_and_stops_on_shutdown() {
	let h = Arc::new(harness());
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let worker = {
		let h = h.clone();

		tokio::spawn(async move { h.service.run_retention(shutdown_rx).await })
	};

	tokio::time::timeout(StdDuration::from_secs(5), async {
		while h.store.delete_calls.load(Ordering::SeqCst) == 0 {
			tokio::time::sleep(StdDuration::from_millis(5)).await;
		}
	})
	.await
	.expect("First sweep did not run.");

	shutdown_tx.send_replace(true);

	tokio::time::timeout(StdDuration::from_secs(5), worker)
		.await
		.expect("Retention sweeper did not stop.")
		.expect("Retention task panicked.");

	assert_eq!(h.store.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn search_rejects_blank_queries_and_reports_backend_failures() {
	let h = harness();

	assert!(matches!(h.service.search("  ").await, Err(Error::InvalidRequest { .. })));
	assert!(h.service.search("raw_log:disk").await.expect("Search failed.").is_empty());

	h.index.fail.store(true, Ordering::SeqCst);

	assert!(matches!(h.service.search("raw_log:disk").await, Err(Error::SearchIndex { .. })));
}
