//! NATS wiring: the JetStream append work queue, request/reply query subjects and the change
//! event subscription.

use std::{future::Future, sync::Arc, time::Duration};

use async_nats::{
	Client, ConnectOptions, Message, Subscriber,
	jetstream::{
		self, Context,
		consumer::{AckPolicy, Consumer, pull},
		stream::{self, RetentionPolicy},
	},
};
use futures::{Stream, StreamExt};
use tokio::{
	sync::watch,
	task::{JoinError, JoinSet},
};

use shelter_config::{Ingest, Nats};
use shelter_service::{BatchSource, BoxFuture, ChangeOutcome, Delivery, ShelterService};

const CLIENT_NAME: &str = "log-shelter";

/// Every subject the service touches, derived from `nats.subject_prefix`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subjects {
	pub append: String,
	pub get: String,
	pub timeline: String,
	pub internal_append: String,
	pub changes: String,
}
impl Subjects {
	pub fn new(prefix: &str) -> Self {
		Self {
			append: format!("{prefix}.append"),
			get: format!("{prefix}.get"),
			timeline: format!("{prefix}.timeline"),
			internal_append: format!("{prefix}.__internal.append"),
			changes: format!("{prefix}.__internal.postgres.*.*"),
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub enum QueryKind {
	List,
	Timeline,
}

pub async fn connect(cfg: &Nats) -> color_eyre::Result<Client> {
	let mut options = ConnectOptions::new().name(CLIENT_NAME);

	if let Some(username) = &cfg.username {
		options =
			options.user_and_password(username.clone(), cfg.password.clone().unwrap_or_default());
	}

	let client = options.connect(cfg.url.as_str()).await?;

	tracing::info!(url = %cfg.url, "Connected to NATS.");

	Ok(client)
}

/// Creates or reuses the append work queue and its durable pull consumer.
pub async fn append_batches(
	js: &Context,
	cfg: &Ingest,
	subjects: &Subjects,
) -> color_eyre::Result<JetStreamBatches> {
	let stream = js
		.get_or_create_stream(stream::Config {
			name: cfg.stream.clone(),
			subjects: vec![subjects.internal_append.clone()],
			retention: RetentionPolicy::WorkQueue,
			..Default::default()
		})
		.await?;
	let consumer = stream
		.get_or_create_consumer(
			&cfg.consumer,
			pull::Config {
				durable_name: Some(cfg.consumer.clone()),
				ack_policy: AckPolicy::Explicit,
				..Default::default()
			},
		)
		.await?;

	tracing::info!(stream = %cfg.stream, consumer = %cfg.consumer, "Append work queue ready.");

	Ok(JetStreamBatches { consumer })
}

pub struct JetStreamBatches {
	consumer: Consumer<pull::Config>,
}
impl JetStreamBatches {
	async fn next_batch(
		&self,
		max: usize,
		wait: Duration,
	) -> shelter_service::Result<Vec<Box<dyn Delivery>>> {
		let mut batch = self
			.consumer
			.batch()
			.max_messages(max)
			.expires(wait)
			.messages()
			.await
			.map_err(delivery_error)?;
		let mut deliveries: Vec<Box<dyn Delivery>> = Vec::with_capacity(max);

		while let Some(message) = batch.next().await {
			match message {
				Ok(message) => deliveries.push(Box::new(JetStreamDelivery { message })),
				Err(err) => tracing::warn!(error = %err, "Failed to receive append delivery."),
			}
		}

		Ok(deliveries)
	}
}

impl BatchSource for JetStreamBatches {
	fn fetch(
		&self,
		max: usize,
		wait: Duration,
	) -> BoxFuture<'_, shelter_service::Result<Vec<Box<dyn Delivery>>>> {
		Box::pin(self.next_batch(max, wait))
	}
}

struct JetStreamDelivery {
	message: jetstream::Message,
}
impl Delivery for JetStreamDelivery {
	fn payload(&self) -> &[u8] {
		&self.message.payload
	}

	fn ack(&self) -> BoxFuture<'_, shelter_service::Result<()>> {
		Box::pin(async move { self.message.ack().await.map_err(delivery_error) })
	}
}

/// Moves producer publishes on `<prefix>.append` into the work queue. Each message is confirmed
/// by JetStream before the next one is read. On shutdown the subscription is closed and messages
/// already buffered are still enqueued.
pub async fn relay_appends(
	js: Context,
	mut subscriber: Subscriber,
	subject: String,
	mut shutdown: watch::Receiver<bool>,
) {
	let open = loop {
		let message = tokio::select! {
			biased;
			_ = shelter_service::shutdown_requested(&mut shutdown) => break true,
			message = subscriber.next() => message,
		};
		let Some(message) = message else {
			tracing::warn!("Append subscription closed.");

			break false;
		};

		enqueue(&js, &subject, message).await;
	};

	if !open || unsubscribe(&mut subscriber, "append").await {
		while let Some(message) = subscriber.next().await {
			enqueue(&js, &subject, message).await;
		}
	}

	tracing::info!("Append relay stopped.");
}

async fn enqueue(js: &Context, subject: &str, message: Message) {
	let published = match js.publish(subject.to_string(), message.payload).await {
		Ok(ack) => ack.await.map(|_| ()),
		Err(err) => Err(err),
	};

	if let Err(err) = published {
		tracing::error!(error = %err, "Failed to enqueue append request.");
	}
}

/// Answers request/reply queries, one task per request. Failed requests get no reply.
pub async fn serve_queries(
	client: Client,
	mut subscriber: Subscriber,
	service: Arc<ShelterService>,
	kind: QueryKind,
	mut shutdown: watch::Receiver<bool>,
) {
	let handle = |message: Message| {
		let client = client.clone();
		let service = service.clone();

		async move { answer(&client, &service, kind, message).await }
	};
	let mut tasks = JoinSet::new();
	let open = dispatch(&mut subscriber, &mut tasks, &handle, &mut shutdown).await;

	settle(subscriber, open, tasks, &handle, "query").await;

	tracing::info!(?kind, "Query responder stopped.");
}

async fn answer(client: &Client, service: &ShelterService, kind: QueryKind, message: Message) {
	let Some(reply_to) = message.reply else {
		tracing::warn!(?kind, subject = %message.subject, "Dropping query without a reply subject.");

		return;
	};
	let reply = match kind {
		QueryKind::List => service.respond_list(&message.payload).await,
		QueryKind::Timeline => service.respond_timeline(&message.payload).await,
	};
	let Some(reply) = reply else {
		return;
	};

	if let Err(err) = client.publish(reply_to, reply.into()).await {
		tracing::error!(error = %err, ?kind, "Failed to publish query reply.");
	}
}

/// Applies change events to the search index, one task per event.
pub async fn sync_changes(
	mut subscriber: Subscriber,
	service: Arc<ShelterService>,
	mut shutdown: watch::Receiver<bool>,
) {
	let handle = |message: Message| {
		let service = service.clone();

		async move { apply(&service, message).await }
	};
	let mut tasks = JoinSet::new();
	let open = dispatch(&mut subscriber, &mut tasks, &handle, &mut shutdown).await;

	settle(subscriber, open, tasks, &handle, "change").await;

	tracing::info!("Change synchronizer stopped.");
}

async fn apply(service: &ShelterService, message: Message) {
	match service.apply_change(&message.payload).await {
		Ok(ChangeOutcome::Skipped) => {
			tracing::debug!(subject = %message.subject, "Skipped change event.");
		},
		Ok(outcome) => tracing::debug!(?outcome, "Applied change event."),
		Err(err) => {
			tracing::error!(error = %err, subject = %message.subject, "Failed to apply change event.");
		},
	}
}

/// Runs `handle` on its own task for every message until shutdown. Returns `false` when the
/// inbox ended first.
async fn dispatch<S, T, F, Fut>(
	inbox: &mut S,
	tasks: &mut JoinSet<()>,
	handle: &F,
	shutdown: &mut watch::Receiver<bool>,
) -> bool
where
	S: Stream<Item = T> + Unpin,
	F: Fn(T) -> Fut,
	Fut: Future<Output = ()> + Send + 'static,
{
	loop {
		tokio::select! {
			biased;
			_ = shelter_service::shutdown_requested(shutdown) => return true,
			Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
			message = inbox.next() => match message {
				Some(message) => {
					tasks.spawn(handle(message));
				},
				None => return false,
			},
		}
	}
}

/// Closes a still-open subscription, hands its buffered messages to `handle` and waits for
/// every handler task.
async fn settle<F, Fut>(
	mut subscriber: Subscriber,
	open: bool,
	tasks: JoinSet<()>,
	handle: &F,
	label: &'static str,
) where
	F: Fn(Message) -> Fut,
	Fut: Future<Output = ()> + Send + 'static,
{
	if open && !unsubscribe(&mut subscriber, label).await {
		finish(&mut futures::stream::empty(), tasks, handle).await;
	} else {
		finish(&mut subscriber, tasks, handle).await;
	}
}

/// Spawns whatever is left in `inbox`, then joins every task.
async fn finish<S, T, F, Fut>(inbox: &mut S, mut tasks: JoinSet<()>, handle: &F)
where
	S: Stream<Item = T> + Unpin,
	F: Fn(T) -> Fut,
	Fut: Future<Output = ()> + Send + 'static,
{
	while let Some(message) = inbox.next().await {
		tasks.spawn(handle(message));
	}
	while let Some(joined) = tasks.join_next().await {
		log_join(joined);
	}
}

async fn unsubscribe(subscriber: &mut Subscriber, label: &'static str) -> bool {
	match subscriber.unsubscribe().await {
		Ok(()) => true,
		Err(err) => {
			tracing::warn!(error = %err, label, "Failed to unsubscribe. Buffered messages are dropped.");

			false
		},
	}
}

fn log_join(joined: Result<(), JoinError>) {
	if let Err(err) = joined {
		tracing::error!(error = %err, "Message handler task failed.");
	}
}

fn delivery_error(err: impl std::fmt::Display) -> shelter_service::Error {
	shelter_service::Error::Delivery { message: err.to_string() }
}
