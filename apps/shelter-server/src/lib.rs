pub mod bus;
pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use color_eyre::eyre;
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tracing_subscriber::EnvFilter;

use crate::{
	bus::{QueryKind, Subjects},
	state::AppState,
};

#[derive(Debug, Parser)]
#[command(
	version = shelter_cli::VERSION,
	rename_all = "kebab",
	styles = shelter_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", env = "CONFIG_PATH")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = shelter_config::load(&args.config)?;

	init_tracing(&config.logger)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config).await?;
	let service = state.service.clone();
	let client = bus::connect(&service.cfg.nats).await?;
	let js = async_nats::jetstream::new(client.clone());
	let subjects = Subjects::new(&service.cfg.nats.subject_prefix);
	let batches = bus::append_batches(&js, &service.cfg.ingest, &subjects).await?;
	let appends = client.subscribe(subjects.append.clone()).await?;
	let gets = client.subscribe(subjects.get.clone()).await?;
	let timelines = client.subscribe(subjects.timeline.clone()).await?;
	let changes = client.subscribe(subjects.changes.clone()).await?;
	let listener = TcpListener::bind(http_addr).await?;
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let mut tasks = JoinSet::new();

	tracing::info!(%http_addr, prefix = %service.cfg.nats.subject_prefix, "Log shelter starting.");

	{
		// Notifications stop only after ingestion has stopped.
		let (ingest_done_tx, ingest_done_rx) = watch::channel(false);
		let notifier = service.clone();
		let service = service.clone();
		let shutdown = shutdown_rx.clone();

		tasks.spawn(async move { notifier.run_notifications(ingest_done_rx).await });
		tasks.spawn(async move {
			service.run_ingest(&batches, shutdown).await;
			ingest_done_tx.send_replace(true);
		});
	}
	{
		let service = service.clone();
		let shutdown = shutdown_rx.clone();

		tasks.spawn(async move { service.run_retention(shutdown).await });
	}

	tasks.spawn(bus::relay_appends(
		js,
		appends,
		subjects.internal_append.clone(),
		shutdown_rx.clone(),
	));
	tasks.spawn(bus::serve_queries(
		client.clone(),
		gets,
		service.clone(),
		QueryKind::List,
		shutdown_rx.clone(),
	));
	tasks.spawn(bus::serve_queries(
		client.clone(),
		timelines,
		service.clone(),
		QueryKind::Timeline,
		shutdown_rx.clone(),
	));
	tasks.spawn(bus::sync_changes(changes, service.clone(), shutdown_rx.clone()));

	{
		let app = routes::router(state);
		let mut shutdown = shutdown_rx;

		tasks.spawn(async move {
			tracing::info!(%http_addr, "HTTP server listening.");

			let served = axum::serve(listener, app)
				.with_graceful_shutdown(async move {
					shelter_service::shutdown_requested(&mut shutdown).await
				})
				.await;

			if let Err(err) = served {
				tracing::error!(error = %err, "HTTP server failed.");
			}
		});
	}

	wait_for_signal().await?;

	tracing::info!("Shutdown requested; draining workers.");

	shutdown_tx.send_replace(true);

	while let Some(joined) = tasks.join_next().await {
		if let Err(err) = joined {
			tracing::error!(error = %err, "Worker task panicked.");
		}
	}

	client.flush().await?;

	tracing::info!("Log shelter stopped.");

	Ok(())
}

async fn wait_for_signal() -> color_eyre::Result<()> {
	let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

	tokio::select! {
		signal = tokio::signal::ctrl_c() => signal?,
		_ = terminate.recv() => {},
	}

	Ok(())
}

fn init_tracing(cfg: &shelter_config::Logger) -> color_eyre::Result<()> {
	let fallback = if cfg.developer_mode { "debug" } else { "info" };
	let filter = EnvFilter::try_new(cfg.filter.as_deref().unwrap_or(fallback))?;
	let builder = tracing_subscriber::fmt().with_env_filter(filter);
	let installed = if cfg.developer_mode {
		builder.pretty().with_file(true).with_line_number(true).try_init()
	} else {
		builder.json().try_init()
	};

	installed.map_err(|err| eyre::eyre!("Failed to install tracing subscriber: {err}"))
}
