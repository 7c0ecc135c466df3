// src/main.rs
// PULSE CORE - SIMULATION PRODUCER + DASHBOARD API
// Agents append comments to the data file; the dashboard re-reads it and serves
// the recomputed widgets to the frontend via REST (Actix-Web).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Modules
mod api;
mod brain;
mod config;
mod dashboard;
mod datafile;
mod error;
mod freshness;
mod memory;
mod nlp;
mod producer;
mod profile;
mod record;
mod reporter;
mod sentiment;
mod snapshot;
mod topic;
mod wordcloud;

use brain::{ChatBrain, CommentGenerator, ScriptedBrain};
use config::{Cli, Command, Settings, TokenStrategy};
use dashboard::Consumer;
use datafile::DataFile;
use freshness::{MtimeToken, TokenSource, WatchToken};
use nlp::RuleAnnotator;
use producer::{Producer, ProducerState};
use reporter::Reporter;
use sentiment::LexiconScorer;

// Shared State for the Server
pub struct AppState {
    pub consumer: Arc<Consumer>,
    pub topic_path: PathBuf,
    // Absent when the producer runs elsewhere
    pub producer: Option<watch::Receiver<ProducerState>>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.settings.log_level);

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.settings).await,
        Command::Produce => produce(cli.settings).await,
        Command::Export { out } => export(&cli.settings, &out),
    }
}

fn build_generator(settings: &Settings) -> anyhow::Result<Arc<dyn CommentGenerator>> {
    match settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let brain = ChatBrain::new(
                &settings.base_url,
                key,
                settings.models.clone(),
                settings.request_timeout(),
            )
            .context("building the chat client")?;
            Ok(Arc::new(brain))
        }
        None => {
            info!("🧠 BRAIN: no API key configured, using the scripted brain");
            Ok(Arc::new(ScriptedBrain))
        }
    }
}

fn build_producer(settings: &Settings) -> anyhow::Result<Producer> {
    Ok(Producer::new(
        settings.producer_settings(),
        DataFile::new(&settings.data_file),
        build_generator(settings)?,
        Arc::new(LexiconScorer),
    ))
}

fn build_token_source(settings: &Settings) -> anyhow::Result<Box<dyn TokenSource>> {
    Ok(match settings.token_source {
        TokenStrategy::Mtime => Box::new(MtimeToken::new(&settings.data_file)),
        TokenStrategy::Watch => Box::new(
            WatchToken::spawn(&settings.data_file)
                .with_context(|| format!("watching {}", settings.data_file.display()))?,
        ),
    })
}

// The producer gets its own OS thread + tokio runtime so agent tasks never
// compete with the HTTP workers.
fn spawn_producer(producer: Producer, shutdown: watch::Receiver<bool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "could not start the producer runtime");
                return;
            }
        };
        if let Err(e) = rt.block_on(producer.run(shutdown)) {
            error!(error = %e, "producer stopped with an error");
        }
    })
}

// Every server start begins with no topic and an empty data file, so a
// leftover topic cannot restart agents before anyone asks.
async fn clear_previous_run(settings: &Settings) -> anyhow::Result<()> {
    topic::remove_topic(&settings.topic_file)
        .with_context(|| format!("removing {}", settings.topic_file.display()))?;
    DataFile::new(&settings.data_file)
        .reset()
        .await
        .with_context(|| format!("resetting {}", settings.data_file.display()))?;
    info!("🧹 previous run cleared");
    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!("🚀 Pulse API Server Starting...");
    clear_previous_run(&settings).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 1. Producer (waits for a topic from POST /api/topic)
    let producer = build_producer(&settings)?;
    let producer_state = producer.subscribe();
    let producer_thread = spawn_producer(producer, shutdown_rx.clone());

    // 2. Consumer + refresh timer
    let consumer = Arc::new(Consumer::new(
        DataFile::new(&settings.data_file),
        settings.layout(),
        build_token_source(&settings)?,
        Box::new(RuleAnnotator),
        settings.always_refresh,
    ));
    consumer.tick();
    let ticker = actix_web::rt::spawn(Arc::clone(&consumer).run(settings.refresh_period(), shutdown_rx));

    // 3. Shared state
    let app_state = web::Data::new(AppState {
        consumer,
        topic_path: settings.topic_file.clone(),
        producer: Some(producer_state),
    });

    info!("🌍 Server running at http://{}:{}", settings.host, settings.port);

    // 4. HTTP server (returns on Ctrl-C)
    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(api::routes)
    })
    .bind((settings.host.as_str(), settings.port))
    .with_context(|| format!("binding {}:{}", settings.host, settings.port))?
    .run()
    .await?;

    // 5. Shutdown: stop the timer, cancel agents, wait for the snapshot
    let _ = shutdown_tx.send(true);
    if let Err(e) = ticker.await {
        warn!(error = %e, "refresh loop ended abnormally");
    }
    producer_thread
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?;
    info!("👋 Pulse stopped");
    Ok(())
}

async fn produce(settings: Settings) -> anyhow::Result<()> {
    let producer = build_producer(&settings)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_producer(producer, shutdown_rx);

    tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
    info!("🛑 Ctrl-C received, stopping agents");
    let _ = shutdown_tx.send(true);

    handle.join().map_err(|_| anyhow!("producer thread panicked"))?;
    Ok(())
}

fn export(settings: &Settings, out: &Path) -> anyhow::Result<()> {
    let records = DataFile::new(&settings.data_file)
        .load()
        .with_context(|| format!("reading {}", settings.data_file.display()))?;
    Reporter::export_csv(out, &records).with_context(|| format!("writing {}", out.display()))?;
    Reporter::print_summary(&records);
    Ok(())
}
