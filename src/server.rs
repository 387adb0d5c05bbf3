//! Process wiring: tracing, storage, channel, consumer and HTTP server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stepflow_api::{ApiConfig, ApiServer, AppState};
use stepflow_channel::{EventProducer, MemoryBroker, PartitionAssignment, SqliteEventLog, Topics};
use stepflow_config::{
    ChannelBackend, ChannelConfig, Config, ConfigLoader, DatabaseConfig, LogFormat, LoggingConfig,
};
use stepflow_engine::{CompletionConsumer, ConsumerConfig, ProgressionEngine, TriggerService};
use stepflow_protocols::{
    CompletionLedger, DefinitionLookup, DefinitionStore, EventPublisher, EventSubscriber,
    InstanceStore,
};
use stepflow_store::{MemoryStore, SqliteStore};

/// Initialize tracing with console output and optional rotating log files.
///
/// `RUST_LOG` takes precedence over the configured level.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json_console = (logging.format == LogFormat::Json)
        .then(|| fmt::layer().json().with_target(true));
    let pretty_console = (logging.format == LogFormat::Pretty)
        .then(|| fmt::layer().with_target(true).with_ansi(true));

    let file_layer = match &logging.directory {
        Some(directory) => {
            let log_dir = ConfigLoader::expand_path(directory);
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("failed to create log directory {}", log_dir))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("stepflow")
                .filename_suffix("log")
                .max_log_files(logging.max_log_files)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes buffered lines on drop and must outlive the process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_console)
        .with(pretty_console)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Store handles, one per role.
struct Stores {
    instances: Arc<dyn InstanceStore>,
    lookup: Arc<dyn DefinitionLookup>,
    definitions: Arc<dyn DefinitionStore>,
    ledger: Arc<dyn CompletionLedger>,
}

impl Stores {
    fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: InstanceStore + DefinitionStore + CompletionLedger + 'static,
    {
        Self {
            instances: store.clone(),
            lookup: store.clone(),
            definitions: store.clone(),
            ledger: store,
        }
    }
}

async fn open_stores(database: &DatabaseConfig) -> anyhow::Result<Stores> {
    match &database.path {
        Some(path) => {
            let path = ConfigLoader::expand_path(path);
            ensure_parent_dir(Path::new(&path))?;
            let store = SqliteStore::open(&path)
                .await
                .with_context(|| format!("failed to open database {}", path))?;
            info!("Using SQLite store at {}", path);
            Ok(Stores::from_backend(Arc::new(store)))
        }
        None => {
            warn!("No database path configured; workflow state is kept in memory");
            Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
        }
    }
}

/// Producer side plus the completion subscription of this process.
struct ChannelHandles {
    publisher: Arc<dyn EventPublisher>,
    completions: Box<dyn EventSubscriber>,
}

async fn open_channel(
    channel: &ChannelConfig,
    topics: &Topics,
    assignment: PartitionAssignment,
) -> anyhow::Result<ChannelHandles> {
    match channel.backend {
        ChannelBackend::Memory => {
            warn!("Using in-process event channel; external workers cannot connect");
            let broker = MemoryBroker::new(channel.partitions);
            let completions =
                broker.subscribe(&topics.completions, &channel.consumer_group, assignment);
            Ok(ChannelHandles {
                publisher: Arc::new(broker),
                completions: Box::new(completions),
            })
        }
        ChannelBackend::Sqlite => {
            let path = channel
                .path
                .as_deref()
                .map(ConfigLoader::expand_path)
                .context("channel.path is required by the sqlite backend")?;
            ensure_parent_dir(Path::new(&path))?;
            let log = SqliteEventLog::open(&path, channel.partitions)
                .await
                .with_context(|| format!("failed to open event log {}", path))?
                .with_poll_interval(Duration::from_millis(channel.poll_interval_ms));
            let completions = log
                .subscribe(&topics.completions, &channel.consumer_group, assignment)
                .await?;
            info!(
                partitions = channel.partitions,
                "Using SQLite event log at {}", path
            );
            Ok(ChannelHandles {
                publisher: Arc::new(log),
                completions: Box::new(completions),
            })
        }
    }
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Run the orchestrator until SIGINT or SIGTERM.
pub(crate) async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        environment = ?config.service.environment,
        "Starting {} v{}",
        config.service.name,
        env!("CARGO_PKG_VERSION")
    );

    let stores = open_stores(&config.database).await?;

    let topics = Topics::new(&config.channel.task_topic, &config.channel.completion_topic);
    let assignment =
        PartitionAssignment::new(config.engine.member_index, config.engine.member_count);
    let channel = open_channel(&config.channel, &topics, assignment).await?;
    let producer = EventProducer::new(channel.publisher.clone(), topics);

    let mut engine = ProgressionEngine::new(
        stores.instances.clone(),
        stores.lookup.clone(),
        producer.clone(),
    );
    if config.engine.dedup_ledger {
        engine = engine.with_ledger(stores.ledger.clone());
    }
    let consumer = CompletionConsumer::new(
        Arc::new(engine),
        channel.completions,
        ConsumerConfig {
            redelivery_backoff: Duration::from_millis(config.engine.redelivery_backoff_ms),
        },
    );
    let cancel = CancellationToken::new();
    let consumer_handle = tokio::spawn(consumer.run(cancel.clone()));
    info!(
        member = config.engine.member_index,
        members = config.engine.member_count,
        group = %config.channel.consumer_group,
        "Completion consumer running"
    );

    let triggers = Arc::new(TriggerService::new(
        stores.lookup.clone(),
        stores.instances.clone(),
        producer,
    ));
    let state = Arc::new(AppState::new(
        stores.definitions.clone(),
        triggers,
        config.service.name.clone(),
    ));
    let server = ApiServer::new(
        ApiConfig::new(&config.server.host, config.server.port),
        state,
    );

    let served = server.run(shutdown_signal()).await;

    cancel.cancel();
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    match tokio::time::timeout(grace, consumer_handle).await {
        Ok(Ok(stats)) => info!(
            processed = stats.processed,
            redeliveries = stats.redeliveries,
            acknowledged_errors = stats.acknowledged_errors,
            malformed = stats.malformed,
            "Completion consumer drained"
        ),
        Ok(Err(e)) => error!("Completion consumer task failed: {}", e),
        Err(_) => warn!("Completion consumer did not stop within {:?}", grace),
    }

    served.map_err(|e| anyhow::anyhow!("API server failed: {}", e))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
