// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Wires SQLite storage, the OpenAI provider, and the Telegram channel into
//! the worker registry and dispatcher, then runs until SIGINT/SIGTERM.

use std::sync::Arc;

use parley_config::model::ParleyConfig;
use parley_core::{ChannelAdapter, ParleyError, PluginAdapter, StorageAdapter};
use parley_engine::shutdown;
use parley_engine::{Adapters, Dispatcher, WorkerRegistry};
use parley_openai::OpenAiProvider;
use parley_storage::SqliteStorage;
use parley_telegram::TelegramChannel;
use tracing::{debug, error, info, warn};

/// Runs the `parley serve` command.
///
/// Returns once the dispatcher has stopped and the workers have drained.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.agent.log_level);

    info!(name = %config.agent.name, "starting parley serve");

    // Initialize storage.
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    report_expired_tickets(storage.as_ref()).await;

    // Initialize OpenAI provider.
    let provider = OpenAiProvider::new(&config).map_err(|e| {
        error!(error = %e, "failed to initialize OpenAI provider");
        eprintln!("error: OpenAI API key required. Set via: config or OPENAI_API_KEY env var");
        e
    })?;

    // Initialize Telegram channel.
    let mut telegram = TelegramChannel::new(&config.telegram).map_err(|e| {
        error!(error = %e, "failed to initialize Telegram channel");
        eprintln!("error: Telegram bot token required. Set via: config or PARLEY_TELEGRAM_BOT_TOKEN");
        e
    })?;
    telegram.connect().await?;

    if config.telegram.allowed_chat_ids.is_empty() {
        warn!("telegram.allowed_chat_ids is empty, every message will be ignored");
    }

    // Initialize Prometheus metrics (if enabled and compiled in).
    #[cfg(feature = "prometheus")]
    let _prometheus = if config.prometheus.enabled {
        match parley_prometheus::PrometheusExporter::install(&config.prometheus.listen_address) {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    let adapters = Adapters {
        storage: storage.clone(),
        provider: Arc::new(provider),
        channel: Arc::new(telegram),
    };
    let registry = Arc::new(WorkerRegistry::new(
        adapters.clone(),
        config.workflow.clone(),
    ));
    let dispatcher = Dispatcher::new(
        &adapters,
        registry.clone(),
        &config.telegram,
        &config.workflow,
    );

    // Install signal handler for graceful shutdown.
    let cancel = shutdown::install_signal_handler();

    info!("parley ready, waiting for messages");
    let run_result = dispatcher.run(cancel.clone()).await;

    // The dispatcher may also stop on its own (closed channel).
    cancel.cancel();

    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "workers did not drain cleanly");
    }
    if let Err(e) = adapters.channel.shutdown().await {
        warn!(error = %e, "channel shutdown failed");
    }
    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to close storage");
    }

    info!("parley stopped");
    run_result
}

/// Logs tickets whose lease ran out, usually abandoned after a crash or
/// terminal AI failure. They are left in place for the operator.
async fn report_expired_tickets(storage: &dyn StorageAdapter) {
    match storage.list_expired_tickets(chrono::Utc::now()).await {
        Ok(expired) if expired.is_empty() => {}
        Ok(expired) => {
            warn!(count = expired.len(), "found tickets past their lease");
            for id in &expired {
                debug!(ticket_id = %id, "expired ticket");
            }
        }
        Err(e) => warn!(error = %e, "could not list expired tickets"),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
