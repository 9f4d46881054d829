use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::channels::TelegramTransport;
use crate::config::AppConfig;
use crate::daemon;
use crate::engine::{Engine, EngineSettings};
use crate::history::HistoryStore;
use crate::knowledge::KnowledgeStore;
use crate::purge::{SessionPurger, ShellPurgeFallback};
use crate::router::CommandRouter;
use crate::session::SessionManager;
use crate::traits::Transport;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Stores
    let knowledge = KnowledgeStore::load(&config.storage.knowledge_path)?;
    info!(
        entries = knowledge.len(),
        path = %config.storage.knowledge_path,
        "Knowledge base loaded"
    );
    if knowledge.is_empty() {
        warn!("Knowledge base is empty; every question will be escalated");
    }
    let history = HistoryStore::load(&config.storage.history_path, config.storage.history_limit);

    // 2. Transport
    if config.telegram.bot_token.trim().is_empty() {
        anyhow::bail!("telegram.bot_token must be set");
    }
    let (event_tx, event_rx) = mpsc::channel(256);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(
        &config.telegram.bot_token,
        &config.session.data_dir,
        event_tx,
    ));

    // 3. Session lifecycle
    let purger = Arc::new(SessionPurger::new(
        &config.session.data_dir,
        config.session.keep_file_pattern.clone(),
        config.session.purge_retries,
        config.session.purge_retry_delay(),
        Box::new(ShellPurgeFallback),
    ));
    let session = SessionManager::new(
        config.session.reinit_delay(),
        config.session.corruption_signatures.clone(),
    );

    // 4. Engine
    let engine = Engine::new(
        EngineSettings::from_config(&config),
        transport,
        purger,
        CommandRouter::new(config.commands.clone()),
        knowledge,
        history,
        session,
    );

    // 5. Health server
    let health_port = config.daemon.health_port;
    if health_port != 0 {
        let session_rx = engine.subscribe_session();
        tokio::spawn(async move {
            if let Err(e) = daemon::start_health_server(health_port, session_rx).await {
                error!("Health server error: {}", e);
            }
        });
    }

    // 6. Run until signalled
    info!("Starting faqdaemon v{}", env!("CARGO_PKG_VERSION"));
    engine.run(event_rx, shutdown_signal()).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
