//! Message-handling engine.
//!
//! A single task owns every store and the session state machine. It consumes
//! transport events and its own internal events (init completions, purge
//! results, scheduled re-initializations) one at a time, so no two handlers
//! ever run concurrently. Slow side effects (transport initialization,
//! session purge, timers) run in spawned tasks that report back through the
//! internal channel instead of touching state directly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{render, AppConfig, RepliesConfig};
use crate::errors::{CommandError, TransportError, UpsertError};
use crate::escalation::EscalationTracker;
use crate::history::HistoryStore;
use crate::knowledge::KnowledgeStore;
use crate::matching::find_answer;
use crate::purge::{PurgeOutcome, SessionPurger};
use crate::router::{CommandRouter, ControlCommand, Route, TeachRequest};
use crate::session::{authorize, LoginDecision, Recovery, SessionManager, SessionState};
use crate::traits::Transport;
use crate::types::{InboundMessage, TransportEvent};
use crate::utils::truncate_str;

/// Events the engine posts to itself from spawned work.
#[derive(Debug)]
pub enum EngineEvent {
    InitFinished(Result<(), TransportError>),
    PurgeFinished(Result<PurgeOutcome, String>),
    Reinitialize,
}

/// Settings the engine needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub admin_id: String,
    pub replies: RepliesConfig,
    pub notify_asker: bool,
    pub flush_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            admin_id: config.admin.id.clone(),
            replies: config.replies.clone(),
            notify_asker: config.escalation.notify_asker,
            flush_interval: Duration::from_secs(config.storage.flush_interval_secs),
        }
    }
}

pub struct Engine {
    settings: EngineSettings,
    transport: Arc<dyn Transport>,
    purger: Arc<SessionPurger>,
    router: CommandRouter,
    knowledge: KnowledgeStore,
    history: HistoryStore,
    escalations: EscalationTracker,
    session: SessionManager,
    /// Messages sent before this instant (epoch seconds) are ignored.
    started_at: i64,
    internal_tx: mpsc::Sender<EngineEvent>,
    internal_rx: Option<mpsc::Receiver<EngineEvent>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: EngineSettings,
        transport: Arc<dyn Transport>,
        purger: Arc<SessionPurger>,
        router: CommandRouter,
        knowledge: KnowledgeStore,
        history: HistoryStore,
        session: SessionManager,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(32);
        Self {
            settings,
            transport,
            purger,
            router,
            knowledge,
            history,
            escalations: EscalationTracker::new(),
            session,
            started_at: Utc::now().timestamp(),
            internal_tx,
            internal_rx: Some(internal_rx),
        }
    }

    #[cfg(test)]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    #[cfg(test)]
    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    #[cfg(test)]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[cfg(test)]
    pub fn escalations(&self) -> &EscalationTracker {
        &self.escalations
    }

    #[cfg(test)]
    pub fn set_started_at(&mut self, epoch_secs: i64) {
        self.started_at = epoch_secs;
    }

    /// Next self-posted event, for tests that drive the engine step by step.
    #[cfg(test)]
    pub async fn next_internal_event(&mut self) -> Option<EngineEvent> {
        self.internal_rx.as_mut()?.recv().await
    }

    /// Drive the engine until `shutdown` resolves or the transport hangs up,
    /// then flush history and tear the transport down.
    pub async fn run(
        mut self,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        let Some(mut internal_rx) = self.internal_rx.take() else {
            error!("Engine started twice");
            return;
        };
        let mut flush_timer = tokio::time::interval(self.settings.flush_interval);
        // The first tick completes immediately; skip it.
        flush_timer.tick().await;
        tokio::pin!(shutdown);

        self.start_initialize();

        loop {
            tokio::select! {
                event = transport_rx.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("Transport event stream closed");
                        break;
                    }
                },
                Some(event) = internal_rx.recv() => self.handle_engine_event(event).await,
                _ = flush_timer.tick() => self.flush_history(),
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Best-effort shutdown: flush history, then destroy the transport.
    pub async fn shutdown(&mut self) {
        self.flush_history();
        if let Err(e) = self.transport.destroy().await {
            error!(transport = %self.transport.name(), "Failed to close connection: {}", e);
        }
        info!("Engine stopped");
    }

    fn flush_history(&self) {
        match self.history.flush() {
            Ok(()) => debug!(path = %self.history.path().display(), "Chat history flushed"),
            Err(e) => error!("Failed to save chat history: {}", e),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start an initialization attempt unless one is already in flight.
    pub fn start_initialize(&mut self) {
        if !self.session.begin_initialize() {
            debug!("Initialization already in progress");
            return;
        }
        self.spawn_initialize();
    }

    fn spawn_initialize(&self) {
        let transport = Arc::clone(&self.transport);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            info!(transport = %transport.name(), "Initializing transport");
            let result = transport.initialize().await;
            let _ = tx.send(EngineEvent::InitFinished(result)).await;
        });
    }

    fn apply_recovery(&self, recovery: Recovery) {
        match recovery {
            Recovery::None => {}
            Recovery::Reinit { after } => {
                info!(delay_ms = after.as_millis() as u64, "Re-initialization scheduled");
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(EngineEvent::Reinitialize).await;
                });
            }
            Recovery::PurgeThenReinit { teardown } => {
                let transport = Arc::clone(&self.transport);
                let purger = Arc::clone(&self.purger);
                let tx = self.internal_tx.clone();
                info!(path = %purger.path().display(), teardown, "Purging session data");
                tokio::spawn(async move {
                    if teardown {
                        if let Err(e) = transport.destroy().await {
                            warn!("Teardown before session purge failed: {}", e);
                        }
                    }
                    let result = purger.purge().await.map_err(|e| e.to_string());
                    let _ = tx.send(EngineEvent::PurgeFinished(result)).await;
                });
            }
        }
    }

    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::InitFinished(Ok(())) => {
                debug!(state = %self.session.state(), "Transport initialize returned");
                let recovery = self.session.on_init_succeeded();
                self.apply_recovery(recovery);
            }
            EngineEvent::InitFinished(Err(e)) => {
                let recovery = self.session.on_init_failed(&e);
                self.apply_recovery(recovery);
            }
            EngineEvent::PurgeFinished(Ok(outcome)) => {
                info!(?outcome, "Session data purge finished");
                let recovery = self.session.on_purged();
                self.apply_recovery(recovery);
            }
            EngineEvent::PurgeFinished(Err(e)) => {
                let recovery = self.session.on_purge_exhausted(&e);
                self.apply_recovery(recovery);
            }
            EngineEvent::Reinitialize => {
                if self.session.reinit_due() {
                    self.spawn_initialize();
                } else {
                    debug!(state = %self.session.state(), "Skipping stale re-initialization");
                }
            }
        }
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::QrCode(code) => {
                self.session.on_qr();
                info!(qr = %code, "Scan this code to link the account");
            }
            TransportEvent::Authenticated => {
                info!("Authenticated");
                self.session.on_authenticated();
            }
            TransportEvent::Ready => {
                info!("Bot is ready");
                self.session.on_ready();
            }
            TransportEvent::Disconnected(reason) => {
                let recovery = self.session.on_disconnected(&reason);
                self.apply_recovery(recovery);
            }
            TransportEvent::Error(cause) => {
                let recovery = self.session.on_transport_error(&cause);
                self.apply_recovery(recovery);
            }
            TransportEvent::Message(message) => self.handle_message(message).await,
        }
    }

    // ---------------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------------

    pub async fn handle_message(&mut self, message: InboundMessage) {
        if message.from_me {
            return;
        }
        if message.timestamp < self.started_at {
            debug!(id = %message.id, "Ignoring message sent before startup");
            return;
        }
        if message.has_unsupported_media() {
            let reply = self.settings.replies.media_unsupported.clone();
            self.send_reply(&message, &reply).await;
        }

        let body = message.body.trim().to_string();
        if body.is_empty() {
            return;
        }
        let user_id = message.sender_id.clone();
        debug!(
            user_id = %user_id,
            preview = %truncate_str(&body, 80),
            "Inbound message"
        );

        if let Some(command) = self.router.control(&body) {
            self.handle_control(&message, command).await;
            return;
        }

        self.history.append(&user_id, &body, true);

        let route = self.router.route(
            &body,
            message.quoted_message_id.as_deref(),
            &self.escalations,
        );
        match route {
            Route::EscalationReply { escalation_id } => {
                self.handle_escalation_reply(&message, &escalation_id, &body)
                    .await
            }
            Route::Teach(request) => self.handle_teach(&message, request).await,
            Route::Query => self.handle_query(&message, &body).await,
        }
    }

    async fn handle_control(&mut self, message: &InboundMessage, command: ControlCommand) {
        let replies = self.settings.replies.clone();
        if let Err(e) = authorize(&message.sender_id, &self.settings.admin_id) {
            warn!(command = %command, "Rejected control command: {}", e);
            self.send_reply(message, &replies.unauthorized).await;
            return;
        }

        match command {
            ControlCommand::Logout => {
                self.send_reply(message, &replies.logging_out).await;
                if let Err(e) = self.transport.logout().await {
                    error!("Logout failed: {}", e);
                }
            }
            ControlCommand::Login => match self.session.login_requested() {
                LoginDecision::AlreadyReady => {
                    self.send_reply(message, &replies.already_logged_in).await;
                }
                LoginDecision::AlreadyInitializing => {
                    self.send_reply(message, &replies.logging_in).await;
                }
                LoginDecision::Start => {
                    self.send_reply(message, &replies.logging_in).await;
                    self.start_initialize();
                }
            },
        }
    }

    async fn handle_escalation_reply(
        &mut self,
        message: &InboundMessage,
        escalation_id: &str,
        answer: &str,
    ) {
        let Some(pending) = self.escalations.resolve(escalation_id) else {
            return;
        };
        info!(
            escalation_id,
            asker = %pending.user_id,
            waited_secs = (Utc::now() - pending.created_at).num_seconds(),
            "Escalated question answered"
        );

        let replies = self.settings.replies.clone();
        let vars = [("question", pending.question.as_str()), ("answer", answer)];
        match self.knowledge.upsert(&pending.question, answer) {
            Ok(()) => {
                self.send_reply(message, &render(&replies.escalation_saved, &vars))
                    .await;
            }
            Err(e) => {
                self.report_upsert_error(message, e).await;
            }
        }

        if self.settings.notify_asker && pending.user_id != message.sender_id {
            let text = render(&replies.answer_relay, &vars);
            match self.transport.send_message(&pending.user_id, &text).await {
                Ok(_) => {
                    self.history.append(&pending.user_id, answer, false);
                }
                Err(e) => warn!(user_id = %pending.user_id, "Failed to relay answer: {}", e),
            }
        }
    }

    async fn handle_teach(
        &mut self,
        message: &InboundMessage,
        request: Result<TeachRequest, CommandError>,
    ) {
        let replies = self.settings.replies.clone();

        if message.quoted_message_id.is_some() && message.sender_id != self.settings.admin_id {
            match self.transport.get_quoted_message(message).await {
                Ok(Some(quoted)) if quoted.body.trim() == replies.acknowledgement.trim() => {
                    warn!(user_id = %message.sender_id, "Refused teach quoting the acknowledgement");
                    self.send_reply(message, &replies.teach_forbidden).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not fetch quoted message: {}", e),
            }
        }

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                debug!("Teach command rejected: {}", e);
                let usage = render(
                    &replies.teach_usage,
                    &[("prefix", self.router.teach_prefix())],
                );
                self.send_reply(message, &usage).await;
                return;
            }
        };

        match self.knowledge.upsert(&request.question, &request.answer) {
            Ok(()) => {
                info!(user_id = %message.sender_id, question = %request.question, "Learned new answer");
                let text = render(
                    &replies.taught,
                    &[
                        ("question", request.question.as_str()),
                        ("answer", request.answer.as_str()),
                    ],
                );
                self.send_reply(message, &text).await;
            }
            Err(e) => self.report_upsert_error(message, e).await,
        }
    }

    async fn report_upsert_error(&self, message: &InboundMessage, err: UpsertError) {
        error!(path = %self.knowledge.path().display(), "Failed to save knowledge: {}", err);
        self.send_reply(message, &self.settings.replies.save_failed)
            .await;
    }

    async fn handle_query(&mut self, message: &InboundMessage, body: &str) {
        let user_id = message.sender_id.as_str();

        let answer = find_answer(&self.knowledge, body).map(|m| {
            debug!(tier = ?m.tier, question = %m.question, "Knowledge base hit");
            m.answer.to_string()
        });
        if let Some(answer) = answer {
            self.history.append(user_id, &answer, false);
            self.send_reply(message, &answer).await;
            return;
        }

        let replies = self.settings.replies.clone();
        self.send_reply(message, &replies.acknowledgement).await;
        if user_id == self.settings.admin_id {
            return;
        }

        if let Err(e) = self.escalate(user_id, body).await {
            error!(user_id, "Failed to forward question to admin: {}", e);
            self.send_reply(message, &replies.apology).await;
        }
    }

    /// Deliver the question to the admin and remember the delivered message.
    async fn escalate(&mut self, user_id: &str, question: &str) -> Result<(), TransportError> {
        let admin_id = self.settings.admin_id.clone();
        let chat = self.transport.get_chat(&admin_id).await?;
        debug!(chat_id = %chat.id, title = ?chat.title, "Escalating to admin chat");
        let notice = render(
            &self.settings.replies.escalation_notice,
            &[
                ("user", user_id),
                ("question", question),
                ("prefix", self.router.teach_prefix()),
            ],
        );
        let escalation_id = self.transport.send_message(&chat.id, &notice).await?;
        self.escalations.create(&escalation_id, question, user_id);
        info!(
            escalation_id = %escalation_id,
            user_id,
            pending = self.escalations.len(),
            "Question escalated to admin"
        );
        Ok(())
    }

    async fn send_reply(&self, message: &InboundMessage, text: &str) {
        if let Err(e) = self.transport.reply(message, text).await {
            warn!(chat_id = %message.chat_id, "Failed to send reply: {}", e);
        }
    }
}
