//! Test infrastructure: MockTransport and TestHarness.
//!
//! Provides a fully wired Engine over temp-file stores and a scripted
//! transport, suitable for tests that exercise the real message flow.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::config::{CommandsConfig, RepliesConfig};
use crate::engine::{Engine, EngineSettings};
use crate::errors::TransportError;
use crate::history::HistoryStore;
use crate::knowledge::KnowledgeStore;
use crate::purge::{PurgeFallback, SessionPurger, ShellPurgeFallback};
use crate::router::CommandRouter;
use crate::session::SessionManager;
use crate::traits::{EventSink, Transport};
use crate::types::{ChatInfo, InboundMessage, QuotedMessage, TransportEvent};

pub const ADMIN: &str = "admin-1";
pub const USER: &str = "user-7";
pub const CORRUPTION: &str = "Execution context was destroyed";

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Captured message sent via the transport.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    pub chat_id: String,
    pub text: String,
}

/// A transport that records outgoing messages and replays scripted
/// initialization results.
pub struct MockTransport {
    sink: EventSink,
    pub sent: Mutex<Vec<SentMessage>>,
    init_results: Mutex<VecDeque<Result<(), TransportError>>>,
    pub init_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub fail_delivery_to: Mutex<Option<String>>,
    next_id: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (sink, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            sink,
            sent: Mutex::new(Vec::new()),
            init_results: Mutex::new(VecDeque::new()),
            init_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            fail_delivery_to: Mutex::new(None),
            next_id: AtomicUsize::new(1),
        });
        (transport, rx)
    }

    /// Queue the result of the next `initialize` call. Unscripted calls succeed.
    pub async fn script_init(&self, result: Result<(), TransportError>) {
        self.init_results.lock().await.push_back(result);
    }

    /// Make every send to `chat_id` fail.
    pub async fn fail_delivery(&self, chat_id: &str) {
        *self.fail_delivery_to.lock().await = Some(chat_id.to_string());
    }

    pub async fn messages_for(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub async fn last_sent_to(&self, chat_id: &str) -> Option<SentMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.chat_id == chat_id)
            .cloned()
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> String {
        "mock".to_string()
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.init_results.lock().await.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            let _ = self.sink.send(TransportEvent::Authenticated).await;
            let _ = self.sink.send(TransportEvent::Ready).await;
        }
        result
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .sink
            .send(TransportEvent::Disconnected("LOGOUT".to_string()))
            .await;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, TransportError> {
        if self.fail_delivery_to.lock().await.as_deref() == Some(chat_id) {
            return Err(TransportError::Delivery(format!("chat {} unreachable", chat_id)));
        }
        let id = format!(
            "{}:{}",
            chat_id,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        self.sent.lock().await.push(SentMessage {
            id: id.clone(),
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, TransportError> {
        Ok(ChatInfo {
            id: chat_id.to_string(),
            title: None,
        })
    }

    async fn get_quoted_message(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<QuotedMessage>, TransportError> {
        let Some(quoted_id) = message.quoted_message_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .sent
            .lock()
            .await
            .iter()
            .find(|m| m.id == quoted_id)
            .map(|m| QuotedMessage {
                id: m.id.clone(),
                body: m.text.clone(),
            }))
    }
}

/// Forced delete that always fails, to exhaust the purge budget.
pub struct FailingPurgeFallback;

#[async_trait]
impl PurgeFallback for FailingPurgeFallback {
    async fn force_remove(&self, path: &Path) -> std::io::Result<()> {
        Err(std::io::Error::other(format!(
            "{} is locked",
            path.display()
        )))
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Everything needed to run engine tests.
pub struct TestHarness {
    pub engine: Engine,
    pub transport: Arc<MockTransport>,
    pub transport_rx: mpsc::Receiver<TransportEvent>,
    pub session_dir: PathBuf,
    pub knowledge_path: PathBuf,
    pub history_path: PathBuf,
    /// Keeps the temp dir alive; files are deleted when this drops.
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    /// Feed every event the transport has emitted so far into the engine.
    pub async fn pump_transport(&mut self) {
        while let Ok(event) = self.transport_rx.try_recv() {
            self.engine.handle_transport_event(event).await;
        }
    }

    /// Wait for the next self-posted event and handle it.
    pub async fn step(&mut self) {
        let event = self
            .engine
            .next_internal_event()
            .await
            .expect("internal channel closed");
        self.engine.handle_engine_event(event).await;
    }

    pub async fn send(&mut self, message: InboundMessage) {
        self.engine.handle_message(message).await;
    }

    /// Fresh text message from `sender` stamped now.
    pub fn text(&self, sender: &str, body: &str) -> InboundMessage {
        InboundMessage::text(
            &format!("in-{}", next_message_seq()),
            sender,
            body,
            chrono::Utc::now().timestamp(),
        )
    }
}

fn next_message_seq() -> usize {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        admin_id: ADMIN.to_string(),
        replies: RepliesConfig::default(),
        notify_asker: true,
        flush_interval: Duration::from_secs(60),
    }
}

/// Build an engine on a temp dir with a mock transport.
pub fn setup_harness() -> anyhow::Result<TestHarness> {
    setup_harness_with(test_settings())
}

pub fn setup_harness_with(settings: EngineSettings) -> anyhow::Result<TestHarness> {
    setup_harness_with_fallback(settings, Box::new(ShellPurgeFallback))
}

pub fn setup_harness_with_fallback(
    settings: EngineSettings,
    fallback: Box<dyn PurgeFallback>,
) -> anyhow::Result<TestHarness> {
    let dir = tempfile::TempDir::new()?;
    let session_dir = dir.path().join("sessions");
    let knowledge_path = dir.path().join("knowledge.json");
    let history_path = dir.path().join("chat_history.json");

    let (transport, transport_rx) = MockTransport::new();
    let purger = Arc::new(SessionPurger::new(
        &session_dir,
        "debug.log",
        3,
        Duration::from_millis(1000),
        fallback,
    ));

    let mut engine = Engine::new(
        settings,
        transport.clone() as Arc<dyn Transport>,
        purger,
        CommandRouter::new(CommandsConfig::default()),
        KnowledgeStore::load(&knowledge_path)?,
        HistoryStore::load(&history_path, 20),
        SessionManager::new(Duration::from_millis(1000), vec![CORRUPTION.to_string()]),
    );
    // Accept messages stamped in the same second the engine was built.
    engine.set_started_at(chrono::Utc::now().timestamp() - 1);

    Ok(TestHarness {
        engine,
        transport,
        transport_rx,
        session_dir,
        knowledge_path,
        history_path,
        dir,
    })
}
