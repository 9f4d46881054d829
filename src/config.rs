use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub admin: AdminConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub replies: RepliesConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    /// Sender id allowed to run control commands and receive escalations.
    pub id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: String,
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            knowledge_path: default_knowledge_path(),
            history_path: default_history_path(),
            history_limit: default_history_limit(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn default_knowledge_path() -> String {
    "knowledge.json".to_string()
}
fn default_history_path() -> String {
    "chat_history.json".to_string()
}
fn default_history_limit() -> usize {
    20
}
fn default_flush_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Directory holding the transport's persisted login state.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Files whose name contains this are spared when session data is purged.
    #[serde(default = "default_keep_file_pattern")]
    pub keep_file_pattern: String,
    #[serde(default = "default_reinit_delay_ms")]
    pub reinit_delay_ms: u64,
    #[serde(default = "default_purge_retries")]
    pub purge_retries: u32,
    #[serde(default = "default_purge_retry_delay_ms")]
    pub purge_retry_delay_ms: u64,
    /// Error message fragments that mean the local session state is corrupt.
    #[serde(default = "default_corruption_signatures")]
    pub corruption_signatures: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keep_file_pattern: default_keep_file_pattern(),
            reinit_delay_ms: default_reinit_delay_ms(),
            purge_retries: default_purge_retries(),
            purge_retry_delay_ms: default_purge_retry_delay_ms(),
            corruption_signatures: default_corruption_signatures(),
        }
    }
}

impl SessionConfig {
    pub fn reinit_delay(&self) -> Duration {
        Duration::from_millis(self.reinit_delay_ms)
    }

    pub fn purge_retry_delay(&self) -> Duration {
        Duration::from_millis(self.purge_retry_delay_ms)
    }
}

fn default_data_dir() -> String {
    "sessions".to_string()
}
fn default_keep_file_pattern() -> String {
    "debug.log".to_string()
}
fn default_reinit_delay_ms() -> u64 {
    1000
}
fn default_purge_retries() -> u32 {
    3
}
fn default_purge_retry_delay_ms() -> u64 {
    1000
}
fn default_corruption_signatures() -> Vec<String> {
    vec!["Execution context was destroyed".to_string()]
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CommandsConfig {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default = "default_logout")]
    pub logout: String,
    #[serde(default = "default_teach_prefix")]
    pub teach_prefix: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            login: default_login(),
            logout: default_logout(),
            teach_prefix: default_teach_prefix(),
        }
    }
}

fn default_login() -> String {
    "login".to_string()
}
fn default_logout() -> String {
    "logout".to_string()
}
fn default_teach_prefix() -> String {
    "teach:".to_string()
}

/// User-visible texts. `{question}`, `{answer}`, `{user}` and `{prefix}`
/// are substituted where noted.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RepliesConfig {
    /// Sent when no answer is found. Teaching with this message quoted is refused.
    pub acknowledgement: String,
    pub unauthorized: String,
    pub already_logged_in: String,
    pub logging_in: String,
    pub logging_out: String,
    /// `{prefix}`
    pub teach_usage: String,
    /// `{question}`, `{answer}`
    pub taught: String,
    /// `{question}`, `{answer}`
    pub escalation_saved: String,
    pub save_failed: String,
    pub teach_forbidden: String,
    pub media_unsupported: String,
    pub apology: String,
    /// `{user}`, `{question}`, `{prefix}`
    pub escalation_notice: String,
    /// `{question}`, `{answer}`
    pub answer_relay: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            acknowledgement: "Thanks for your question! We will get back to you soon.".to_string(),
            unauthorized: "❌ You are not allowed to run this command.".to_string(),
            already_logged_in: "✅ The bot is already logged in.".to_string(),
            logging_in: "⏳ Logging in again...".to_string(),
            logging_out: "⏳ Logging out...".to_string(),
            teach_usage: "❌ Wrong format. Use: {prefix} question | answer".to_string(),
            taught: "✅ Learned:\nQ: {question}\nA: {answer}".to_string(),
            escalation_saved: "✅ Saved question and answer:\nQ: {question}\nA: {answer}"
                .to_string(),
            save_failed: "❌ Something went wrong while saving the knowledge.".to_string(),
            teach_forbidden: "This message cannot be used with the teach command.".to_string(),
            media_unsupported:
                "Media received, but I can't process this kind of content yet.".to_string(),
            apology: "Sorry, something went wrong while handling your question.".to_string(),
            escalation_notice: "📢 New question from {user}:\n\n{question}\n\n\
                 (Reply to this message with the answer, or use \"{prefix} question | answer\")"
                .to_string(),
            answer_relay: "💬 About your question \"{question}\":\n{answer}".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EscalationConfig {
    /// Relay the admin's answer to the user who asked.
    #[serde(default = "default_notify_asker")]
    pub notify_asker: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            notify_asker: default_notify_asker(),
        }
    }
}

fn default_notify_asker() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Port for the health endpoint; 0 disables it.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
        }
    }
}

fn default_health_port() -> u16 {
    8080
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.admin.id.trim().is_empty() {
            anyhow::bail!("admin.id must not be empty");
        }
        for (name, value) in [
            ("commands.login", &self.commands.login),
            ("commands.logout", &self.commands.logout),
            ("commands.teach_prefix", &self.commands.teach_prefix),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }
        if self.storage.history_limit == 0 {
            anyhow::bail!("storage.history_limit must be at least 1");
        }
        if self.storage.flush_interval_secs == 0 {
            anyhow::bail!("storage.flush_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Fill `{name}` placeholders in a reply template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}
