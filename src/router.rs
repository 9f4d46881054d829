use std::fmt;

use crate::config::CommandsConfig;
use crate::errors::CommandError;
use crate::escalation::EscalationTracker;

/// Administrator-only session commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Login,
    Logout,
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Login => write!(f, "login"),
            ControlCommand::Logout => write!(f, "logout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeachRequest {
    pub question: String,
    pub answer: String,
}

/// What to do with a message that is not a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Admin answer quoting a pending escalation.
    EscalationReply { escalation_id: String },
    Teach(Result<TeachRequest, CommandError>),
    /// Look the text up in the knowledge base.
    Query,
}

/// Classifies inbound text into commands, teach requests and queries.
pub struct CommandRouter {
    commands: CommandsConfig,
}

impl CommandRouter {
    pub fn new(commands: CommandsConfig) -> Self {
        Self { commands }
    }

    pub fn teach_prefix(&self) -> &str {
        &self.commands.teach_prefix
    }

    /// Exact match against the configured login/logout words.
    pub fn control(&self, body: &str) -> Option<ControlCommand> {
        let body = body.trim();
        if body == self.commands.logout {
            Some(ControlCommand::Logout)
        } else if body == self.commands.login {
            Some(ControlCommand::Login)
        } else {
            None
        }
    }

    /// Classify a non-control message. A quoted reply to a known escalation
    /// wins over teach syntax.
    pub fn route(
        &self,
        body: &str,
        quoted_message_id: Option<&str>,
        escalations: &EscalationTracker,
    ) -> Route {
        if let Some(id) = quoted_message_id {
            if escalations.contains(id) {
                return Route::EscalationReply {
                    escalation_id: id.to_string(),
                };
            }
        }

        let body = body.trim();
        if let Some(rest) = body.strip_prefix(self.commands.teach_prefix.as_str()) {
            return Route::Teach(parse_teach(rest));
        }

        Route::Query
    }
}

/// Parse `<question>|<answer>`. Segments after the second `|` are ignored.
pub fn parse_teach(rest: &str) -> Result<TeachRequest, CommandError> {
    let mut parts = rest.split('|');
    let question = parts.next().unwrap_or_default().trim();
    let answer = parts.next().ok_or(CommandError::Malformed)?.trim();
    if question.is_empty() || answer.is_empty() {
        return Err(CommandError::Malformed);
    }
    Ok(TeachRequest {
        question: question.to_string(),
        answer: answer.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> CommandRouter {
        CommandRouter::new(CommandsConfig::default())
    }

    #[test]
    fn control_commands_match_exactly() {
        let r = router();
        assert_eq!(r.control("logout"), Some(ControlCommand::Logout));
        assert_eq!(r.control("  login "), Some(ControlCommand::Login));
        assert_eq!(r.control("please login"), None);
    }

    #[test]
    fn teach_parses_question_and_answer() {
        let r = router();
        let tracker = EscalationTracker::new();
        assert_eq!(
            r.route("teach: hours | 9 to 5", None, &tracker),
            Route::Teach(Ok(TeachRequest {
                question: "hours".to_string(),
                answer: "9 to 5".to_string(),
            }))
        );
    }

    #[test]
    fn teach_ignores_extra_segments() {
        let req = parse_teach("a|b|c").unwrap();
        assert_eq!(req.question, "a");
        assert_eq!(req.answer, "b");
    }

    #[test]
    fn malformed_teach_is_reported() {
        assert_eq!(parse_teach(" no separator"), Err(CommandError::Malformed));
        assert_eq!(parse_teach(" | answer"), Err(CommandError::Malformed));
        assert_eq!(parse_teach("question |  "), Err(CommandError::Malformed));
    }

    #[test]
    fn escalation_reply_wins_over_teach() {
        let r = router();
        let mut tracker = EscalationTracker::new();
        tracker.create("admin:9", "xyz123", "user");

        assert_eq!(
            r.route("teach: a | b", Some("admin:9"), &tracker),
            Route::EscalationReply {
                escalation_id: "admin:9".to_string()
            }
        );
        assert!(matches!(
            r.route("teach: a | b", Some("other"), &tracker),
            Route::Teach(Ok(_))
        ));
    }

    #[test]
    fn plain_text_is_a_query() {
        let tracker = EscalationTracker::new();
        assert_eq!(router().route("what are your hours", None, &tracker), Route::Query);
    }
}
