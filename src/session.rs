//! Connection lifecycle state machine.
//!
//! The manager only decides; it never touches the transport. Each transition
//! returns a [`Recovery`] telling the engine which side effect to run
//! (schedule a re-initialization, purge session data, nothing).
//!
//! An initialization attempt stays in flight until the transport's
//! `initialize` call returns, even if `Authenticated` or `Ready` arrive
//! first. Any further attempt in that window is refused.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::errors::{is_corruption_message, CommandError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Initializing,
    Authenticated,
    Ready,
    Disconnected,
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated => "authenticated",
            SessionState::Ready => "ready",
            SessionState::Disconnected => "disconnected",
            SessionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Side effect the engine must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Post a re-initialization after the delay.
    Reinit { after: Duration },
    /// Remove session data, then re-initialize. With `teardown`, destroy the
    /// transport connection first.
    PurgeThenReinit { teardown: bool },
}

/// Outcome of an authorized `login` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginDecision {
    AlreadyReady,
    AlreadyInitializing,
    Start,
}

pub struct SessionManager {
    state: SessionState,
    /// Set from `begin_initialize` until the attempt settles.
    init_in_flight: bool,
    /// A re-init timer fired while an attempt was in flight.
    reinit_deferred: bool,
    reinit_delay: Duration,
    corruption_signatures: Vec<String>,
    publisher: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(reinit_delay: Duration, corruption_signatures: Vec<String>) -> Self {
        let (publisher, _) = watch::channel(SessionState::Idle);
        Self {
            state: SessionState::Idle,
            init_in_flight: false,
            reinit_deferred: false,
            reinit_delay,
            corruption_signatures,
            publisher,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receiver observing every state change (used by the health endpoint).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.publisher.subscribe()
    }

    fn set(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "Session state changed");
        }
        self.state = next;
        self.publisher.send_replace(next);
    }

    fn reinit_after_delay(&self) -> Recovery {
        Recovery::Reinit {
            after: self.reinit_delay,
        }
    }

    fn is_resting(&self) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::Disconnected)
    }

    /// Enter `Initializing`. Returns false, changing nothing, when an attempt
    /// is already in flight.
    pub fn begin_initialize(&mut self) -> bool {
        if self.init_in_flight {
            return false;
        }
        self.init_in_flight = true;
        self.set(SessionState::Initializing);
        true
    }

    /// A scheduled re-initialization fired. Only acts from a resting state;
    /// a session that recovered in the meantime is left alone. If an attempt
    /// is still in flight the re-init is replayed once it settles.
    pub fn reinit_due(&mut self) -> bool {
        if !self.is_resting() {
            return false;
        }
        if self.init_in_flight {
            self.reinit_deferred = true;
            return false;
        }
        self.begin_initialize()
    }

    /// The transport's `initialize` returned successfully.
    pub fn on_init_succeeded(&mut self) -> Recovery {
        self.init_in_flight = false;
        let deferred = std::mem::take(&mut self.reinit_deferred);
        if self.state == SessionState::Disconnected || (deferred && self.is_resting()) {
            self.reinit_after_delay()
        } else {
            Recovery::None
        }
    }

    pub fn on_init_failed(&mut self, err: &TransportError) -> Recovery {
        self.init_in_flight = false;
        let deferred = std::mem::take(&mut self.reinit_deferred);
        if self.state == SessionState::Faulted {
            // The fault path is already purging and will re-initialize.
            warn!("Initialization failed during fault recovery: {}", err);
            return Recovery::None;
        }
        self.set(SessionState::Idle);
        if err.is_corruption(&self.corruption_signatures) {
            warn!("Initialization failed with corrupted session state: {}", err);
            Recovery::PurgeThenReinit { teardown: false }
        } else if deferred {
            error!("Initialization failed, retrying: {}", err);
            self.reinit_after_delay()
        } else {
            error!("Initialization failed: {}", err);
            Recovery::None
        }
    }

    pub fn on_qr(&self) {
        info!("Login code received; waiting for the account to be linked");
    }

    pub fn on_authenticated(&mut self) {
        self.set(SessionState::Authenticated);
    }

    pub fn on_ready(&mut self) {
        self.set(SessionState::Ready);
    }

    pub fn on_disconnected(&mut self, reason: &str) -> Recovery {
        warn!(reason, "Transport disconnected");
        if self.state == SessionState::Faulted {
            // The fault path already owns recovery.
            return Recovery::None;
        }
        self.set(SessionState::Disconnected);
        self.reinit_after_delay()
    }

    /// Unexpected transport error. Only the corrupted-context signature
    /// triggers recovery; anything else is logged and ignored.
    pub fn on_transport_error(&mut self, cause: &str) -> Recovery {
        error!(cause, "Unexpected transport error");
        if self.state == SessionState::Faulted {
            return Recovery::None;
        }
        if is_corruption_message(cause, &self.corruption_signatures) {
            self.set(SessionState::Faulted);
            Recovery::PurgeThenReinit { teardown: true }
        } else {
            Recovery::None
        }
    }

    /// Session data was purged: rest in `Idle` until the re-init fires.
    pub fn on_purged(&mut self) -> Recovery {
        self.set(SessionState::Idle);
        self.reinit_after_delay()
    }

    /// Every purge attempt failed. Re-initialization is still attempted with
    /// whatever session data is left.
    pub fn on_purge_exhausted(&mut self, err: &str) -> Recovery {
        error!("Session data could not be removed, re-initializing anyway: {}", err);
        self.set(SessionState::Idle);
        self.reinit_after_delay()
    }

    /// `Faulted` counts as initializing: the purge path re-initializes on
    /// its own once session data is gone.
    pub fn login_requested(&self) -> LoginDecision {
        if self.state == SessionState::Ready {
            LoginDecision::AlreadyReady
        } else if self.init_in_flight || self.state == SessionState::Faulted {
            LoginDecision::AlreadyInitializing
        } else {
            LoginDecision::Start
        }
    }
}

/// Control commands are accepted only from the configured administrator.
pub fn authorize(sender_id: &str, admin_id: &str) -> Result<(), CommandError> {
    if sender_id == admin_id {
        Ok(())
    } else {
        Err(CommandError::Unauthorized(sender_id.to_string()))
    }
}
