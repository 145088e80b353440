//! Session identifiers for the intent service.
//!
//! Dialogflow keeps conversational context per session. LINE events carry a
//! user id that doubles as the session; when it is missing a time-based id is
//! generated from an injected clock so tests can pin the value.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Generates a session id when the caller has none.
pub trait SessionIdSource: Send + Sync {
    fn generate(&self) -> String;
}

/// `session-<unix millis>` ids.
pub struct ClockSessionIds {
    clock: Arc<dyn Clock>,
}

impl ClockSessionIds {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl SessionIdSource for ClockSessionIds {
    fn generate(&self) -> String {
        format!("session-{}", self.clock.now_millis())
    }
}

/// Always returns the same id.
#[derive(Debug, Clone)]
pub struct FixedSessionIds {
    id: String,
}

impl FixedSessionIds {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl SessionIdSource for FixedSessionIds {
    fn generate(&self) -> String {
        self.id.clone()
    }
}

/// Use `session_id` unless it is blank, otherwise generate one.
pub fn session_or_generated(session_id: &str, ids: &dyn SessionIdSource) -> String {
    if session_id.trim().is_empty() {
        ids.generate()
    } else {
        session_id.to_string()
    }
}
