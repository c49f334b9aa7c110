//! Per-request logging sessions.
//!
//! Pipeline stages record properties of a request as they make decisions.
//! Recording is a side effect only; nothing reads a session to decide control
//! flow.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{info, warn};

/// Sink for per-request properties and errors.
pub trait RequestLoggingSession: Send + Sync + fmt::Debug {
    /// Record `name = value`, replacing an earlier value for `name`.
    fn log_property(&self, name: &str, value: &str);

    /// Record an error under `name`.
    fn log_error(&self, name: &str, error: &str);

    /// Snapshot of the recorded properties in first-insertion order.
    fn properties(&self) -> Vec<(String, String)>;
}

/// A session that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoggingSession;

impl RequestLoggingSession for NoopLoggingSession {
    fn log_property(&self, _name: &str, _value: &str) {}

    fn log_error(&self, _name: &str, _error: &str) {}

    fn properties(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct Entries {
    properties: IndexMap<String, String>,
    errors: IndexMap<String, String>,
}

/// Buffers properties and emits them as one structured event when dropped.
#[derive(Debug)]
pub struct TracingLoggingSession {
    request_id: String,
    entries: Mutex<Entries>,
}

impl TracingLoggingSession {
    /// A session for the request identified by `request_id`.
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// The request this session belongs to.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Recorded errors in first-insertion order.
    #[must_use]
    pub fn errors(&self) -> Vec<(String, String)> {
        self.lock()
            .errors
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestLoggingSession for TracingLoggingSession {
    fn log_property(&self, name: &str, value: &str) {
        self.lock()
            .properties
            .insert(name.to_owned(), value.to_owned());
    }

    fn log_error(&self, name: &str, error: &str) {
        self.lock().errors.insert(name.to_owned(), error.to_owned());
    }

    fn properties(&self) -> Vec<(String, String)> {
        self.lock()
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Drop for TracingLoggingSession {
    fn drop(&mut self) {
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let properties = serde_json::to_string(&entries.properties).unwrap_or_default();

        if entries.errors.is_empty() {
            info!(
                target: "s3proxy::request",
                request_id = %self.request_id,
                %properties,
                "Request completed"
            );
        } else {
            let errors = serde_json::to_string(&entries.errors).unwrap_or_default();
            warn!(
                target: "s3proxy::request",
                request_id = %self.request_id,
                %properties,
                %errors,
                "Request failed"
            );
        }
    }
}
