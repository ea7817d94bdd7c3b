//! The session object: identity, timestamps, attributes, idle timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use utoipa::ToSchema;

/// A live in-memory session.
///
/// Wall-clock times are kept for reporting; monotonic instants drive the
/// expiry math so clock adjustments cannot invalidate (or resurrect) sessions.
pub struct Session {
    id: String,
    scope: String,
    user: Option<String>,
    created_at: SystemTime,
    last_accessed_at: SystemTime,
    last_accessed: Instant,
    /// Idle timeout. `None` means the session never expires.
    max_inactive: Option<Duration>,
    attributes: HashMap<String, serde_json::Value>,
    is_new: bool,
    access_count: u64,
}

impl Session {
    pub fn new(id: String, scope: String, user: Option<String>, max_inactive: Option<Duration>) -> Self {
        Self {
            id,
            scope,
            user,
            created_at: SystemTime::now(),
            last_accessed_at: SystemTime::now(),
            last_accessed: Instant::now(),
            max_inactive,
            attributes: HashMap::new(),
            is_new: true,
            access_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Marks an access: refreshes the idle clock and clears the new flag.
    /// A session stops being new once the client presents its ID back.
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.last_accessed_at = SystemTime::now();
        self.access_count += 1;
        self.is_new = false;
    }

    /// Whether the session has sat idle past its timeout as of `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.max_inactive {
            Some(limit) => now.saturating_duration_since(self.last_accessed) > limit,
            None => false,
        }
    }

    /// Overrides the idle timeout for this session. `None` disables expiry.
    pub fn set_max_inactive(&mut self, max_inactive: Option<Duration>) {
        self.max_inactive = max_inactive;
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: String, value: serde_json::Value) {
        self.attributes.insert(name, value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata snapshot without attribute values.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            scope: self.scope.clone(),
            user: self.user.clone(),
            created_at_ms: epoch_millis(self.created_at),
            last_accessed_at_ms: epoch_millis(self.last_accessed_at),
            max_inactive_secs: self.max_inactive.map(|d| d.as_secs()),
            attribute_names: self.attribute_names(),
            is_new: self.is_new,
            access_count: self.access_count,
        }
    }
}

/// Serializable session metadata, as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    /// Opaque session identifier.
    pub id: String,
    /// Scope the session belongs to.
    pub scope: String,
    /// User principal attached at creation, if any.
    pub user: Option<String>,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Last access time, milliseconds since the Unix epoch.
    pub last_accessed_at_ms: u64,
    /// Idle timeout in seconds. `null` means the session never expires.
    pub max_inactive_secs: Option<u64>,
    /// Names of stored attributes (values are fetched individually).
    pub attribute_names: Vec<String>,
    /// True until the client first presents the session ID back.
    pub is_new: bool,
    /// Number of accesses since creation.
    pub access_count: u64,
}

fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
