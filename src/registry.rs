//! Concurrent session registry with idle-timeout expiry.
//!
//! Sessions live in a sharded map keyed by ID. Each entry wraps the session
//! in `Arc<Mutex<_>>` so handlers can use it without holding the map's shard
//! lock. Expiry is enforced twice: lazily on every access, and by the
//! background sweep driven from the purge task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::id::IdGenerator;
use crate::metrics::{EndCause, Metrics};
use crate::session::{Session, SessionInfo};

/// Thread-safe registry of live sessions across all scopes.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    ids: IdGenerator,
    /// Capacity limit. 0 means unlimited.
    max_sessions: usize,
    peak: AtomicUsize,
    metrics: Arc<Metrics>,
}

impl SessionRegistry {
    pub fn new(ids: IdGenerator, max_sessions: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            sessions: DashMap::new(),
            ids,
            max_sessions,
            peak: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Mints an ID and registers a new session.
    ///
    /// Fails with `SessionLimitReached` when the capacity limit is hit. The
    /// check is best-effort under concurrency, matching an in-memory count
    /// limit rather than a hard admission barrier.
    pub fn create(
        &self,
        scope: &str,
        user: Option<String>,
        max_inactive: Option<Duration>,
    ) -> Result<(String, Arc<Mutex<Session>>), ApiError> {
        if self.max_sessions > 0 && self.sessions.len() >= self.max_sessions {
            return Err(ApiError::SessionLimitReached);
        }

        // Collisions are astronomically unlikely; the retry loop exists so a
        // collision degrades to a fresh draw instead of clobbering a session.
        for _ in 0..4 {
            let id = self.ids.generate();
            match self.sessions.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let session = Arc::new(Mutex::new(Session::new(
                        id.clone(),
                        scope.to_string(),
                        user,
                        max_inactive,
                    )));
                    slot.insert(Arc::clone(&session));
                    self.peak.fetch_max(self.sessions.len(), Ordering::Relaxed);
                    self.metrics.record_created();
                    tracing::debug!(session_id = %id, scope, "session created");
                    return Ok((id, session));
                }
            }
        }

        Err(ApiError::Internal(
            "could not mint a unique session id".to_string(),
        ))
    }

    /// Returns the live session for `id` and touches it.
    ///
    /// An expired entry is removed and reported as absent, so a dead session
    /// is never observable even before the sweep runs.
    pub fn resolve(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let entry = self.sessions.get(id)?;
        let arc = Arc::clone(entry.value());
        drop(entry); // release the shard lock before locking the session

        let mut session = arc.lock();
        if session.is_expired(Instant::now()) {
            drop(session);
            self.sessions.remove(id);
            self.metrics.record_ended(EndCause::Expired, 1);
            tracing::debug!(session_id = %id, "session expired on access");
            return None;
        }
        session.touch();
        drop(session);

        Some(arc)
    }

    /// Like `resolve` but without touching: administrative reads must not
    /// keep a session alive or clear its new flag.
    pub fn peek(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let entry = self.sessions.get(id)?;
        let arc = Arc::clone(entry.value());
        drop(entry);

        let expired = arc.lock().is_expired(Instant::now());
        if expired {
            self.sessions.remove(id);
            self.metrics.record_ended(EndCause::Expired, 1);
            return None;
        }
        Some(arc)
    }

    /// Explicitly invalidates a session. Returns whether it existed.
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            self.metrics.record_ended(EndCause::Invalidated, 1);
            tracing::debug!(session_id = %id, "session invalidated");
        }
        removed
    }

    /// Removes every expired session. Returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.lock().is_expired(now));
        let removed = before.saturating_sub(self.sessions.len());
        self.metrics.record_ended(EndCause::Expired, removed);
        removed
    }

    /// Removes all sessions belonging to a scope. Returns the count removed.
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.lock().scope() != scope);
        let removed = before.saturating_sub(self.sessions.len());
        self.metrics.record_ended(EndCause::ScopeDeleted, removed);
        removed
    }

    /// Number of live sessions (including not-yet-swept expired ones).
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// High-water mark of concurrent sessions.
    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of live sessions in one scope.
    pub fn count_scope(&self, scope: &str) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().lock().scope() == scope)
            .count()
    }

    /// Metadata snapshots of all sessions, sorted by ID.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| entry.value().lock().info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Metadata snapshots of one scope's sessions, sorted by ID.
    pub fn list_scope(&self, scope: &str) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value().lock();
                (session.scope() == scope).then(|| session.info())
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(IdGenerator::default(), max_sessions, Arc::new(Metrics::new()))
    }

    #[test]
    fn create_and_resolve() {
        let reg = registry(0);
        let (id, _) = reg.create("default", None, None).unwrap();
        assert_eq!(reg.active_count(), 1);

        let session = reg.resolve(&id).expect("session should resolve");
        let info = session.lock().info();
        assert_eq!(info.id, id);
        assert!(!info.is_new); // resolve touches
    }

    #[test]
    fn resolve_unknown_id_is_none() {
        let reg = registry(0);
        assert!(reg.resolve("nope").is_none());
    }

    #[test]
    fn expired_session_is_removed_on_access() {
        let reg = registry(0);
        let (id, _) = reg
            .create("default", None, Some(Duration::from_secs(0)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert!(reg.resolve(&id).is_none());
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn peek_does_not_touch() {
        let reg = registry(0);
        let (id, _) = reg.create("default", None, None).unwrap();

        let info = reg.peek(&id).unwrap().lock().info();
        assert!(info.is_new);
        assert_eq!(info.access_count, 0);
    }

    #[test]
    fn purge_removes_only_expired() {
        let reg = registry(0);
        let (short, _) = reg
            .create("default", None, Some(Duration::from_secs(0)))
            .unwrap();
        let (long, _) = reg
            .create("default", None, Some(Duration::from_secs(3600)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(reg.purge_expired(), 1);
        assert!(reg.peek(&short).is_none());
        assert!(reg.peek(&long).is_some());
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let reg = registry(2);
        reg.create("default", None, None).unwrap();
        reg.create("default", None, None).unwrap();
        assert!(matches!(
            reg.create("default", None, None),
            Err(ApiError::SessionLimitReached)
        ));

        // Freeing a slot allows creation again.
        let id = reg.list()[0].id.clone();
        assert!(reg.invalidate(&id));
        assert!(reg.create("default", None, None).is_ok());
    }

    #[test]
    fn scope_invalidation_removes_only_that_scope() {
        let reg = registry(0);
        reg.create("app1", None, None).unwrap();
        reg.create("app1", None, None).unwrap();
        reg.create("default", None, None).unwrap();

        assert_eq!(reg.count_scope("app1"), 2);
        assert_eq!(reg.invalidate_scope("app1"), 2);
        assert_eq!(reg.active_count(), 1);
        assert_eq!(reg.list_scope("default").len(), 1);
    }

    #[test]
    fn peak_tracks_high_water_mark() {
        let reg = registry(0);
        let (a, _) = reg.create("default", None, None).unwrap();
        reg.create("default", None, None).unwrap();
        assert_eq!(reg.peak_active(), 2);

        reg.invalidate(&a);
        assert_eq!(reg.active_count(), 1);
        assert_eq!(reg.peak_active(), 2);
    }
}
