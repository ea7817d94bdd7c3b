//! Lightweight Prometheus-compatible metrics using atomic counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a session left the registry, for metrics labelling.
#[derive(Clone, Copy)]
pub enum EndCause {
    /// Explicit invalidation by the client or an administrator.
    Invalidated,
    /// Idle timeout, detected by the sweep or lazily on access.
    Expired,
    /// The owning scope was deleted.
    ScopeDeleted,
}

impl EndCause {
    pub fn label(self) -> &'static str {
        match self {
            Self::Invalidated => "invalidated",
            Self::Expired => "expired",
            Self::ScopeDeleted => "scope_deleted",
        }
    }
}

const ALL_CAUSES: [EndCause; 3] = [EndCause::Invalidated, EndCause::Expired, EndCause::ScopeDeleted];

/// How an incoming request carried its session ID, for metrics labelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSource {
    Cookie,
    Url,
    None,
}

impl IdSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cookie => "cookie",
            Self::Url => "url",
            Self::None => "none",
        }
    }
}

/// Application-wide metrics collected via atomic counters.
pub struct Metrics {
    sessions_created_total: AtomicU64,
    ended_invalidated_total: AtomicU64,
    ended_expired_total: AtomicU64,
    ended_scope_deleted_total: AtomicU64,
    resolutions_cookie_total: AtomicU64,
    resolutions_url_total: AtomicU64,
    resolution_misses_total: AtomicU64,
    urls_encoded_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_created_total: AtomicU64::new(0),
            ended_invalidated_total: AtomicU64::new(0),
            ended_expired_total: AtomicU64::new(0),
            ended_scope_deleted_total: AtomicU64::new(0),
            resolutions_cookie_total: AtomicU64::new(0),
            resolutions_url_total: AtomicU64::new(0),
            resolution_misses_total: AtomicU64::new(0),
            urls_encoded_total: AtomicU64::new(0),
        }
    }

    fn ended(&self, cause: EndCause) -> &AtomicU64 {
        match cause {
            EndCause::Invalidated => &self.ended_invalidated_total,
            EndCause::Expired => &self.ended_expired_total,
            EndCause::ScopeDeleted => &self.ended_scope_deleted_total,
        }
    }

    /// Record a session creation.
    pub fn record_created(&self) {
        self.sessions_created_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` sessions leaving the registry for the given cause.
    pub fn record_ended(&self, cause: EndCause, count: usize) {
        if count > 0 {
            self.ended(cause).fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Record a successful session resolution by tracking source.
    pub fn record_resolution(&self, source: IdSource) {
        let counter = match source {
            IdSource::Cookie => &self.resolutions_cookie_total,
            IdSource::Url => &self.resolutions_url_total,
            IdSource::None => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that presented a session ID no longer live.
    pub fn record_miss(&self) {
        self.resolution_misses_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a URL rewritten by the encode operation.
    pub fn record_url_encoded(&self) {
        self.urls_encoded_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(
        &self,
        active_sessions: usize,
        peak_sessions: usize,
        scopes_total: usize,
        uptime_seconds: u64,
    ) -> String {
        let mut out = String::with_capacity(2048);

        // Gauges (live values)
        gauge(
            &mut out,
            "sessiond_active_sessions",
            "Current number of live sessions",
            active_sessions,
        );
        gauge(
            &mut out,
            "sessiond_peak_sessions",
            "High-water mark of concurrent sessions",
            peak_sessions,
        );
        gauge(
            &mut out,
            "sessiond_scopes_total",
            "Current number of session scopes",
            scopes_total,
        );
        gauge(
            &mut out,
            "sessiond_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds,
        );

        // Counters
        writeln!(
            out,
            "# HELP sessiond_sessions_created_total Total sessions created."
        )
        .unwrap();
        writeln!(out, "# TYPE sessiond_sessions_created_total counter").unwrap();
        writeln!(
            out,
            "sessiond_sessions_created_total {}",
            self.sessions_created_total.load(Ordering::Relaxed)
        )
        .unwrap();

        writeln!(
            out,
            "# HELP sessiond_sessions_ended_total Total sessions removed, by cause."
        )
        .unwrap();
        writeln!(out, "# TYPE sessiond_sessions_ended_total counter").unwrap();
        for cause in ALL_CAUSES {
            writeln!(
                out,
                "sessiond_sessions_ended_total{{cause=\"{}\"}} {}",
                cause.label(),
                self.ended(cause).load(Ordering::Relaxed)
            )
            .unwrap();
        }

        writeln!(
            out,
            "# HELP sessiond_resolutions_total Successful session resolutions, by tracking source."
        )
        .unwrap();
        writeln!(out, "# TYPE sessiond_resolutions_total counter").unwrap();
        writeln!(
            out,
            "sessiond_resolutions_total{{source=\"cookie\"}} {}",
            self.resolutions_cookie_total.load(Ordering::Relaxed)
        )
        .unwrap();
        writeln!(
            out,
            "sessiond_resolutions_total{{source=\"url\"}} {}",
            self.resolutions_url_total.load(Ordering::Relaxed)
        )
        .unwrap();

        writeln!(
            out,
            "# HELP sessiond_resolution_misses_total Requests presenting a dead session ID."
        )
        .unwrap();
        writeln!(out, "# TYPE sessiond_resolution_misses_total counter").unwrap();
        writeln!(
            out,
            "sessiond_resolution_misses_total {}",
            self.resolution_misses_total.load(Ordering::Relaxed)
        )
        .unwrap();

        writeln!(
            out,
            "# HELP sessiond_urls_encoded_total URLs rewritten with a session path parameter."
        )
        .unwrap();
        writeln!(out, "# TYPE sessiond_urls_encoded_total counter").unwrap();
        writeln!(
            out,
            "sessiond_urls_encoded_total {}",
            self.urls_encoded_total.load(Ordering::Relaxed)
        )
        .unwrap();

        out
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}
