//! Shared application state: session registry, scopes, tracking, metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::id::IdGenerator;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::registry::SessionRegistry;
use crate::scopes::ScopeManager;
use crate::tracking::TrackingConfig;

/// Shared application state, cloneable across handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SessionRegistry,
    scopes: ScopeManager,
    tracking: TrackingConfig,
    metrics: Arc<Metrics>,
    rate_limiter: RateLimiter,
    auth_token: Option<String>,
    cors_origins: Vec<String>,
    start_time: Instant,
}

impl AppState {
    /// Creates application state from config.
    pub fn new(config: &Config) -> Self {
        let metrics = Arc::new(Metrics::new());
        let registry = SessionRegistry::new(
            IdGenerator::new(config.id_length),
            config.max_sessions,
            Arc::clone(&metrics),
        );
        let scopes = ScopeManager::new(config.default_max_inactive());

        Self {
            inner: Arc::new(Inner {
                registry,
                scopes,
                tracking: TrackingConfig::from_config(config),
                metrics,
                rate_limiter: RateLimiter::new(
                    config.rate_limit,
                    Duration::from_secs(config.rate_limit_window),
                ),
                auth_token: config.auth_token.clone(),
                cors_origins: config.cors_origins.clone(),
                start_time: Instant::now(),
            }),
        }
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Returns the scope manager.
    pub fn scopes(&self) -> &ScopeManager {
        &self.inner.scopes
    }

    /// Returns the tracking configuration.
    pub fn tracking(&self) -> &TrackingConfig {
        &self.inner.tracking
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Returns the rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    /// Returns the configured auth token, if any.
    pub fn auth_token(&self) -> Option<&str> {
        self.inner.auth_token.as_deref()
    }

    /// Returns the configured CORS allowed origins.
    pub fn cors_origins(&self) -> &[String] {
        &self.inner.cors_origins
    }

    /// Returns the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
