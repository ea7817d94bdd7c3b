//! Server configuration via CLI args and environment variables.

use std::time::Duration;

use clap::Parser;

use crate::tracking::{SameSite, TrackingMode};

/// HTTP session management server.
#[derive(Parser, Debug, Clone)]
#[command(name = "sessiond", version, about)]
pub struct Config {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "SESSIOND_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 7070, env = "SESSIOND_PORT")]
    pub port: u16,

    /// Session idle timeout in seconds (0 = sessions never expire).
    #[arg(long, default_value_t = 1800, env = "SESSIOND_SESSION_TIMEOUT")]
    pub session_timeout: u64,

    /// Interval between expired-session sweeps, in seconds.
    #[arg(long, default_value_t = 60, env = "SESSIOND_PURGE_INTERVAL")]
    pub purge_interval: u64,

    /// Session ID length in characters (clamped to 8..=64).
    #[arg(long, default_value_t = 23, env = "SESSIOND_ID_LENGTH")]
    pub id_length: usize,

    /// Maximum live sessions (0 = unlimited). Creation fails with 503 at the limit.
    #[arg(long, default_value_t = 0, env = "SESSIOND_MAX_SESSIONS")]
    pub max_sessions: usize,

    /// Session tracking mode.
    #[arg(long, value_enum, default_value_t = TrackingMode::Both, env = "SESSIOND_TRACKING")]
    pub tracking: TrackingMode,

    /// Session cookie name; also names the URL path parameter (lower-cased).
    #[arg(long, default_value = "sid", env = "SESSIOND_COOKIE_NAME")]
    pub cookie_name: String,

    /// Cookie Path attribute.
    #[arg(long, default_value = "/", env = "SESSIOND_COOKIE_PATH")]
    pub cookie_path: String,

    /// Cookie Domain attribute. Omit for host-only cookies.
    #[arg(long, env = "SESSIOND_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Set the Secure cookie attribute.
    #[arg(long, env = "SESSIOND_COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Cookie Max-Age in seconds. Omit for a browser-session cookie.
    #[arg(long, env = "SESSIOND_COOKIE_MAX_AGE")]
    pub cookie_max_age: Option<u64>,

    /// Disable the HttpOnly cookie attribute.
    #[arg(long, env = "SESSIOND_NO_HTTP_ONLY")]
    pub no_http_only: bool,

    /// Cookie SameSite attribute.
    #[arg(long, value_enum, default_value_t = SameSite::Lax, env = "SESSIOND_SAME_SITE")]
    pub same_site: SameSite,

    /// Instance tag appended to outgoing session IDs (`id:tag`) for
    /// load-balancer affinity routing.
    #[arg(long, env = "SESSIOND_AFFINITY_ID")]
    pub affinity_id: Option<String>,

    /// Bearer token for API authentication. If set, non-exempt endpoints require it.
    #[arg(long, env = "SESSIOND_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Per-IP request limit per window (0 = rate limiting disabled).
    #[arg(long, default_value_t = 0, env = "SESSIOND_RATE_LIMIT")]
    pub rate_limit: u64,

    /// Rate-limit window in seconds.
    #[arg(long, default_value_t = 60, env = "SESSIOND_RATE_LIMIT_WINDOW")]
    pub rate_limit_window: u64,

    /// CORS allowed origins (comma-separated). Empty for no CORS.
    #[arg(long, env = "SESSIOND_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "SESSIOND_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "SESSIOND_LOG_FORMAT")]
    pub log_format: String,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The default idle timeout as a `Duration`; `None` when disabled.
    pub fn default_max_inactive(&self) -> Option<Duration> {
        (self.session_timeout > 0).then(|| Duration::from_secs(self.session_timeout))
    }
}
