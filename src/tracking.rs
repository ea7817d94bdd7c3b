//! Dual-mode session tracking: cookies and URL rewriting.
//!
//! In cookie mode the session ID travels in a `Set-Cookie`/`Cookie` pair. In
//! URL mode it rides the request path as a `;name=value` path parameter,
//! which must be stripped from the URI *before* routing so routes still
//! match. `both` runs the two side by side, with the cookie taking
//! precedence when a request carries both.
//!
//! External IDs may carry an affinity suffix (`id:node`) so a fronting load
//! balancer can route by server instance; the suffix is stripped on parse.

use std::fmt::Write;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::uri::{PathAndQuery, Uri};
use axum::middleware::Next;
use axum::response::Response;

use crate::config::Config;
use crate::metrics::IdSource;
use crate::state::AppState;

/// Which transport carries the session ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TrackingMode {
    /// Cookie only.
    Cookie,
    /// URL rewriting only.
    Url,
    /// Both; cookie wins when a request carries both.
    Both,
}

impl TrackingMode {
    pub fn cookies_enabled(self) -> bool {
        matches!(self, Self::Cookie | Self::Both)
    }

    pub fn url_enabled(self) -> bool {
        matches!(self, Self::Url | Self::Both)
    }
}

/// `SameSite` cookie attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

/// The session ID an incoming request presented, if any.
#[derive(Clone, Debug)]
pub struct RequestedId {
    pub id: Option<String>,
    pub source: IdSource,
}

/// Everything needed to read and write session IDs on the wire.
#[derive(Clone)]
pub struct TrackingConfig {
    pub mode: TrackingMode,
    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    pub same_site: SameSite,
    pub cookie_max_age: Option<Duration>,
    /// Server instance tag appended to outgoing external IDs.
    pub affinity_id: Option<String>,
}

impl TrackingConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.tracking,
            cookie_name: config.cookie_name.clone(),
            cookie_path: config.cookie_path.clone(),
            cookie_domain: config.cookie_domain.clone(),
            cookie_secure: config.cookie_secure,
            cookie_http_only: !config.no_http_only,
            same_site: config.same_site,
            cookie_max_age: config.cookie_max_age.map(Duration::from_secs),
            affinity_id: config.affinity_id.clone(),
        }
    }

    /// The path-parameter marker. The parameter name is the cookie name
    /// lower-cased, so the two tracking modes stay paired.
    pub fn marker(&self) -> String {
        format!(";{}=", self.cookie_name.to_ascii_lowercase())
    }

    /// Formats the on-the-wire ID: `id` or `id:affinity`.
    pub fn format_external_id(&self, id: &str) -> String {
        match &self.affinity_id {
            Some(node) => format!("{id}:{node}"),
            None => id.to_string(),
        }
    }

    /// Strips any affinity suffix from an incoming external ID.
    pub fn parse_external_id<'a>(&self, raw: &'a str) -> &'a str {
        raw.split(':').next().unwrap_or(raw)
    }

    /// Builds the `Set-Cookie` value announcing a session.
    pub fn session_cookie(&self, id: &str) -> String {
        self.cookie(&self.format_external_id(id), self.cookie_max_age)
    }

    /// Builds the `Set-Cookie` value that discards the session cookie.
    pub fn clear_cookie(&self) -> String {
        self.cookie("", Some(Duration::ZERO))
    }

    fn cookie(&self, value: &str, max_age: Option<Duration>) -> String {
        let mut out = format!("{}={}", self.cookie_name, value);
        write!(out, "; Path={}", self.cookie_path).unwrap();
        if let Some(domain) = &self.cookie_domain {
            write!(out, "; Domain={domain}").unwrap();
        }
        if let Some(age) = max_age {
            write!(out, "; Max-Age={}", age.as_secs()).unwrap();
        }
        if self.cookie_secure {
            out.push_str("; Secure");
        }
        if self.cookie_http_only {
            out.push_str("; HttpOnly");
        }
        write!(out, "; SameSite={}", self.same_site.as_str()).unwrap();
        out
    }

    /// Extracts this tracker's external ID from a `Cookie` header.
    pub fn id_from_cookie_header(&self, header: &str) -> Option<String> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim().to_string())
    }

    /// Rewrites a URL to carry the session as a path parameter.
    ///
    /// The parameter lands at the end of the path component, before any query
    /// string or fragment. Absolute URLs and bare paths are both accepted.
    pub fn encode_url(&self, url: &str, id: &str) -> String {
        let (base, fragment) = match url.split_once('#') {
            Some((b, f)) => (b, Some(f)),
            None => (url, None),
        };
        let (path, query) = match base.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (base, None),
        };

        let mut out = path.to_string();
        // An absolute URL with no path gets one, so the parameter cannot
        // attach to the authority component.
        if let Some(scheme_end) = out.find("://")
            && !out[scheme_end + 3..].contains('/')
        {
            out.push('/');
        }
        write!(
            out,
            ";{}={}",
            self.cookie_name.to_ascii_lowercase(),
            self.format_external_id(id)
        )
        .unwrap();

        if let Some(q) = query {
            write!(out, "?{q}").unwrap();
        }
        if let Some(f) = fragment {
            write!(out, "#{f}").unwrap();
        }
        out
    }
}

/// Removes the `;name=value` marker segment from a URI path.
///
/// Returns the stripped path and the raw value, if present. The value ends
/// at the next `/`, `;`, or end-of-path; the query string is untouched by
/// construction (this operates on the path component only).
pub fn extract_from_path(path: &str, marker: &str) -> (String, Option<String>) {
    let Some(start) = path.find(marker) else {
        return (path.to_string(), None);
    };

    let value_start = start + marker.len();
    let rest = &path[value_start..];
    let value_end = rest.find(['/', ';']).unwrap_or(rest.len());
    let value = &rest[..value_end];

    let mut stripped = String::with_capacity(path.len());
    stripped.push_str(&path[..start]);
    stripped.push_str(&rest[value_end..]);
    if stripped.is_empty() {
        stripped.push('/');
    }

    let found = (!value.is_empty()).then(|| value.to_string());
    (stripped, found)
}

/// Pre-routing middleware: strips the URL marker (so routes match, the same
/// way a servlet container strips the path parameter before dispatch) and
/// records which ID the request presented in the request extensions.
pub async fn tracking_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let tracking = state.tracking();

    let mut url_id: Option<String> = None;
    if tracking.mode.url_enabled() {
        let marker = tracking.marker();
        let uri = req.uri();
        if let Some(pq) = uri.path_and_query()
            && pq.path().contains(marker.as_str())
        {
            let (stripped, found) = extract_from_path(pq.path(), &marker);
            url_id = found;

            let rewritten = match pq.query() {
                Some(q) => format!("{stripped}?{q}"),
                None => stripped,
            };
            if let Ok(new_pq) = rewritten.parse::<PathAndQuery>() {
                let mut parts = uri.clone().into_parts();
                parts.path_and_query = Some(new_pq);
                if let Ok(new_uri) = Uri::from_parts(parts) {
                    *req.uri_mut() = new_uri;
                }
            }
        }
    }

    let cookie_id = if tracking.mode.cookies_enabled() {
        req.headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| tracking.id_from_cookie_header(h))
    } else {
        None
    };

    // Cookie wins over a URL-carried ID when both are present.
    let requested = match (cookie_id, url_id) {
        (Some(raw), _) => RequestedId {
            id: Some(tracking.parse_external_id(&raw).to_string()),
            source: IdSource::Cookie,
        },
        (None, Some(raw)) => RequestedId {
            id: Some(tracking.parse_external_id(&raw).to_string()),
            source: IdSource::Url,
        },
        (None, None) => RequestedId {
            id: None,
            source: IdSource::None,
        },
    };
    req.extensions_mut().insert(requested);

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking(mode: TrackingMode) -> TrackingConfig {
        TrackingConfig {
            mode,
            cookie_name: "sid".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            cookie_http_only: true,
            same_site: SameSite::Lax,
            cookie_max_age: None,
            affinity_id: None,
        }
    }

    #[test]
    fn extract_strips_marker_mid_path() {
        let (path, id) = extract_from_path("/a;sid=XYZ/b", ";sid=");
        assert_eq!(path, "/a/b");
        assert_eq!(id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn extract_strips_marker_at_end() {
        let (path, id) = extract_from_path("/sessions/current;sid=XYZ", ";sid=");
        assert_eq!(path, "/sessions/current");
        assert_eq!(id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn extract_stops_at_next_parameter() {
        let (path, id) = extract_from_path("/a;sid=XYZ;other=1", ";sid=");
        assert_eq!(path, "/a;other=1");
        assert_eq!(id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn extract_without_marker_is_identity() {
        let (path, id) = extract_from_path("/a/b", ";sid=");
        assert_eq!(path, "/a/b");
        assert_eq!(id, None);
    }

    #[test]
    fn extract_empty_value_yields_none() {
        let (path, id) = extract_from_path("/a;sid=", ";sid=");
        assert_eq!(path, "/a");
        assert_eq!(id, None);
    }

    #[test]
    fn encode_plain_path() {
        let t = tracking(TrackingMode::Url);
        assert_eq!(t.encode_url("/app/page", "XYZ"), "/app/page;sid=XYZ");
    }

    #[test]
    fn encode_preserves_query_and_fragment() {
        let t = tracking(TrackingMode::Url);
        assert_eq!(
            t.encode_url("/app/page?x=1&y=2#top", "XYZ"),
            "/app/page;sid=XYZ?x=1&y=2#top"
        );
    }

    #[test]
    fn encode_absolute_url() {
        let t = tracking(TrackingMode::Url);
        assert_eq!(
            t.encode_url("https://example.com/a/b?q=1", "XYZ"),
            "https://example.com/a/b;sid=XYZ?q=1"
        );
    }

    #[test]
    fn encode_absolute_url_without_path() {
        let t = tracking(TrackingMode::Url);
        assert_eq!(
            t.encode_url("https://example.com", "XYZ"),
            "https://example.com/;sid=XYZ"
        );
    }

    #[test]
    fn affinity_suffix_round_trips() {
        let mut t = tracking(TrackingMode::Both);
        t.affinity_id = Some("node7".to_string());

        let external = t.format_external_id("XYZ");
        assert_eq!(external, "XYZ:node7");
        assert_eq!(t.parse_external_id(&external), "XYZ");
        // A suffix from another instance still parses to the core ID.
        assert_eq!(t.parse_external_id("XYZ:node3"), "XYZ");
        assert_eq!(t.parse_external_id("XYZ"), "XYZ");
    }

    #[test]
    fn cookie_header_parsing() {
        let t = tracking(TrackingMode::Cookie);
        assert_eq!(
            t.id_from_cookie_header("other=1; sid=ABC; theme=dark"),
            Some("ABC".to_string())
        );
        assert_eq!(t.id_from_cookie_header("other=1"), None);
        // Name must match exactly; `sid2` is a different cookie.
        assert_eq!(t.id_from_cookie_header("sid2=nope"), None);
    }

    #[test]
    fn set_cookie_carries_configured_attributes() {
        let mut t = tracking(TrackingMode::Cookie);
        t.cookie_secure = true;
        t.cookie_domain = Some("example.com".to_string());
        t.cookie_max_age = Some(Duration::from_secs(3600));

        let cookie = t.session_cookie("XYZ");
        assert_eq!(
            cookie,
            "sid=XYZ; Path=/; Domain=example.com; Max-Age=3600; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let t = tracking(TrackingMode::Cookie);
        let cookie = t.clear_cookie();
        assert!(cookie.starts_with("sid=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
