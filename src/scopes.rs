//! Named session scopes.
//!
//! A scope groups sessions for one consuming application and carries its idle
//! timeout. The `"default"` scope always exists and cannot be deleted.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::ApiError;

/// Name validation: starts with letter, then alphanumeric/underscore/hyphen, max 64 chars.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Per-scope settings, fixed at scope creation.
pub struct ScopeSettings {
    pub name: String,
    /// Idle timeout for sessions created in this scope. `None` = never expire.
    pub max_inactive: Option<Duration>,
}

/// Thread-safe registry of named scopes.
pub struct ScopeManager {
    scopes: DashMap<String, Arc<ScopeSettings>>,
    /// Timeout applied to scopes created without an explicit override.
    default_timeout: Option<Duration>,
}

impl ScopeManager {
    /// Creates a manager seeded with the `"default"` scope.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        let mgr = Self {
            scopes: DashMap::new(),
            default_timeout,
        };
        mgr.scopes.insert(
            "default".to_string(),
            Arc::new(ScopeSettings {
                name: "default".to_string(),
                max_inactive: default_timeout,
            }),
        );
        mgr
    }

    /// Returns the settings for a scope, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<ScopeSettings>> {
        self.scopes.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Creates a new scope. `timeout_secs` overrides the server default;
    /// 0 means sessions in this scope never expire.
    pub fn create(&self, name: &str, timeout_secs: Option<u64>) -> Result<Arc<ScopeSettings>, ApiError> {
        if !is_valid_name(name) {
            return Err(ApiError::BadRequest(format!(
                "invalid scope name '{name}': must start with a letter, contain only \
                 alphanumeric/underscore/hyphen, and be at most 64 characters"
            )));
        }

        let max_inactive = match timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => self.default_timeout,
        };

        let settings = Arc::new(ScopeSettings {
            name: name.to_string(),
            max_inactive,
        });

        match self.scopes.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ApiError::Conflict(format!("scope '{name}' already exists")))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&settings));
                tracing::info!(scope = %name, "scope created");
                Ok(settings)
            }
        }
    }

    /// Deletes a scope. The `"default"` scope cannot be deleted. The caller
    /// is responsible for invalidating the scope's sessions.
    pub fn delete(&self, name: &str) -> Result<(), ApiError> {
        if name == "default" {
            return Err(ApiError::BadRequest(
                "cannot delete the default scope".to_string(),
            ));
        }
        if self.scopes.remove(name).is_none() {
            return Err(ApiError::NotFound(format!("scope '{name}' not found")));
        }
        tracing::info!(scope = %name, "scope deleted");
        Ok(())
    }

    /// All scopes, sorted by name.
    pub fn list(&self) -> Vec<Arc<ScopeSettings>> {
        let mut result: Vec<Arc<ScopeSettings>> = self
            .scopes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Number of scopes.
    pub fn count(&self) -> usize {
        self.scopes.len()
    }
}
