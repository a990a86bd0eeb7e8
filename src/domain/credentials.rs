//! Rules deciding whether an API token may purge.

use serde::Serialize;
use sha2::{Digest, Sha256};

pub const SCOPE_PURGE_SELECT: &str = "purge_select";
pub const SCOPE_PURGE_ALL: &str = "purge_all";
pub const SCOPE_GLOBAL: &str = "global";

pub const DEFAULT_ALLOWED_ROLES: [&str; 2] = ["engineer", "superuser"];

/// Outcome of inspecting a token's scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    /// Both purge scopes are present.
    Granted,
    /// Only `global` is present; the owner's role decides.
    RoleCheck,
    Denied,
}

/// Result of validating purge credentials against the CDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialVerdict {
    Valid,
    /// Scope, role or service access is missing, or the token was rejected.
    Denied,
    /// The check itself failed (transport error, 5xx, unreadable body).
    Unavailable,
}

impl CredentialVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Denied => "denied",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Value worth remembering; an unavailable check says nothing about the
    /// credentials.
    pub fn cacheable(self) -> Option<bool> {
        match self {
            Self::Valid => Some(true),
            Self::Denied => Some(false),
            Self::Unavailable => None,
        }
    }
}

/// Role allowlist applied to `global`-scope tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePolicy {
    allowed_roles: Vec<String>,
}

impl ScopePolicy {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_roles: roles
                .into_iter()
                .map(|role| role.into().trim().to_ascii_lowercase())
                .filter(|role| !role.is_empty())
                .collect(),
        }
    }

    pub fn allowed_roles(&self) -> &[String] {
        &self.allowed_roles
    }

    pub fn evaluate<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> ScopeDecision {
        let mut select = false;
        let mut all = false;
        let mut global = false;
        for scope in scopes {
            match scope {
                SCOPE_PURGE_SELECT => select = true,
                SCOPE_PURGE_ALL => all = true,
                SCOPE_GLOBAL => global = true,
                _ => {}
            }
        }

        if select && all {
            ScopeDecision::Granted
        } else if global {
            ScopeDecision::RoleCheck
        } else {
            ScopeDecision::Denied
        }
    }

    pub fn role_allowed(&self, role: &str) -> bool {
        let role = role.trim().to_ascii_lowercase();
        self.allowed_roles.iter().any(|allowed| *allowed == role)
    }
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ROLES)
    }
}

/// Stable digest of the credential pair. A changed fingerprint means the
/// operator edited the credentials and any cached verdict is stale.
pub fn fingerprint(api_key: &str, service_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(service_id.as_bytes());
    hex::encode(hasher.finalize())
}
