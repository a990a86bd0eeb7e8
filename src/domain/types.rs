//! Shared domain values for purging and key derivation.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Emitted by the host when an extension is installed or removed. Every cached
/// object may depend on it, so it maps to a service-wide purge.
pub const EXTENSION_CHANGED_TAG: &str = "config:core.extension";

/// Emitted when this tool's own settings are saved. Never purged.
pub const OWN_CONFIG_TAG: &str = "config:edgepurge.settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeMethod {
    /// Evict immediately.
    #[default]
    Instant,
    /// Mark stale and let the edge revalidate.
    Soft,
}

impl PurgeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Soft => "soft",
        }
    }

    pub fn is_soft(self) -> bool {
        matches!(self, Self::Soft)
    }
}

impl Display for PurgeMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurgeMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Self::Instant),
            "soft" => Ok(Self::Soft),
            other => Err(DomainError::validation(
                "purge_method",
                format!("expected `instant` or `soft`, got `{other}`"),
            )),
        }
    }
}

/// Number of characters kept from the encoded digest of a tag.
///
/// Shorter keys keep `Surrogate-Key` headers small at the price of more
/// collisions. A collision only ever widens a purge, so it is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashLength(usize);

impl HashLength {
    pub const MIN: usize = 4;
    /// An MD5 digest encodes to 22 significant base64 characters.
    pub const MAX: usize = 22;
    pub const DEFAULT: Self = Self(4);

    pub fn new(value: usize) -> Result<Self, DomainError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(DomainError::validation(
                "hash_length",
                format!(
                    "must be between {} and {}, got {value}",
                    Self::MIN,
                    Self::MAX
                ),
            ));
        }
        Ok(Self(value))
    }

    pub fn clamped(value: usize) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for HashLength {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Scopes cache tags to one logical site sharing a CDN service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    const MAX_LEN: usize = 64;
    const GENERATED_LEN: usize = 8;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("site_id", "must not be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::validation(
                "site_id",
                format!("must be at most {} characters", Self::MAX_LEN),
            ));
        }
        // `:` separates the site id from the tag in hashed input.
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::validation(
                "site_id",
                "only letters, digits, `-` and `_` are allowed",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Random identifier for a site that was never configured.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..Self::GENERATED_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SiteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SiteId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SiteId> for String {
    fn from(value: SiteId) -> Self {
        value.0
    }
}

/// Hashed surrogate key as sent to the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PurgeKey(String);

impl PurgeKey {
    pub(crate) fn from_hash(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PurgeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One queued invalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Tags(Vec<String>),
    Url(String),
    Everything,
}

impl Invalidation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tags(_) => "tags",
            Self::Url(_) => "url",
            Self::Everything => "everything",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationState {
    Succeeded,
    Failed,
}

impl InvalidationState {
    pub fn from_outcome(ok: bool) -> Self {
        if ok { Self::Succeeded } else { Self::Failed }
    }
}

/// Events that may be forwarded to the chat webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    PurgeKeys,
    PurgeAll,
    VclUpdate,
    ConfigSave,
    MaintenancePage,
}

impl WebhookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurgeKeys => "purge_keys",
            Self::PurgeAll => "purge_all",
            Self::VclUpdate => "vcl_update",
            Self::ConfigSave => "config_save",
            Self::MaintenancePage => "maintenance_page",
        }
    }
}

impl FromStr for WebhookEvent {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purge_keys" => Ok(Self::PurgeKeys),
            "purge_all" => Ok(Self::PurgeAll),
            "vcl_update" => Ok(Self::VclUpdate),
            "config_save" => Ok(Self::ConfigSave),
            "maintenance_page" => Ok(Self::MaintenancePage),
            other => Err(DomainError::validation(
                "webhook.notifications",
                format!("unknown event `{other}`"),
            )),
        }
    }
}
