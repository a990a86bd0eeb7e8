//! Request and response models for the CDN REST API.
//!
//! Field sets follow what the API returns in practice; unknown fields are
//! ignored and optional ones default so partial payloads still decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// `GET /tokens/self`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Service ids the token is restricted to. Empty means unrestricted.
    #[serde(default)]
    pub services: Vec<String>,
    /// Space separated scope list, e.g. `purge_select purge_all`.
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl TokenInfo {
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }
}

/// `GET /current_user`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CurrentUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionSummary {
    pub number: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
}

/// `GET /service` items and `GET /service/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Active version number.
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub versions: Vec<VersionSummary>,
}

/// `GET /service/{id}/details`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDetails {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active_version: Option<VersionSummary>,
    #[serde(default)]
    pub version: Option<VersionSummary>,
    #[serde(default)]
    pub versions: Vec<VersionSummary>,
}

/// `GET /service/{id}/version/{n}/validate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Human readable messages collected from `msg` and `errors`.
    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = self.msg.iter().cloned().collect();
        messages.extend(self.errors.iter().map(|error| match error {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }));
        messages
    }
}

/// Receipt returned by the URL and purge-all endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeReceipt {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// `POST /service/{id}/purge` answers with one purge id per surrogate key,
/// e.g. `{"key1": "108-1391560174-974124"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct KeyPurgeReceipt(pub BTreeMap<String, serde_json::Value>);

impl KeyPurgeReceipt {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn purge_id(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snippet {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub priority: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub dynamic: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub name: String,
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Acl {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dictionary {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub write_only: bool,
}

/// Configuration objects that can be written to a cloned version.
///
/// The API accepts `application/x-www-form-urlencoded` bodies, so each draft
/// exposes its fields as ordered pairs.
pub trait VersionObject {
    /// Collection path segment below `version/{n}/`.
    const COLLECTION: &'static str;

    fn name(&self) -> &str;
    fn form_fields(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SnippetDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub priority: u32,
    pub dynamic: u32,
}

impl VersionObject for SnippetDraft {
    const COLLECTION: &'static str = "snippet";

    fn name(&self) -> &str {
        &self.name
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("type", self.kind.clone()),
            ("content", self.content.clone()),
            ("priority", self.priority.to_string()),
            ("dynamic", self.dynamic.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConditionDraft {
    pub name: String,
    pub statement: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: u32,
}

impl VersionObject for ConditionDraft {
    const COLLECTION: &'static str = "condition";

    fn name(&self) -> &str {
        &self.name
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("statement", self.statement.clone()),
            ("type", self.kind.clone()),
            ("priority", self.priority.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RequestSettingDraft {
    pub name: String,
    pub action: String,
    pub request_condition: String,
}

impl VersionObject for RequestSettingDraft {
    const COLLECTION: &'static str = "request_settings";

    fn name(&self) -> &str {
        &self.name
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("action", self.action.clone()),
            ("request_condition", self.request_condition.clone()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponseObjectDraft {
    pub name: String,
    pub request_condition: String,
    pub content: String,
    pub content_type: String,
    pub status: u16,
    pub response: String,
}

impl VersionObject for ResponseObjectDraft {
    const COLLECTION: &'static str = "response_object";

    fn name(&self) -> &str {
        &self.name
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("request_condition", self.request_condition.clone()),
            ("content", self.content.clone()),
            ("content_type", self.content_type.clone()),
            ("status", self.status.to_string()),
            ("response", self.response.clone()),
        ]
    }
}

/// Image optimizer defaults for one service version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IoSettings {
    pub webp: bool,
    pub webp_quality: u8,
    pub jpeg_type: String,
    pub jpeg_quality: u8,
    pub upscale: bool,
    pub resize_filter: String,
}

/// JSON:API body of `PATCH /service/{id}/version/{n}/io_settings`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IoSettingsDocument {
    pub data: IoSettingsResource,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IoSettingsResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: IoSettings,
}

impl IoSettingsDocument {
    pub fn new(service_id: &str, version: u32, attributes: IoSettings) -> Self {
        Self {
            data: IoSettingsResource {
                id: format!("{service_id}-{version}-imageopto"),
                kind: "io_settings",
                attributes,
            },
        }
    }
}

/// Accepts `100`, `"100"` or `null`; the API is inconsistent about numeric fields.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
