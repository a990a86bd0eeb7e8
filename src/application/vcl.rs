//! Service version workflow: clone the active version, apply a change set,
//! validate and optionally activate.
//!
//! There is no rollback. A failure leaves the clone behind as an inactive
//! draft and reports the last state reached together with every message
//! collected on the way.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use edgepurge_api_types::{
    Acl, ConditionDraft, Dictionary, IoSettings, RequestSettingDraft, ResponseObjectDraft,
    Snippet, SnippetDraft,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::VclSettings;
use crate::domain::types::WebhookEvent;
use crate::infra::cdn::{CdnClient, CdnError};
use crate::infra::webhook::WebhookNotifier;

pub const SNIPPET_PREFIX: &str = "edgepurge";
pub const REQUEST_CONDITION: &str = "edgepurge_request";
pub const REQUEST_SETTING: &str = "edgepurge_setting";
pub const ERROR_PAGE_CONDITION: &str = "edgepurge_error_page_condition";
pub const ERROR_PAGE_RESPONSE_OBJECT: &str = "edgepurge_error_page_response_object";
pub const ERROR_PAGE_SNIPPET: &str = "edgepurge_error_page_deliver";

const COOKIE_PLACEHOLDER: &str = "@COOKIE_NO_CACHE@";
const DEFAULT_SNIPPET_PRIORITY: u32 = 50;

const BUNDLED_SNIPPETS: [(&str, &str); 4] = [
    ("recv", include_str!("../../vcl_snippets/recv.vcl")),
    ("deliver", include_str!("../../vcl_snippets/deliver.vcl")),
    ("error", include_str!("../../vcl_snippets/error.vcl")),
    ("fetch", include_str!("../../vcl_snippets/fetch.vcl")),
];
const ERROR_PAGE_DELIVER: &str = include_str!("../../vcl_snippets/errors/deliver.vcl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    None,
    Cloned,
    Validated,
    Activated,
}

#[derive(Debug, Error)]
#[error("VCL update stopped at {state:?}: {}", .messages.join("; "))]
pub struct VclError {
    pub state: VersionState,
    /// Draft version left behind, if the clone succeeded.
    pub version: Option<u32>,
    pub messages: Vec<String>,
}

impl VclError {
    pub(crate) fn new(
        state: VersionState,
        version: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            state,
            version,
            messages: vec![message.into()],
        }
    }
}

/// Objects to write to a fresh clone of the active version.
#[derive(Debug, Clone, Default)]
pub struct VclChangeSet {
    pub snippets: Vec<SnippetDraft>,
    pub conditions: Vec<ConditionDraft>,
    pub request_settings: Vec<RequestSettingDraft>,
    pub response_objects: Vec<ResponseObjectDraft>,
    /// Image optimizer defaults patched onto the clone after the upserts.
    pub io_settings: Option<IoSettings>,
    /// Snippets on the clone whose names start with this prefix are deleted
    /// before the upserts run.
    pub remove_snippet_prefix: Option<String>,
    pub activate: bool,
}

impl VclChangeSet {
    /// Default snippets, the pass condition and its request setting.
    pub async fn defaults(settings: &VclSettings, activate: bool) -> Result<Self, VclError> {
        let mut snippets = Vec::with_capacity(BUNDLED_SNIPPETS.len());
        for (kind, bundled) in BUNDLED_SNIPPETS {
            let mut content =
                load_snippet(settings.snippet_dir.as_deref(), kind, bundled).await?;
            if kind == "recv" {
                content = content.replace(
                    COOKIE_PLACEHOLDER,
                    &cookie_bypass_pattern(&settings.cookie_cache_bypass),
                );
            }
            snippets.push(SnippetDraft {
                name: format!("{SNIPPET_PREFIX}_{kind}"),
                kind: kind.to_string(),
                content,
                priority: DEFAULT_SNIPPET_PRIORITY,
                dynamic: 0,
            });
        }

        Ok(Self {
            snippets,
            conditions: vec![ConditionDraft {
                name: REQUEST_CONDITION.to_string(),
                statement: r#"req.http.x-pass == "1""#.to_string(),
                kind: "REQUEST".to_string(),
                priority: 90,
            }],
            request_settings: vec![RequestSettingDraft {
                name: REQUEST_SETTING.to_string(),
                action: "pass".to_string(),
                request_condition: REQUEST_CONDITION.to_string(),
            }],
            response_objects: Vec::new(),
            io_settings: None,
            remove_snippet_prefix: None,
            activate,
        })
    }

    /// Maintenance page served as a 503 whenever the origin fails.
    pub fn error_page(html: impl Into<String>) -> Self {
        Self {
            snippets: vec![SnippetDraft {
                name: ERROR_PAGE_SNIPPET.to_string(),
                kind: "deliver".to_string(),
                content: ERROR_PAGE_DELIVER.to_string(),
                priority: DEFAULT_SNIPPET_PRIORITY,
                dynamic: 0,
            }],
            conditions: vec![ConditionDraft {
                name: ERROR_PAGE_CONDITION.to_string(),
                statement: r#"req.http.ResponseObject == "970""#.to_string(),
                kind: "REQUEST".to_string(),
                priority: 10,
            }],
            request_settings: Vec::new(),
            response_objects: vec![ResponseObjectDraft {
                name: ERROR_PAGE_RESPONSE_OBJECT.to_string(),
                request_condition: ERROR_PAGE_CONDITION.to_string(),
                content: html.into(),
                content_type: "text/html".to_string(),
                status: 503,
                response: "Service Temporarily Unavailable".to_string(),
            }],
            io_settings: None,
            remove_snippet_prefix: None,
            activate: true,
        }
    }
}

/// `a|b|` for the recv snippet's cookie alternation, empty without cookies.
pub fn cookie_bypass_pattern(cookies: &[String]) -> String {
    let cookies: Vec<&str> = cookies
        .iter()
        .map(|cookie| cookie.trim())
        .filter(|cookie| !cookie.is_empty())
        .collect();
    if cookies.is_empty() {
        String::new()
    } else {
        format!("{}|", cookies.join("|"))
    }
}

async fn load_snippet(dir: Option<&Path>, kind: &str, bundled: &str) -> Result<String, VclError> {
    let Some(dir) = dir else {
        return Ok(bundled.to_string());
    };
    let path = dir.join(format!("{kind}.vcl"));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(bundled.to_string()),
        Err(err) => Err(VclError::new(
            VersionState::None,
            None,
            format!("failed to read {}: {err}", path.display()),
        )),
    }
}

/// Result of a completed workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct VclOutcome {
    pub version: u32,
    pub state: VersionState,
    pub removed_snippets: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct VclWorkflow {
    client: Arc<CdnClient>,
    notifier: WebhookNotifier,
}

impl VclWorkflow {
    pub fn new(client: Arc<CdnClient>, notifier: WebhookNotifier) -> Self {
        Self { client, notifier }
    }

    pub fn client(&self) -> &CdnClient {
        &self.client
    }

    pub(crate) async fn notify(&self, event: WebhookEvent, text: &str) {
        self.notifier.notify(event, text).await;
    }

    async fn active_version_number(&self) -> Result<u32, VclError> {
        match self.client.active_version().await {
            Ok(Some(version)) => Ok(version.number),
            Ok(None) => Err(VclError::new(
                VersionState::None,
                None,
                "service has no active version",
            )),
            Err(err) => Err(VclError::new(
                VersionState::None,
                None,
                format!("failed to read service versions: {err}"),
            )),
        }
    }

    /// Run the full sequence for `change`.
    #[instrument(skip_all, fields(service_id = %self.client.service_id()))]
    pub async fn apply(&self, change: &VclChangeSet) -> Result<VclOutcome, VclError> {
        let active = self.active_version_number().await?;
        let version = self
            .client
            .clone_version(active)
            .await
            .map_err(|err| {
                VclError::new(
                    VersionState::None,
                    None,
                    format!("failed to clone version {active}: {err}"),
                )
            })?
            .number;
        info!(active, version, "cloned active version");

        let fail = |state: VersionState, messages: Vec<String>| VclError {
            state,
            version: Some(version),
            messages,
        };

        let removed_snippets = match change.remove_snippet_prefix.as_deref() {
            Some(prefix) => self
                .remove_snippets(version, prefix)
                .await
                .map_err(|err| fail(VersionState::Cloned, vec![err.to_string()]))?,
            None => Vec::new(),
        };

        let mut messages = Vec::new();
        for condition in &change.conditions {
            let result = self.client.upsert_object(version, condition).await;
            record(&mut messages, &condition.name, result);
        }
        for snippet in &change.snippets {
            let result = self.client.upsert_object(version, snippet).await;
            record(&mut messages, &snippet.name, result);
        }
        for setting in &change.request_settings {
            let result = self.client.upsert_object(version, setting).await;
            record(&mut messages, &setting.name, result);
        }
        for object in &change.response_objects {
            let result = self.client.upsert_object(version, object).await;
            record(&mut messages, &object.name, result);
        }
        if let Some(settings) = &change.io_settings {
            let result = self.client.patch_io_settings(version, settings).await;
            record(&mut messages, "io_settings", result);
        }
        if !messages.is_empty() {
            return Err(fail(VersionState::Cloned, messages));
        }

        let report = self
            .client
            .validate_version(version)
            .await
            .map_err(|err| {
                fail(
                    VersionState::Cloned,
                    vec![format!("validation request failed: {err}")],
                )
            })?;
        if !report.is_ok() {
            let mut messages = report.messages();
            if messages.is_empty() {
                messages.push(format!("version {version} failed validation"));
            }
            return Err(fail(VersionState::Cloned, messages));
        }
        let warnings: Vec<String> = report
            .warnings
            .iter()
            .map(|warning| match warning {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        info!(version, warnings = warnings.len(), "version validated");

        if !change.activate {
            return Ok(VclOutcome {
                version,
                state: VersionState::Validated,
                removed_snippets,
                warnings,
            });
        }

        self.client
            .activate_version(version)
            .await
            .map_err(|err| {
                fail(
                    VersionState::Validated,
                    vec![format!("activation failed: {err}")],
                )
            })?;
        info!(version, "version activated");

        Ok(VclOutcome {
            version,
            state: VersionState::Activated,
            removed_snippets,
            warnings,
        })
    }

    async fn remove_snippets(&self, version: u32, prefix: &str) -> Result<Vec<String>, CdnError> {
        let mut removed = Vec::new();
        for snippet in self.client.snippets(version).await? {
            if snippet.name.starts_with(prefix) {
                self.client.delete_snippet(version, &snippet.name).await?;
                removed.push(snippet.name);
            }
        }
        Ok(removed)
    }

    /// Upload the default snippets, condition and request setting.
    pub async fn upload_defaults(
        &self,
        settings: &VclSettings,
        activate: bool,
    ) -> Result<VclOutcome, VclError> {
        let change = VclChangeSet::defaults(settings, activate).await?;
        let outcome = self.apply(&change).await?;
        let text = if outcome.state == VersionState::Activated {
            format!(
                "VCL updated and activated as version {} of service {}",
                outcome.version,
                self.client.service_id()
            )
        } else {
            format!(
                "VCL updated, but not activated, in version {} of service {}",
                outcome.version,
                self.client.service_id()
            )
        };
        self.notifier.notify(WebhookEvent::VclUpdate, &text).await;
        Ok(outcome)
    }

    /// Upload `html` as the maintenance page and activate it.
    pub async fn upload_error_page(&self, html: &str) -> Result<VclOutcome, VclError> {
        if html.trim().is_empty() {
            return Err(VclError::new(
                VersionState::None,
                None,
                "error page content is empty",
            ));
        }
        let outcome = self.apply(&VclChangeSet::error_page(html)).await?;
        self.notifier
            .notify(
                WebhookEvent::MaintenancePage,
                &format!(
                    "New error/maintenance page activated as version {} of service {}",
                    outcome.version,
                    self.client.service_id()
                ),
            )
            .await;
        Ok(outcome)
    }

    pub async fn active_snippets(&self) -> Result<Vec<Snippet>, VclError> {
        let version = self.active_version_number().await?;
        self.client
            .snippets(version)
            .await
            .map_err(|err| VclError::new(VersionState::None, None, err.to_string()))
    }

    pub async fn active_acls(&self) -> Result<Vec<Acl>, VclError> {
        let version = self.active_version_number().await?;
        self.client
            .acls(version)
            .await
            .map_err(|err| VclError::new(VersionState::None, None, err.to_string()))
    }

    pub async fn active_dictionaries(&self) -> Result<Vec<Dictionary>, VclError> {
        let version = self.active_version_number().await?;
        self.client
            .dictionaries(version)
            .await
            .map_err(|err| VclError::new(VersionState::None, None, err.to_string()))
    }
}

fn record<T>(messages: &mut Vec<String>, name: &str, result: Result<T, CdnError>) {
    if let Err(err) = result {
        warn!(object = name, error = %err, "failed to write version object");
        messages.push(format!("{name}: {err}"));
    }
}
