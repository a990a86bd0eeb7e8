//! Edge modules: parameterised VCL snippets rendered from templates.
//!
//! Each module owns the snippets named `edgemodule_<id>_<type>`. Uploading
//! replaces them on a fresh clone; removing deletes them.

use std::fmt;
use std::str::FromStr;

use askama::Template;
use edgepurge_api_types::SnippetDraft;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{info, instrument};

use crate::application::vcl::{VclChangeSet, VclError, VclOutcome, VclWorkflow};

pub const EDGE_MODULE_PREFIX: &str = "edgemodule_";

const DEFAULT_SNIPPET_PRIORITY: u32 = 50;
const DEFAULT_CORS_METHODS: &str = "GET,HEAD,POST,OPTIONS";
const DEFAULT_LONG_JOB_TIMEOUT: u32 = 300;
/// First byte timeouts above ten minutes are rejected by the edge.
const MAX_LONG_JOB_TIMEOUT: u32 = 600;

#[derive(Debug, Error)]
pub enum EdgeModuleError {
    #[error("unknown edge module `{0}`")]
    UnknownModule(String),
    #[error("invalid values for `{module}`: {message}")]
    Params {
        module: &'static str,
        message: String,
    },
    #[error("failed to render `{module}`: {source}")]
    Render {
        module: &'static str,
        #[source]
        source: askama::Error,
    },
    #[error(transparent)]
    Workflow(#[from] VclError),
}

impl EdgeModuleError {
    fn params(module: EdgeModule, message: impl Into<String>) -> Self {
        Self::Params {
            module: module.id(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeModule {
    CorsHeaders,
    Countryblock,
    RedirectHosts,
    DisableCache,
    ForceCacheMissOnHardReloadForAdmins,
    IncreaseTimeoutsLongJobs,
    MobileDeviceDetection,
}

impl EdgeModule {
    pub const ALL: [EdgeModule; 7] = [
        Self::CorsHeaders,
        Self::Countryblock,
        Self::RedirectHosts,
        Self::DisableCache,
        Self::ForceCacheMissOnHardReloadForAdmins,
        Self::IncreaseTimeoutsLongJobs,
        Self::MobileDeviceDetection,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::CorsHeaders => "cors_headers",
            Self::Countryblock => "countryblock",
            Self::RedirectHosts => "redirect_hosts",
            Self::DisableCache => "disable_cache",
            Self::ForceCacheMissOnHardReloadForAdmins => {
                "force_cache_miss_on_hard_reload_for_admins"
            }
            Self::IncreaseTimeoutsLongJobs => "increase_timeouts_long_jobs",
            Self::MobileDeviceDetection => "mobile_device_detection",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CorsHeaders => "CORS headers",
            Self::Countryblock => "Country block",
            Self::RedirectHosts => "Redirect one domain to another",
            Self::DisableCache => "Disable caching",
            Self::ForceCacheMissOnHardReloadForAdmins => "Hard reload cache bypass for admins",
            Self::IncreaseTimeoutsLongJobs => "Increase timeouts for long running jobs",
            Self::MobileDeviceDetection => "Mobile theme support",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CorsHeaders => "Set CORS headers.",
            Self::Countryblock => "Block requests from a set of countries.",
            Self::RedirectHosts => {
                "Redirect hosts with a 301, e.g. example.com to www.example.com."
            }
            Self::DisableCache => {
                "Disable caching for matching paths at the edge, in the browser, or both."
            }
            Self::ForceCacheMissOnHardReloadForAdmins => {
                "Force a cache miss on a hard reload from an IP in the given ACL."
            }
            Self::IncreaseTimeoutsLongJobs => {
                "Pass matching paths to the origin with a longer timeout, up to 600 seconds."
            }
            Self::MobileDeviceDetection => {
                "Classify clients as mobile, tablet or desktop and vary the cache on it."
            }
        }
    }

    /// Snippet types the module renders, with their priorities.
    pub fn snippet_types(self) -> &'static [(&'static str, u32)] {
        match self {
            Self::CorsHeaders => &[("deliver", DEFAULT_SNIPPET_PRIORITY)],
            Self::Countryblock => &[
                ("recv", DEFAULT_SNIPPET_PRIORITY),
                ("error", DEFAULT_SNIPPET_PRIORITY),
            ],
            Self::RedirectHosts => &[("recv", 4), ("error", DEFAULT_SNIPPET_PRIORITY)],
            Self::DisableCache => &[
                ("recv", DEFAULT_SNIPPET_PRIORITY),
                ("deliver", DEFAULT_SNIPPET_PRIORITY),
            ],
            Self::ForceCacheMissOnHardReloadForAdmins => &[("recv", DEFAULT_SNIPPET_PRIORITY)],
            Self::IncreaseTimeoutsLongJobs => &[("recv", 80), ("pass", DEFAULT_SNIPPET_PRIORITY)],
            Self::MobileDeviceDetection => &[("recv", 45), ("fetch", 70), ("deliver", 70)],
        }
    }

    /// Prefix shared by every snippet of this module.
    pub fn snippet_prefix(self) -> String {
        format!("{EDGE_MODULE_PREFIX}{}_", self.id())
    }

    pub fn snippet_name(self, kind: &str) -> String {
        format!("{}{kind}", self.snippet_prefix())
    }

    /// Render the module's snippets from a TOML values document. Snippets
    /// that render to nothing are left out.
    pub fn render(self, values: &str) -> Result<Vec<SnippetDraft>, EdgeModuleError> {
        let rendered = match self {
            Self::CorsHeaders => render_cors(self, parse(self, values)?)?,
            Self::Countryblock => render_countryblock(self, parse(self, values)?)?,
            Self::RedirectHosts => render_redirects(self, parse(self, values)?)?,
            Self::DisableCache => render_disable_cache(self, parse(self, values)?)?,
            Self::ForceCacheMissOnHardReloadForAdmins => {
                render_hard_reload(self, parse(self, values)?)?
            }
            Self::IncreaseTimeoutsLongJobs => render_timeouts(self, parse(self, values)?)?,
            Self::MobileDeviceDetection => {
                parse::<MobileDetectionParams>(self, values)?;
                render_mobile_detection(self)?
            }
        };

        Ok(self
            .snippet_types()
            .iter()
            .zip(rendered)
            .filter(|(_, content)| !content.trim().is_empty())
            .map(|((kind, priority), content)| SnippetDraft {
                name: self.snippet_name(kind),
                kind: (*kind).to_string(),
                content,
                priority: *priority,
                dynamic: 0,
            })
            .collect())
    }
}

impl fmt::Display for EdgeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EdgeModule {
    type Err = EdgeModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|module| module.id() == s)
            .ok_or_else(|| EdgeModuleError::UnknownModule(s.to_string()))
    }
}

/// Catalog entry as printed by `edge-modules list`.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeModuleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub snippets: Vec<&'static str>,
}

pub fn catalog() -> Vec<EdgeModuleInfo> {
    EdgeModule::ALL
        .into_iter()
        .map(|module| EdgeModuleInfo {
            id: module.id(),
            name: module.name(),
            description: module.description(),
            snippets: module.snippet_types().iter().map(|(kind, _)| *kind).collect(),
        })
        .collect()
}

fn parse<T: DeserializeOwned>(module: EdgeModule, values: &str) -> Result<T, EdgeModuleError> {
    toml::from_str(values).map_err(|err| EdgeModuleError::params(module, err.to_string()))
}

/// Values are pasted into VCL string literals, which cannot escape quotes or
/// span lines.
fn vcl_string(module: EdgeModule, field: &str, value: &str) -> Result<String, EdgeModuleError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EdgeModuleError::params(
            module,
            format!("`{field}` must not be empty"),
        ));
    }
    if value.contains(['"', '\n', '\r']) {
        return Err(EdgeModuleError::params(
            module,
            format!("`{field}` must not contain quotes or line breaks"),
        ));
    }
    Ok(value.to_string())
}

fn render_template(
    module: EdgeModule,
    template: &impl Template,
) -> Result<String, EdgeModuleError> {
    template.render().map_err(|source| EdgeModuleError::Render {
        module: module.id(),
        source,
    })
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum CorsOrigin {
    #[default]
    Anyone,
    RegexMatch,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CorsParams {
    #[serde(default)]
    origin: CorsOrigin,
    cors_allowed_methods: Option<String>,
    cors_allowed_origins_regex: Option<String>,
}

#[derive(Template)]
#[template(path = "edge_modules/cors_headers_deliver.vcl", escape = "none")]
struct CorsDeliver {
    allow_any: bool,
    origin_regex: String,
    methods: String,
}

fn render_cors(module: EdgeModule, params: CorsParams) -> Result<Vec<String>, EdgeModuleError> {
    let methods = vcl_string(
        module,
        "cors_allowed_methods",
        params
            .cors_allowed_methods
            .as_deref()
            .unwrap_or(DEFAULT_CORS_METHODS),
    )?;
    let origin_regex = match params.origin {
        CorsOrigin::Anyone => String::new(),
        CorsOrigin::RegexMatch => vcl_string(
            module,
            "cors_allowed_origins_regex",
            params.cors_allowed_origins_regex.as_deref().unwrap_or(""),
        )?,
    };

    let deliver = CorsDeliver {
        allow_any: params.origin == CorsOrigin::Anyone,
        origin_regex,
        methods,
    };
    Ok(vec![render_template(module, &deliver)?])
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CountryblockParams {
    countries: Vec<String>,
}

#[derive(Template)]
#[template(path = "edge_modules/countryblock_recv.vcl", escape = "none")]
struct CountryblockRecv {
    countries: String,
}

#[derive(Template)]
#[template(path = "edge_modules/countryblock_error.vcl", escape = "none")]
struct CountryblockError;

fn render_countryblock(
    module: EdgeModule,
    params: CountryblockParams,
) -> Result<Vec<String>, EdgeModuleError> {
    let mut countries = Vec::with_capacity(params.countries.len());
    for code in &params.countries {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EdgeModuleError::params(
                module,
                format!("`{code}` is not a two-letter country code"),
            ));
        }
        if !countries.contains(&code) {
            countries.push(code);
        }
    }
    if countries.is_empty() {
        return Err(EdgeModuleError::params(module, "`countries` must not be empty"));
    }

    let recv = CountryblockRecv {
        countries: countries.join("|"),
    };
    Ok(vec![
        render_template(module, &recv)?,
        render_template(module, &CountryblockError)?,
    ])
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RedirectHostsParams {
    mappings: Vec<RawHostMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHostMapping {
    source: String,
    destination: String,
}

struct HostMapping {
    source: String,
    destination: String,
}

#[derive(Template)]
#[template(path = "edge_modules/redirect_hosts_recv.vcl", escape = "none")]
struct RedirectHostsRecv {
    mappings: Vec<HostMapping>,
}

#[derive(Template)]
#[template(path = "edge_modules/redirect_hosts_error.vcl", escape = "none")]
struct RedirectHostsError;

fn render_redirects(
    module: EdgeModule,
    params: RedirectHostsParams,
) -> Result<Vec<String>, EdgeModuleError> {
    let mut mappings = Vec::with_capacity(params.mappings.len());
    for mapping in params.mappings {
        let source = vcl_string(module, "source", &mapping.source)?.to_ascii_lowercase();
        let destination = vcl_string(module, "destination", &mapping.destination)?;
        if source == destination.to_ascii_lowercase() {
            return Err(EdgeModuleError::params(
                module,
                format!("`{source}` redirects to itself"),
            ));
        }
        mappings.push(HostMapping {
            source,
            destination,
        });
    }
    if mappings.is_empty() {
        return Err(EdgeModuleError::params(module, "`mappings` must not be empty"));
    }

    let recv = RedirectHostsRecv { mappings };
    Ok(vec![
        render_template(module, &recv)?,
        render_template(module, &RedirectHostsError)?,
    ])
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DisableCacheMode {
    Browser,
    Fastly,
    Both,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisableCacheParams {
    rules: Vec<DisableCacheRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisableCacheRule {
    pattern: String,
    mode: DisableCacheMode,
}

#[derive(Template)]
#[template(path = "edge_modules/disable_cache_recv.vcl", escape = "none")]
struct DisableCacheRecv {
    edge_patterns: Vec<String>,
}

#[derive(Template)]
#[template(path = "edge_modules/disable_cache_deliver.vcl", escape = "none")]
struct DisableCacheDeliver {
    browser_patterns: Vec<String>,
}

fn render_disable_cache(
    module: EdgeModule,
    params: DisableCacheParams,
) -> Result<Vec<String>, EdgeModuleError> {
    if params.rules.is_empty() {
        return Err(EdgeModuleError::params(module, "`rules` must not be empty"));
    }

    let mut edge_patterns = Vec::new();
    let mut browser_patterns = Vec::new();
    for rule in params.rules {
        let pattern = vcl_string(module, "pattern", &rule.pattern)?;
        if matches!(rule.mode, DisableCacheMode::Fastly | DisableCacheMode::Both) {
            edge_patterns.push(pattern.clone());
        }
        if matches!(rule.mode, DisableCacheMode::Browser | DisableCacheMode::Both) {
            browser_patterns.push(pattern);
        }
    }

    Ok(vec![
        render_template(module, &DisableCacheRecv { edge_patterns })?,
        render_template(module, &DisableCacheDeliver { browser_patterns })?,
    ])
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HardReloadParams {
    acl: String,
}

#[derive(Template)]
#[template(
    path = "edge_modules/force_cache_miss_on_hard_reload_for_admins_recv.vcl",
    escape = "none"
)]
struct HardReloadRecv {
    acl: String,
}

fn render_hard_reload(
    module: EdgeModule,
    params: HardReloadParams,
) -> Result<Vec<String>, EdgeModuleError> {
    // The ACL name is a bare VCL identifier, not a string literal.
    let acl = params.acl.trim();
    if acl.is_empty() || !acl.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EdgeModuleError::params(
            module,
            format!("`{acl}` is not a valid ACL name"),
        ));
    }
    let recv = HardReloadRecv {
        acl: acl.to_string(),
    };
    Ok(vec![render_template(module, &recv)?])
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeoutsParams {
    rules: Vec<RawTimeoutRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeoutRule {
    pattern: String,
    timeout: Option<u32>,
}

struct TimeoutRule {
    pattern: String,
    timeout: u32,
}

#[derive(Template)]
#[template(path = "edge_modules/increase_timeouts_long_jobs_recv.vcl", escape = "none")]
struct TimeoutsRecv {
    patterns: Vec<String>,
}

#[derive(Template)]
#[template(path = "edge_modules/increase_timeouts_long_jobs_pass.vcl", escape = "none")]
struct TimeoutsPass {
    rules: Vec<TimeoutRule>,
}

fn render_timeouts(
    module: EdgeModule,
    params: TimeoutsParams,
) -> Result<Vec<String>, EdgeModuleError> {
    if params.rules.is_empty() {
        return Err(EdgeModuleError::params(module, "`rules` must not be empty"));
    }

    let mut rules = Vec::with_capacity(params.rules.len());
    for rule in params.rules {
        let pattern = vcl_string(module, "pattern", &rule.pattern)?;
        let timeout = rule.timeout.unwrap_or(DEFAULT_LONG_JOB_TIMEOUT);
        if !(1..=MAX_LONG_JOB_TIMEOUT).contains(&timeout) {
            return Err(EdgeModuleError::params(
                module,
                format!("timeout for `{pattern}` must be between 1 and {MAX_LONG_JOB_TIMEOUT}"),
            ));
        }
        rules.push(TimeoutRule { pattern, timeout });
    }

    let recv = TimeoutsRecv {
        patterns: rules.iter().map(|rule| rule.pattern.clone()).collect(),
    };
    Ok(vec![
        render_template(module, &recv)?,
        render_template(module, &TimeoutsPass { rules })?,
    ])
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MobileDetectionParams {}

#[derive(Template)]
#[template(path = "edge_modules/mobile_device_detection_recv.vcl", escape = "none")]
struct MobileDetectionRecv;

#[derive(Template)]
#[template(path = "edge_modules/mobile_device_detection_fetch.vcl", escape = "none")]
struct MobileDetectionFetch;

#[derive(Template)]
#[template(path = "edge_modules/mobile_device_detection_deliver.vcl", escape = "none")]
struct MobileDetectionDeliver;

fn render_mobile_detection(module: EdgeModule) -> Result<Vec<String>, EdgeModuleError> {
    Ok(vec![
        render_template(module, &MobileDetectionRecv)?,
        render_template(module, &MobileDetectionFetch)?,
        render_template(module, &MobileDetectionDeliver)?,
    ])
}

/// Render `module`, replace its snippets on a clone and activate it.
#[instrument(skip(workflow, values), fields(module = %module))]
pub async fn upload(
    workflow: &VclWorkflow,
    module: EdgeModule,
    values: &str,
) -> Result<VclOutcome, EdgeModuleError> {
    let snippets = module.render(values)?;
    let change = VclChangeSet {
        snippets,
        remove_snippet_prefix: Some(module.snippet_prefix()),
        activate: true,
        ..VclChangeSet::default()
    };
    let outcome = workflow.apply(&change).await?;
    info!(version = outcome.version, "edge module uploaded");
    Ok(outcome)
}

/// Delete every snippet of `module` on a clone and activate it.
#[instrument(skip(workflow), fields(module = %module))]
pub async fn remove(
    workflow: &VclWorkflow,
    module: EdgeModule,
) -> Result<VclOutcome, EdgeModuleError> {
    let change = VclChangeSet {
        remove_snippet_prefix: Some(module.snippet_prefix()),
        activate: true,
        ..VclChangeSet::default()
    };
    let outcome = workflow.apply(&change).await?;
    info!(
        version = outcome.version,
        removed = outcome.removed_snippets.len(),
        "edge module removed"
    );
    Ok(outcome)
}
