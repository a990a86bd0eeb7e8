//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::StaleDirectives;
use crate::domain::credentials::{DEFAULT_ALLOWED_ROLES, ScopePolicy};
use crate::domain::image::{JpegType, OptimizeLevel, Quality, ResizeFilter};
use crate::domain::types::{HashLength, PurgeMethod, SiteId, WebhookEvent};

pub use cli::{
    CliArgs, Command, CredentialsArgs, CredentialsCommand, EdgeModulesArgs, EdgeModulesCommand,
    ErrorPageArgs, ErrorPageCommand, GlobalOverrides, ImageOptimizerCommand, PurgeArgs,
    PurgeTarget, ServiceArgs, ServiceCommand, TagsArgs, TokenArgs, TokenCommand, VclArgs,
    VclCommand,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const DEFAULT_API_HOST: &str = "https://api.fastly.com/";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_KEYS_PER_REQUEST: usize = 256;
const DEFAULT_PURGE_CONCURRENCY: usize = 1;
const DEFAULT_STATE_PATH: &str = "edgepurge-state.toml";
const DEFAULT_STALE_SECS: u64 = 604_800;
const DEFAULT_WEBHOOK_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cdn: CdnSettings,
    pub keys: KeySettings,
    pub credentials: CredentialSettings,
    pub state: StateSettings,
    pub stale: StaleSettings,
    pub webhook: WebhookSettings,
    pub vcl: VclSettings,
    pub image_optimizer: ImageOptimizerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone)]
pub struct CdnSettings {
    pub api_host: Url,
    pub api_key: Option<String>,
    pub service_id: Option<String>,
    pub purge_method: PurgeMethod,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_keys_per_request: NonZeroUsize,
    pub purge_concurrency: NonZeroUsize,
    pub log_purges: bool,
}

impl std::fmt::Debug for CdnSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnSettings")
            .field("api_host", &self.api_host.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("service_id", &self.service_id)
            .field("purge_method", &self.purge_method)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_keys_per_request", &self.max_keys_per_request)
            .field("purge_concurrency", &self.purge_concurrency)
            .field("log_purges", &self.log_purges)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KeySettings {
    pub hash_length: HashLength,
    pub site_id: Option<SiteId>,
}

#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub policy: ScopePolicy,
}

#[derive(Debug, Clone)]
pub struct StateSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct StaleSettings {
    pub stale_while_revalidate: Option<u64>,
    pub stale_if_error: Option<u64>,
}

impl StaleSettings {
    pub fn directives(&self) -> StaleDirectives {
        StaleDirectives {
            while_revalidate: self.stale_while_revalidate,
            if_error: self.stale_if_error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Present only when the webhook is enabled.
    pub url: Option<Url>,
    pub notifications: Vec<WebhookEvent>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct VclSettings {
    pub snippet_dir: Option<PathBuf>,
    pub cookie_cache_bypass: Vec<String>,
}

/// Defaults written to `io_settings` when the image optimizer is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptimizerSettings {
    pub optimize: OptimizeLevel,
    pub webp: bool,
    pub webp_quality: Quality,
    pub jpeg_type: JpegType,
    pub jpeg_quality: Quality,
    pub upscale: bool,
    pub resize_filter: ResizeFilter,
}

impl Default for ImageOptimizerSettings {
    fn default() -> Self {
        Self {
            optimize: OptimizeLevel::default(),
            webp: true,
            webp_quality: Quality::DEFAULT,
            jpeg_type: JpegType::default(),
            jpeg_quality: Quality::DEFAULT,
            upscale: false,
            resize_filter: ResizeFilter::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("EDGEPURGE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("credentials.allowed_roles")
            .with_list_parse_key("webhook.notifications")
            .with_list_parse_key("vcl.cookie_cache_bypass")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cdn: RawCdnSettings,
    keys: RawKeySettings,
    credentials: RawCredentialSettings,
    state: RawStateSettings,
    stale: RawStaleSettings,
    webhook: RawWebhookSettings,
    vcl: RawVclSettings,
    image_optimizer: RawImageOptimizerSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(token) = overrides.api_token.as_ref() {
            self.cdn.api_key = Some(token.clone());
        }
        if let Some(service_id) = overrides.service_id.as_ref() {
            self.cdn.service_id = Some(service_id.clone());
        }
        if let Some(method) = overrides.purge_method.as_ref() {
            self.cdn.purge_method = Some(method.clone());
        }
        if let Some(length) = overrides.hash_length {
            self.keys.hash_length = Some(length);
        }
        if let Some(site_id) = overrides.site_id.as_ref() {
            self.keys.site_id = Some(site_id.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cdn,
            keys,
            credentials,
            state,
            stale,
            webhook,
            vcl,
            image_optimizer,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cdn: build_cdn_settings(cdn)?,
            keys: build_key_settings(keys)?,
            credentials: build_credential_settings(credentials),
            state: build_state_settings(state),
            stale: build_stale_settings(stale)?,
            webhook: build_webhook_settings(webhook)?,
            vcl: build_vcl_settings(vcl),
            image_optimizer: build_image_optimizer_settings(image_optimizer)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cdn_settings(cdn: RawCdnSettings) -> Result<CdnSettings, LoadError> {
    let host = cdn.api_host.unwrap_or_else(|| DEFAULT_API_HOST.to_string());
    let api_host = Url::parse(host.trim())
        .map_err(|err| LoadError::invalid("cdn.api_host", format!("invalid URL: {err}")))?;
    if !matches!(api_host.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "cdn.api_host",
            "must use http or https",
        ));
    }

    let purge_method = match cdn.purge_method {
        Some(method) => PurgeMethod::from_str(&method)
            .map_err(|err| LoadError::invalid("cdn.purge_method", err.to_string()))?,
        None => PurgeMethod::default(),
    };

    let connect_timeout = positive_seconds(
        cdn.connect_timeout_seconds
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        "cdn.connect_timeout_seconds",
    )?;
    let request_timeout = positive_seconds(
        cdn.request_timeout_seconds
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        "cdn.request_timeout_seconds",
    )?;

    let max_keys_per_request = non_zero_usize(
        cdn.max_keys_per_request
            .unwrap_or(DEFAULT_MAX_KEYS_PER_REQUEST),
        "cdn.max_keys_per_request",
    )?;
    let purge_concurrency = non_zero_usize(
        cdn.purge_concurrency.unwrap_or(DEFAULT_PURGE_CONCURRENCY),
        "cdn.purge_concurrency",
    )?;

    Ok(CdnSettings {
        api_host,
        api_key: non_blank(cdn.api_key),
        service_id: non_blank(cdn.service_id),
        purge_method,
        connect_timeout,
        request_timeout,
        max_keys_per_request,
        purge_concurrency,
        log_purges: cdn.log_purges.unwrap_or(false),
    })
}

fn build_key_settings(keys: RawKeySettings) -> Result<KeySettings, LoadError> {
    let hash_length = match keys.hash_length {
        Some(length) => HashLength::new(length)
            .map_err(|err| LoadError::invalid("keys.hash_length", err.to_string()))?,
        None => HashLength::DEFAULT,
    };

    let site_id = non_blank(keys.site_id)
        .map(SiteId::new)
        .transpose()
        .map_err(|err| LoadError::invalid("keys.site_id", err.to_string()))?;

    Ok(KeySettings {
        hash_length,
        site_id,
    })
}

fn build_credential_settings(credentials: RawCredentialSettings) -> CredentialSettings {
    let policy = match credentials.allowed_roles {
        Some(roles) => ScopePolicy::new(roles),
        None => ScopePolicy::new(DEFAULT_ALLOWED_ROLES),
    };
    CredentialSettings { policy }
}

fn build_state_settings(state: RawStateSettings) -> StateSettings {
    StateSettings {
        path: state
            .path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
    }
}

fn build_stale_settings(stale: RawStaleSettings) -> Result<StaleSettings, LoadError> {
    let stale_while_revalidate = if stale.stale_while_revalidate.unwrap_or(false) {
        Some(
            stale
                .stale_while_revalidate_seconds
                .unwrap_or(DEFAULT_STALE_SECS),
        )
    } else {
        None
    };
    let stale_if_error = if stale.stale_if_error.unwrap_or(false) {
        Some(stale.stale_if_error_seconds.unwrap_or(DEFAULT_STALE_SECS))
    } else {
        None
    };

    if stale_while_revalidate == Some(0) {
        return Err(LoadError::invalid(
            "stale.stale_while_revalidate_seconds",
            "must be greater than zero",
        ));
    }
    if stale_if_error == Some(0) {
        return Err(LoadError::invalid(
            "stale.stale_if_error_seconds",
            "must be greater than zero",
        ));
    }

    Ok(StaleSettings {
        stale_while_revalidate,
        stale_if_error,
    })
}

fn build_webhook_settings(webhook: RawWebhookSettings) -> Result<WebhookSettings, LoadError> {
    let enabled = webhook.enabled.unwrap_or(false);
    let url = match (enabled, non_blank(webhook.url)) {
        (false, _) => None,
        (true, None) => {
            return Err(LoadError::invalid(
                "webhook.url",
                "required when the webhook is enabled",
            ));
        }
        (true, Some(url)) => Some(
            Url::parse(&url)
                .map_err(|err| LoadError::invalid("webhook.url", format!("invalid URL: {err}")))?,
        ),
    };

    let mut notifications = Vec::new();
    for name in webhook.notifications.unwrap_or_default() {
        let event = WebhookEvent::from_str(name.trim())
            .map_err(|err| LoadError::invalid("webhook.notifications", err.to_string()))?;
        if !notifications.contains(&event) {
            notifications.push(event);
        }
    }

    let connect_timeout = positive_seconds(
        webhook
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_WEBHOOK_CONNECT_TIMEOUT_SECS),
        "webhook.connect_timeout_seconds",
    )?;

    Ok(WebhookSettings {
        url,
        notifications,
        connect_timeout,
    })
}

fn build_vcl_settings(vcl: RawVclSettings) -> VclSettings {
    VclSettings {
        snippet_dir: vcl.snippet_dir,
        cookie_cache_bypass: vcl
            .cookie_cache_bypass
            .unwrap_or_default()
            .into_iter()
            .map(|cookie| cookie.trim().to_string())
            .filter(|cookie| !cookie.is_empty())
            .collect(),
    }
}

fn build_image_optimizer_settings(
    raw: RawImageOptimizerSettings,
) -> Result<ImageOptimizerSettings, LoadError> {
    let optimize = match non_blank(raw.optimize) {
        Some(level) => OptimizeLevel::from_str(&level)
            .map_err(|err| LoadError::invalid("image_optimizer.optimize", err.to_string()))?,
        None => OptimizeLevel::default(),
    };
    let jpeg_type = match non_blank(raw.jpeg_type) {
        Some(kind) => JpegType::from_str(&kind)
            .map_err(|err| LoadError::invalid("image_optimizer.jpeg_type", err.to_string()))?,
        None => JpegType::default(),
    };
    let resize_filter = match non_blank(raw.resize_filter) {
        Some(filter) => ResizeFilter::from_str(&filter).map_err(|err| {
            LoadError::invalid("image_optimizer.resize_filter", err.to_string())
        })?,
        None => ResizeFilter::default(),
    };
    let quality = |value: Option<u64>, key: &'static str| match value {
        Some(value) => {
            Quality::new("quality", value).map_err(|err| LoadError::invalid(key, err.to_string()))
        }
        None => Ok(Quality::DEFAULT),
    };

    let defaults = ImageOptimizerSettings::default();
    Ok(ImageOptimizerSettings {
        optimize,
        webp: raw.webp.unwrap_or(defaults.webp),
        webp_quality: quality(raw.webp_quality, "image_optimizer.webp_quality")?,
        jpeg_type,
        jpeg_quality: quality(raw.jpeg_quality, "image_optimizer.jpeg_quality")?,
        upscale: raw.upscale.unwrap_or(defaults.upscale),
        resize_filter,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    api_host: Option<String>,
    api_key: Option<String>,
    service_id: Option<String>,
    purge_method: Option<String>,
    connect_timeout_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
    max_keys_per_request: Option<usize>,
    purge_concurrency: Option<usize>,
    log_purges: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKeySettings {
    hash_length: Option<usize>,
    site_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCredentialSettings {
    allowed_roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStateSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStaleSettings {
    stale_while_revalidate: Option<bool>,
    stale_while_revalidate_seconds: Option<u64>,
    stale_if_error: Option<bool>,
    stale_if_error_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebhookSettings {
    enabled: Option<bool>,
    url: Option<String>,
    notifications: Option<Vec<String>>,
    connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawVclSettings {
    snippet_dir: Option<PathBuf>,
    cookie_cache_bypass: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawImageOptimizerSettings {
    optimize: Option<String>,
    webp: Option<bool>,
    webp_quality: Option<u64>,
    jpeg_type: Option<String>,
    jpeg_quality: Option<u64>,
    upscale: Option<bool>,
    resize_filter: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
