//! HTTP client for the CDN REST API.
//!
//! Every method returns `Result<_, CdnError>`; deciding what a failure means
//! for the caller (usually "log and report false") is left to the
//! application layer. The exceptions are the purge-credential checks,
//! whose contract is a plain verdict.

mod vcl;

use std::fmt;
use std::time::Duration;

use edgepurge_api_types::{
    CurrentUser, KeyPurgeReceipt, PurgeReceipt, ServiceDetails, ServiceSummary, TokenInfo,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::credentials::{CredentialVerdict, ScopeDecision, ScopePolicy};
use crate::domain::types::{PurgeKey, PurgeMethod};

pub const HEADER_API_KEY: &str = "Fastly-Key";
pub const HEADER_SOFT_PURGE: &str = "Fastly-Soft-Purge";
pub const HEADER_SURROGATE_KEY: &str = "Surrogate-Key";

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("credentials rejected (status {status})")]
    Unauthorized { status: u16 },
    #[error("server error: status {status} body {body}")]
    Server { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl CdnError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the failure means the stored credentials are no longer usable.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status } | Self::Server { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// API token and the service it operates on.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    service_id: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        service_id: impl Into<String>,
    ) -> Result<Self, CdnError> {
        let api_key = api_key.into().trim().to_string();
        let service_id = service_id.into().trim().to_string();
        if api_key.is_empty() {
            return Err(CdnError::invalid_input("api key is required"));
        }
        if service_id.is_empty() {
            return Err(CdnError::invalid_input("service id is required"));
        }
        Ok(Self {
            api_key,
            service_id,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("service_id", &self.service_id)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub purge_method: PurgeMethod,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            purge_method: PurgeMethod::Instant,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CdnClient {
    http: Client,
    base: Url,
    credentials: Credentials,
    purge_method: PurgeMethod,
}

impl CdnClient {
    pub fn new(
        api_host: &str,
        credentials: Credentials,
        options: ClientOptions,
    ) -> Result<Self, CdnError> {
        let mut base = Url::parse(api_host)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base,
            credentials,
            purge_method: options.purge_method,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("edgepurge/", env!("CARGO_PKG_VERSION"))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn service_id(&self) -> &str {
        self.credentials.service_id()
    }

    pub fn purge_method(&self) -> PurgeMethod {
        self.purge_method
    }

    fn url(&self, path: &str) -> Result<Url, CdnError> {
        self.base.join(path).map_err(CdnError::Url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, CdnError> {
        Ok(self
            .http
            .request(method, self.url(path)?)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(HEADER_API_KEY, self.credentials.api_key()))
    }

    fn purge_request(&self, path: &str) -> Result<RequestBuilder, CdnError> {
        let request = self.request(Method::POST, path)?;
        Ok(if self.purge_method.is_soft() {
            request.header(HEADER_SOFT_PURGE, "1")
        } else {
            request
        })
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CdnError> {
        let response = request.send().await?;
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, CdnError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CdnError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(CdnError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| CdnError::Decode(err.to_string()))
    }

    pub async fn token_info(&self) -> Result<TokenInfo, CdnError> {
        Self::send(self.request(Method::GET, "tokens/self")?).await
    }

    pub async fn current_user(&self) -> Result<CurrentUser, CdnError> {
        Self::send(self.request(Method::GET, "current_user")?).await
    }

    pub async fn service(&self) -> Result<ServiceSummary, CdnError> {
        let path = format!("service/{}", self.service_id());
        Self::send(self.request(Method::GET, &path)?).await
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceSummary>, CdnError> {
        Self::send(self.request(Method::GET, "service")?).await
    }

    pub async fn service_details(&self) -> Result<ServiceDetails, CdnError> {
        let path = format!("service/{}/details", self.service_id());
        Self::send(self.request(Method::GET, &path)?).await
    }

    /// Purge every object tagged with any of `keys` in a single request.
    ///
    /// The answer lists a purge id per key; an empty object counts as a
    /// failed purge.
    #[instrument(skip_all, fields(keys = keys.len(), method = %self.purge_method))]
    pub async fn purge_keys(&self, keys: &[PurgeKey]) -> Result<KeyPurgeReceipt, CdnError> {
        if keys.is_empty() {
            return Err(CdnError::invalid_input("no surrogate keys to purge"));
        }
        let header = keys
            .iter()
            .map(PurgeKey::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let path = format!("service/{}/purge", self.service_id());
        let request = self
            .purge_request(&path)?
            .header(HEADER_SURROGATE_KEY, header);
        let receipt: KeyPurgeReceipt = Self::send(request).await?;
        if receipt.is_empty() {
            return Err(CdnError::Decode(
                "key purge response lists no purged keys".to_string(),
            ));
        }
        Ok(receipt)
    }

    /// Purge a single absolute URL. Malformed input fails before any I/O.
    #[instrument(skip(self))]
    pub async fn purge_url(&self, url: &str) -> Result<PurgeReceipt, CdnError> {
        let path = url_purge_path(url)?;
        Self::send(self.purge_request(&path)?).await
    }

    /// Purge the whole service, including every other site sharing it.
    #[instrument(skip(self))]
    pub async fn purge_all(&self) -> Result<PurgeReceipt, CdnError> {
        let path = format!("service/{}/purge_all", self.service_id());
        Self::send(self.request(Method::POST, &path)?).await
    }

    /// Whether the token may purge on the configured service.
    ///
    /// The token needs both `purge_select` and `purge_all`, or `global` with
    /// an owner whose role is allowed by `policy`. It must also be able to
    /// reach the service. Any failure is logged and reported as `false`.
    pub async fn validate_purge_credentials(&self, policy: &ScopePolicy) -> bool {
        self.purge_credentials_verdict(policy).await.is_valid()
    }

    /// Like [`Self::validate_purge_credentials`], but keeps a rejected token
    /// apart from a check that could not be completed.
    #[instrument(skip_all, fields(service_id = %self.service_id()))]
    pub async fn purge_credentials_verdict(&self, policy: &ScopePolicy) -> CredentialVerdict {
        match self.check_purge_credentials(policy).await {
            Ok(true) => {
                info!("purge credentials accepted");
                CredentialVerdict::Valid
            }
            Ok(false) => {
                warn!("purge credentials lack the required scope or service access");
                CredentialVerdict::Denied
            }
            Err(err) if err.is_auth() => {
                warn!(status = ?err.status(), "purge credentials rejected by the API");
                CredentialVerdict::Denied
            }
            Err(err) => {
                error!(
                    severity = "critical",
                    endpoint = "tokens/self",
                    status = ?err.status(),
                    error = %err,
                    "purge credential validation failed"
                );
                CredentialVerdict::Unavailable
            }
        }
    }

    async fn check_purge_credentials(&self, policy: &ScopePolicy) -> Result<bool, CdnError> {
        let token = self.token_info().await?;
        let scoped = match policy.evaluate(token.scopes()) {
            ScopeDecision::Granted => true,
            ScopeDecision::RoleCheck => {
                let user = self.current_user().await?;
                debug!(role = ?user.role, "global token, checking owner role");
                user.role
                    .as_deref()
                    .is_some_and(|role| policy.role_allowed(role))
            }
            ScopeDecision::Denied => false,
        };
        if !scoped {
            return Ok(false);
        }

        if !token.services.is_empty() {
            return Ok(token
                .services
                .iter()
                .any(|service| service == self.service_id()));
        }

        // Unrestricted token: access is proven by reading the service.
        self.service().await?;
        Ok(true)
    }
}

/// `purge/{host}{path}{?query}` for an absolute http(s) URL.
pub fn url_purge_path(url: &str) -> Result<String, CdnError> {
    if url.is_empty() {
        return Err(CdnError::invalid_input("url must not be empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(CdnError::invalid_input(format!(
            "url `{url}` contains whitespace"
        )));
    }
    let parsed = Url::parse(url)
        .map_err(|err| CdnError::invalid_input(format!("url `{url}` is not absolute: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CdnError::invalid_input(format!(
            "url `{url}` must use http or https"
        )));
    }
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| CdnError::invalid_input(format!("url `{url}` has no host")))?;

    let mut path = format!("purge/{host}");
    if let Some(port) = parsed.port() {
        path.push_str(&format!(":{port}"));
    }
    path.push_str(parsed.path());
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok(path)
}
