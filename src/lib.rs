// src/lib.rs
//! Client for the Basestack Flags API.
//!
//! Flags are fetched per slug and kept in a per-client TTL cache. Concurrent
//! lookups of the same slug share a single network request.
//!
//! ```no_run
//! # async fn run() -> Result<(), basestack_flags::FlagError> {
//! let client = basestack_flags::Client::builder()
//!     .with_project_key("project-key")
//!     .with_environment_key("environment-key")
//!     .build()?;
//!
//! if let Some(flag) = client.get_flag("new-checkout").await? {
//!     println!("{} is enabled: {}", flag.slug, flag.enabled);
//! }
//! # Ok(())
//! # }
//! ```
use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde_json::Value;
use thiserror::Error;

pub mod adapter;
pub mod cache;
pub mod flag;
pub mod singleflight;
pub mod transport;

use crate::cache::MemoryCache;
use crate::flag::{is_error_response, parse_json, raw_flags_from_list, trim_trailing_slash, RawFlag};
use crate::singleflight::Singleflight;
use crate::transport::{ReqwestTransport, Transport, TransportError};

pub use crate::adapter::{FlagAdapter, Prefetch};
pub use crate::flag::{Flag, DEFAULT_ENDPOINT};

pub const DEFAULT_CACHE_TTL_MS: i64 = 30_000;

const PROJECT_KEY_HEADER: &str = "x-project-key";
const ENVIRONMENT_KEY_HEADER: &str = "x-environment-key";

const ENV_ENDPOINT: &str = "BASESTACK_FLAGS_ENDPOINT";
const ENV_PROJECT_KEY: &str = "BASESTACK_PROJECT_KEY";
const ENV_ENVIRONMENT_KEY: &str = "BASESTACK_ENVIRONMENT_KEY";
const ENV_CACHE_TTL_MS: &str = "BASESTACK_FLAGS_CACHE_TTL_MS";
const ENV_REQUEST_TIMEOUT_MS: &str = "BASESTACK_FLAGS_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, Error)]
pub enum FlagError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Basestack API request failed with status {status}")]
    RemoteRequestFailed { status: u16, body: Value },

    #[error("Unexpected response when {context}")]
    UnexpectedResponseShape { context: &'static str, body: Value },

    #[error(transparent)]
    TransportFailure(#[from] TransportError),
}

impl FlagError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FlagError::RemoteRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn response_body(&self) -> Option<&Value> {
        match self {
            FlagError::RemoteRequestFailed { body, .. }
            | FlagError::UnexpectedResponseShape { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FlagError::TransportFailure(e) if e.is_timeout())
    }
}

pub type FlagResult = Result<Option<Flag>, FlagError>;

struct ApiResponse {
    status: u16,
    body: Option<Value>,
    text: String,
}

impl ApiResponse {
    /// Parsed body, else the raw text as a JSON string, else `null` for an empty body.
    fn into_body(self) -> Value {
        body_or_text(self.body, self.text)
    }
}

struct Inner {
    endpoint: String,
    headers: HeaderMap,
    transport: Arc<dyn Transport>,
    cache: MemoryCache,
    in_flight: Singleflight<FlagResult>,
    request_timeout: Option<Duration>,
}

/// Handle to one tenant's flags. Clones share the same cache and in-flight table.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn debug_info(&self) -> String {
        format!(
            "Client {{ endpoint: {}, cache_ttl: {:?}, request_timeout: {:?} }}",
            self.inner.endpoint,
            self.inner.cache.ttl(),
            self.inner.request_timeout
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Fetches one flag, serving it from the cache while the entry is live.
    ///
    /// A 404, or a body shaped as `{"error": true}`, resolves to `Ok(None)`.
    pub async fn get_flag(&self, slug: &str) -> FlagResult {
        if slug.is_empty() {
            return Err(FlagError::InvalidArgument(
                "Flag slug can not be empty".to_string(),
            ));
        }

        if let Some(flag) = self.inner.cache.get(slug).await {
            debug!("Cache hit for flag '{}'", slug);
            return Ok(Some(flag));
        }

        let inner = Arc::clone(&self.inner);
        let owned_slug = slug.to_string();
        let (fetch, started) = self.inner.in_flight.join_or_start(
            slug,
            move || async move {
                let flag = inner.fetch_flag(&owned_slug).await?;
                if let Some(flag) = &flag {
                    inner.cache.insert(flag.clone()).await;
                }
                Ok::<_, FlagError>(flag)
            },
            |e| Err(TransportError::network(e).into()),
        );

        if !started {
            debug!("Joining in-flight fetch for flag '{}'", slug);
        }

        fetch.await
    }

    /// Fetches every flag and warms the per-slug cache with them.
    pub async fn list_flags(&self) -> Result<Vec<Flag>, FlagError> {
        let response = self.inner.request("/flags", false).await?;

        let raw_flags = raw_flags_from_list(response.into_body()).map_err(|body| {
            FlagError::UnexpectedResponseShape {
                context: "listing flags",
                body,
            }
        })?;

        let flags: Vec<Flag> = raw_flags.into_iter().map(Flag::from).collect();
        self.inner.cache.insert_all(&flags).await;
        debug!("Listed {} flags", flags.len());

        Ok(flags)
    }
}

impl Inner {
    async fn fetch_flag(&self, slug: &str) -> FlagResult {
        let path = format!("/flags/{}", urlencoding::encode(slug));
        debug!("Fetching flag '{}'", slug);

        let response = self.request(&path, true).await?;

        if response.status == 404 {
            debug!("Flag '{}' not found", slug);
            return Ok(None);
        }

        let body = response.into_body();

        if is_error_response(&body) {
            warn!("Flags API answered '{}' with an error payload, treating it as missing", slug);
            return Ok(None);
        }

        let raw = RawFlag::from_value(body).map_err(|body| FlagError::UnexpectedResponseShape {
            context: "fetching flag",
            body,
        })?;

        Ok(Some(Flag::from(raw)))
    }

    async fn request(&self, path: &str, allow_not_found: bool) -> Result<ApiResponse, FlagError> {
        let url = format!("{}{}", self.endpoint, path);
        let call = self.transport.get(&url, &self.headers);

        let response = match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::Timeout(timeout).into()),
            },
            None => call.await?,
        };

        let body = parse_json(&response.body);
        let success = response.is_success();
        let api_response = ApiResponse {
            status: response.status,
            body,
            text: response.body,
        };

        if api_response.status == 404 && allow_not_found {
            return Ok(api_response);
        }

        if !success {
            return Err(FlagError::RemoteRequestFailed {
                status: api_response.status,
                body: api_response.into_body(),
            });
        }

        Ok(api_response)
    }
}

pub struct ClientBuilder {
    endpoint: String,
    project_key: Option<String>,
    environment_key: Option<String>,
    headers: Vec<(String, String)>,
    http_client: Option<reqwest::Client>,
    transport: Option<Arc<dyn Transport>>,
    cache_ttl: Duration,
    request_timeout: Option<Duration>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_key: None,
            environment_key: None,
            headers: Vec::new(),
            http_client: None,
            transport: None,
            cache_ttl: ttl_from_ms(DEFAULT_CACHE_TTL_MS),
            request_timeout: None,
        }
    }

    /// Seeds a builder from `BASESTACK_*` environment variables.
    ///
    /// Later builder calls override anything read here.
    pub fn from_env() -> Self {
        let mut builder = Self::new();

        if let Ok(endpoint) = env::var(ENV_ENDPOINT) {
            builder = builder.with_endpoint(&endpoint);
        }
        if let Ok(key) = env::var(ENV_PROJECT_KEY) {
            builder = builder.with_project_key(&key);
        }
        if let Ok(key) = env::var(ENV_ENVIRONMENT_KEY) {
            builder = builder.with_environment_key(&key);
        }
        if let Ok(raw) = env::var(ENV_CACHE_TTL_MS) {
            match raw.trim().parse::<i64>() {
                Ok(ms) => builder = builder.with_cache_ttl_ms(ms),
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_CACHE_TTL_MS, raw, e),
            }
        }
        if let Ok(raw) = env::var(ENV_REQUEST_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => builder = builder.with_request_timeout(Duration::from_millis(ms)),
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_REQUEST_TIMEOUT_MS, raw, e),
            }
        }

        builder
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = trim_trailing_slash(endpoint).to_string();
        self
    }

    pub fn with_project_key(mut self, project_key: &str) -> Self {
        self.project_key = Some(project_key.to_string());
        self
    }

    pub fn with_environment_key(mut self, environment_key: &str) -> Self {
        self.environment_key = Some(environment_key.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Replaces the HTTP layer entirely; takes precedence over `with_http_client`.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Negative values clamp to zero, which disables caching.
    pub fn with_cache_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.cache_ttl = ttl_from_ms(ttl_ms);
        self
    }

    /// A zero duration means no timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn build(self) -> Result<Client, FlagError> {
        let project_key = required(self.project_key, "projectKey")?;
        let environment_key = required(self.environment_key, "environmentKey")?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FlagError::InvalidArgument(format!("header name '{}': {}", name, e)))?;
            headers.insert(name, header_value(value)?);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(PROJECT_KEY_HEADER, header_value(&project_key)?);
        headers.insert(ENVIRONMENT_KEY_HEADER, header_value(&environment_key)?);

        let transport = match (self.transport, self.http_client) {
            (Some(transport), _) => transport,
            (None, Some(http_client)) => Arc::new(ReqwestTransport::new(http_client)),
            (None, None) => {
                let http_client = reqwest::Client::builder()
                    .user_agent("Basestack-Flags-Rust")
                    .build()
                    .map_err(TransportError::network)?;
                Arc::new(ReqwestTransport::new(http_client))
            }
        };

        Ok(Client {
            inner: Arc::new(Inner {
                endpoint: self.endpoint,
                headers,
                transport,
                cache: MemoryCache::new(self.cache_ttl),
                in_flight: Singleflight::new(),
                request_timeout: self.request_timeout,
            }),
        })
    }
}

fn body_or_text(body: Option<Value>, text: String) -> Value {
    match body {
        Some(body) => body,
        None if text.is_empty() => Value::Null,
        None => Value::String(text),
    }
}

fn ttl_from_ms(ttl_ms: i64) -> Duration {
    Duration::from_millis(ttl_ms.max(0) as u64)
}

fn required(value: Option<String>, name: &str) -> Result<String, FlagError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(FlagError::InvalidArgument(format!(
            "'{}' is required to create the client",
            name
        ))),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, FlagError> {
    HeaderValue::from_str(value)
        .map_err(|e| FlagError::InvalidArgument(format!("header value '{}': {}", value, e)))
}
