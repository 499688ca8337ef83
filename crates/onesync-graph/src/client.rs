//! Microsoft Graph API client
//!
//! [`GraphClient`] is the authenticated retry transport. Every attempt asks the
//! [`TokenSupplier`] for a fresh token, so a token refreshed between retries is
//! picked up without any coordination. The client holds only immutable
//! configuration and is safe to share across tasks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use onesync_core::ports::StaticToken;
//! use onesync_graph::client::GraphClient;
//! use reqwest::{header::HeaderMap, Method};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), onesync_graph::GraphError> {
//! let client = GraphClient::new(Arc::new(StaticToken::new("access-token-here")));
//! let cancel = CancellationToken::new();
//! let drive: serde_json::Value = client
//!     .execute_json(Method::GET, "/me/drive", None, &HeaderMap::new(), &cancel)
//!     .await?;
//! println!("{drive}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use onesync_core::config::{Config, UploadConfig, DEFAULT_GRAPH_BASE_URL};
use onesync_core::ports::TokenSupplier;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::retry::{api_error, send_with_retry, RetryPolicy};

const JSON: &str = "application/json";

/// Characters escaped in a single path segment. `:` is included because Graph
/// uses it to delimit path-based addressing (`/items/{id}:/{name}:/content`).
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encodes `segment` for use as one component of an API path
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with bearer authentication, base URL construction
/// and the shared retry policy.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// Source of bearer tokens, consulted once per attempt
    tokens: Arc<dyn TokenSupplier>,
    retry: RetryPolicy,
    user_agent: String,
    upload: UploadConfig,
    max_delta_pages: usize,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("user_agent", &self.user_agent)
            .field("upload", &self.upload)
            .field("max_delta_pages", &self.max_delta_pages)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Creates a client against the public Graph endpoint with default settings
    pub fn new(tokens: Arc<dyn TokenSupplier>) -> Self {
        Self::with_base_url(tokens, DEFAULT_GRAPH_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(tokens: Arc<dyn TokenSupplier>, base_url: impl Into<String>) -> Self {
        let defaults = Config::default();
        Self {
            client: Client::new(),
            base_url: trim_base(base_url.into()),
            tokens,
            retry: RetryPolicy::from(&defaults.retry),
            user_agent: defaults.graph.user_agent,
            upload: defaults.upload,
            max_delta_pages: defaults.delta.max_pages,
        }
    }

    /// Creates a client from a validated configuration.
    ///
    /// # Errors
    /// Returns [`GraphError::Validation`] listing every invalid field.
    pub fn from_config(config: &Config, tokens: Arc<dyn TokenSupplier>) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GraphError::Validation(joined));
        }

        debug!(base_url = %config.graph.base_url, "Creating GraphClient from configuration");
        Ok(Self {
            client: Client::new(),
            base_url: trim_base(config.graph.base_url.clone()),
            tokens,
            retry: RetryPolicy::from(&config.retry),
            user_agent: config.graph.user_agent.clone(),
            upload: config.upload.clone(),
            max_delta_pages: config.delta.max_pages,
        })
    }

    /// Replaces the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replaces the upload thresholds
    pub fn with_upload_config(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    /// Replaces the delta page ceiling used by `fetch_all`
    pub fn with_max_delta_pages(mut self, max_pages: usize) -> Self {
        self.max_delta_pages = max_pages;
        self
    }

    /// Uses a caller-configured `reqwest::Client` (proxies, timeouts, TLS)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    pub fn max_delta_pages(&self) -> usize {
        self.max_delta_pages
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for an API path such as `/me/drive`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Converts an absolute link returned by the API (e.g. a delta link) back
    /// into a path relative to the base URL.
    ///
    /// Returns `None` when the link does not start with the base URL at a path
    /// boundary, which is how links pointing at another host are rejected.
    pub fn path_from_link(&self, link: &str) -> Option<String> {
        let rest = link.strip_prefix(self.base_url.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
            Some(rest.to_string())
        } else {
            None
        }
    }

    /// Builds an authenticated request with a freshly supplied token
    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(GraphError::Token)?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(USER_AGENT, self.user_agent.as_str()))
    }

    /// Sends an authenticated request through the retry loop.
    ///
    /// `body`, when present, is sent as JSON. `extra_headers` are merged in
    /// after the standard ones. A 2xx response is returned with its body
    /// unread.
    ///
    /// # Errors
    /// [`GraphError::Api`] for non-retryable statuses or once retries run out,
    /// [`GraphError::Network`] after repeated transport failures,
    /// [`GraphError::Token`] if the token supplier fails, and
    /// [`GraphError::Cancelled`] as soon as `cancel` fires.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        extra_headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let url = self.url(path);
        debug!(%method, path, "Sending Graph request");

        send_with_retry(&self.retry, path, cancel, || {
            let method = method.clone();
            let body = body.clone();
            let url = url.as_str();
            async move {
                let mut request = self.authorized(method, url).await?;
                if let Some(body) = body {
                    request = request.header(CONTENT_TYPE, JSON).body(body);
                }
                Ok(request.headers(extra_headers.clone()))
            }
        })
        .await
    }

    /// [`execute`](Self::execute) followed by JSON decoding of the response body
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        extra_headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self
            .execute(method, path, body, extra_headers, cancel)
            .await?;
        decode_json(response).await
    }

    /// Sends a single authenticated attempt with an arbitrary body.
    ///
    /// Used where replaying the request is not safe or not wanted (simple
    /// upload). Non-2xx responses are drained and returned as
    /// [`GraphError::Api`] without retrying.
    pub async fn execute_once(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let url = self.url(path);
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            built = self.authorized(method, &url) => built?,
        };
        let request = request.header(CONTENT_TYPE, content_type).body(body);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            sent = request.send() => sent.map_err(|source| GraphError::Network { attempts: 1, source })?,
        };

        if response.status().is_success() {
            return Ok(response);
        }
        let error = api_error(response).await;
        warn!(
            path,
            status = error.status.as_u16(),
            request_id = error.request_id.as_deref().unwrap_or("-"),
            "Single-attempt request failed"
        );
        Err(GraphError::Api(error))
    }
}

/// Reads a response body and decodes it as JSON
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(GraphError::Body)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::InvalidResponse(format!("failed to decode JSON body: {e}")))
}

fn trim_base(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}
