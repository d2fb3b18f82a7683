//! Rate-limited HTTP fetcher for feeds, sitemaps, pages and images
//!
//! Every outbound call of the hub goes through [`HubFetcher`]:
//! - Rate limiting with governor
//! - One explicit timeout per request (30s default)
//! - Descriptive User-Agent
//! - Charset-aware decoding of text bodies
//!
//! There is no inline retry. A failed fetch is retried by the next
//! scheduled sync.

use std::num::NonZeroU32;
use std::time::Duration;

use bytes::Bytes;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT},
    Client, Method, RequestBuilder, Response,
};
use url::Url;

use crate::config::CrawlerConfig;
use crate::utils::decode_body;
use crate::utils::error::FetchError;

/// Status and headers of a HEAD probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    /// Lowercased `Content-Type`, empty when absent
    pub content_type: String,
    /// URL after redirects
    pub final_url: String,
}

/// A downloaded binary body
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Bytes,
    pub content_type: String,
    pub final_url: String,
}

/// Per-request overrides
///
/// Headers set here apply to one request only; the shared client is
/// never mutated.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Shared HTTP fetcher
pub struct HubFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Default User-Agent
    user_agent: String,

    /// Default request timeout
    timeout: Duration,
}

impl HubFetcher {
    /// Create a fetcher
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(
        user_agent: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            user_agent: user_agent.to_string(),
            timeout,
        })
    }

    /// Create a fetcher from the `[crawler]` config section
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.user_agent,
            config.requests_per_second,
            config.request_timeout(),
        )
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET a text document, failing on non-2xx
    ///
    /// # Errors
    ///
    /// `FetchError::Status` for non-2xx, `FetchError::Timeout` and
    /// `FetchError::Http` for transport failures
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.get_text_with(url, &RequestOptions::default()).await
    }

    /// [`Self::get_text`] with per-request overrides
    pub async fn get_text_with(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<String, FetchError> {
        let response = self.send(Method::GET, url, options).await?;
        let response = ensure_success(url, response)?;
        let content_type = header_content_type(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched document");
        Ok(decode_body(&bytes, &content_type))
    }

    /// GET and report only the status code, without failing on non-2xx
    ///
    /// # Errors
    ///
    /// Transport failures only
    pub async fn probe_status(&self, url: &str, options: &RequestOptions) -> Result<u16, FetchError> {
        let response = self.send(Method::GET, url, options).await?;
        Ok(response.status().as_u16())
    }

    /// HEAD request following redirects
    ///
    /// # Errors
    ///
    /// Transport failures only; any status is returned to the caller
    pub async fn head(&self, url: &str, options: &RequestOptions) -> Result<HeadResponse, FetchError> {
        let response = self.send(Method::HEAD, url, options).await?;
        Ok(HeadResponse {
            status: response.status().as_u16(),
            content_type: header_content_type(&response).to_lowercase(),
            final_url: response.url().to_string(),
        })
    }

    /// GET a binary body, failing on non-2xx
    ///
    /// # Errors
    ///
    /// `FetchError::Status` for non-2xx, transport errors otherwise
    pub async fn get_bytes(&self, url: &str, options: &RequestOptions) -> Result<Download, FetchError> {
        let response = self.send(Method::GET, url, options).await?;
        let response = ensure_success(url, response)?;
        let content_type = header_content_type(&response);
        let final_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        Ok(Download {
            bytes,
            content_type,
            final_url,
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        tracing::debug!(method = %method, url = %url, "Sending request");
        self.build_request(method, parsed, options)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, e))
    }

    fn build_request(&self, method: Method, url: Url, options: &RequestOptions) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        let agent = options.user_agent.as_deref().unwrap_or(&self.user_agent);
        if let Ok(value) = HeaderValue::from_str(agent) {
            headers.insert(USER_AGENT, value);
        }
        // Overrides win over defaults
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        self.client
            .request(method, url)
            .headers(headers)
            .timeout(options.timeout.unwrap_or(self.timeout))
    }
}

fn ensure_success(url: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn header_content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_default()
}
