//! HTTP JSON providers.
//!
//! A provider is described by an [`HttpProviderSpec`]: one URL template per
//! capability, where the credential goes, and which top-level body fields mean
//! "quota exhausted" even though the status is 2xx. Bodies are returned as
//! JSON without interpretation.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{DataProvider, ProviderError, ProviderFuture};
use crate::keys::Capability;

/// HTTP request envelope used by provider transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, ProviderError>> + Send + 'a>>;

/// Transport seam so providers can be exercised without a network.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a>;
}

/// Production transport using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("tickguard/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut builder = self.client.get(&request.url).timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    ProviderError::timeout(format!("request timeout: {error}"))
                } else if error.is_connect() {
                    ProviderError::generic(format!("connection failed: {error}"))
                } else {
                    ProviderError::generic(format!("request failed: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|error| {
                ProviderError::generic(format!("failed to read response body: {error}"))
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Where the API key is attached to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPlacement {
    Header(&'static str),
    Query(&'static str),
}

/// Static description of an HTTP JSON provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProviderSpec {
    pub id: &'static str,
    /// `{identifier}` is replaced with the URL-encoded identifier.
    pub endpoints: HashMap<Capability, String>,
    pub credential: CredentialPlacement,
    /// Top-level body fields that signal an exhausted quota in a 2xx response.
    pub rate_limit_markers: Vec<&'static str>,
}

impl HttpProviderSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.endpoints.contains_key(&capability)
    }
}

/// [`DataProvider`] that performs one GET per fetch.
pub struct HttpJsonProvider {
    spec: HttpProviderSpec,
    api_key: String,
    timeout: Duration,
    client: Arc<dyn HttpClient>,
}

impl HttpJsonProvider {
    pub fn new(
        spec: HttpProviderSpec,
        api_key: impl Into<String>,
        timeout: Duration,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            spec,
            api_key: api_key.into(),
            timeout,
            client,
        }
    }

    pub fn spec(&self) -> &HttpProviderSpec {
        &self.spec
    }

    fn build_request(
        &self,
        capability: Capability,
        identifier: &str,
    ) -> Result<HttpRequest, ProviderError> {
        let template = self.spec.endpoints.get(&capability).ok_or_else(|| {
            ProviderError::generic(format!(
                "provider '{}' does not serve '{capability}'",
                self.spec.id
            ))
        })?;

        let mut url = template.replace("{identifier}", &urlencoding::encode(identifier));
        let mut headers = BTreeMap::new();
        match &self.spec.credential {
            CredentialPlacement::Header(name) => {
                headers.insert(name.to_ascii_lowercase(), self.api_key.clone());
            }
            CredentialPlacement::Query(param) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                url = format!(
                    "{url}{separator}{param}={}",
                    urlencoding::encode(&self.api_key)
                );
            }
        }

        Ok(HttpRequest {
            url,
            headers,
            timeout: self.timeout,
        })
    }
}

impl DataProvider for HttpJsonProvider {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn fetch<'a>(&'a self, capability: Capability, identifier: &'a str) -> ProviderFuture<'a> {
        Box::pin(async move {
            let request = self.build_request(capability, identifier)?;
            debug!(provider = self.spec.id, %capability, identifier, "provider request");
            let response = self.client.execute(request).await?;
            classify_response(&response, &self.spec.rate_limit_markers)
        })
    }
}

/// Turn a raw response into JSON or a classified failure.
///
/// 429 and marker fields in a 2xx body are rate limits; any other non-2xx
/// status and unparseable bodies are generic failures.
pub fn classify_response(
    response: &HttpResponse,
    rate_limit_markers: &[&str],
) -> Result<Value, ProviderError> {
    if response.status == 429 {
        return Err(ProviderError::rate_limited("upstream returned HTTP 429"));
    }
    if !response.is_success() {
        return Err(ProviderError::generic(format!(
            "upstream returned HTTP {}",
            response.status
        )));
    }

    let value: Value = serde_json::from_str(&response.body)
        .map_err(|error| ProviderError::generic(format!("response is not JSON: {error}")))?;

    if let Some(object) = value.as_object() {
        if let Some(marker) = rate_limit_markers
            .iter()
            .find(|marker| object.contains_key(**marker))
        {
            return Err(ProviderError::rate_limited(format!(
                "upstream quota notice in '{marker}' field"
            )));
        }
    }

    Ok(value)
}
