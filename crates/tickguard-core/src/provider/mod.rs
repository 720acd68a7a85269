//! Provider contract.
//!
//! A provider is an opaque fetch function: given a capability and an
//! identifier it returns JSON or fails. The only thing the routing layer needs
//! to know about a failure is whether it was a rate limit.

pub mod http;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::keys::Capability;

pub use self::http::{CredentialPlacement, HttpJsonProvider, HttpProviderSpec};

/// Provider failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Counts toward the circuit breaker.
    Generic,
    /// Quarantines the provider; does not count toward the breaker.
    RateLimited,
    /// Hard timeout elapsed; counted as a generic failure.
    Timeout,
}

/// Structured provider error used by router fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Generic,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::RateLimited)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Generic => "provider.failed",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::Timeout => "provider.timeout",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ProviderError>> + Send + 'a>>;

/// Upstream data provider.
pub trait DataProvider: Send + Sync {
    fn id(&self) -> &str;

    fn fetch<'a>(&'a self, capability: Capability, identifier: &'a str) -> ProviderFuture<'a>;
}

/// Adapts a closure into a [`DataProvider`].
pub struct FnProvider<F> {
    id: String,
    fetch: F,
}

impl<F, Fut> FnProvider<F>
where
    F: Fn(Capability, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
{
    pub fn new(id: impl Into<String>, fetch: F) -> Self {
        Self {
            id: id.into(),
            fetch,
        }
    }
}

impl<F, Fut> DataProvider for FnProvider<F>
where
    F: Fn(Capability, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch<'a>(&'a self, capability: Capability, identifier: &'a str) -> ProviderFuture<'a> {
        Box::pin((self.fetch)(capability, identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_codes_follow_kind() {
        assert_eq!(ProviderError::generic("boom").code(), "provider.failed");
        assert!(ProviderError::rate_limited("slow down").is_rate_limited());
        assert_eq!(
            ProviderError::timeout("5s").to_string(),
            "5s (provider.timeout)"
        );
    }

    #[tokio::test]
    async fn closures_act_as_providers() {
        let provider = FnProvider::new("static", |capability: Capability, identifier: String| async move {
            Ok(json!({"capability": capability.as_str(), "identifier": identifier}))
        });

        assert_eq!(provider.id(), "static");
        let value = provider
            .fetch(Capability::Quote, "AAPL")
            .await
            .expect("static provider succeeds");
        assert_eq!(value["identifier"], "AAPL");
    }
}
