//! Capabilities and cache key namespacing.
//!
//! Keys have the shape `<domain>:<identifier>:<version>`, e.g. `quote:AAPL:v1`,
//! so that a whole domain can be invalidated with a glob such as `quote:*`.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version baked into every routed cache key.
pub const KEY_VERSION: &str = "v1";

/// Data capability a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Quote,
    Fundamentals,
    News,
    Filing,
}

impl Capability {
    pub const ALL: [Self; 4] = [Self::Quote, Self::Fundamentals, Self::News, Self::Filing];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
            Self::Filing => "filing",
        }
    }

    /// Ticker-keyed capabilities get upper-cased identifiers.
    pub const fn ticker_keyed(self) -> bool {
        !matches!(self, Self::News)
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote" | "quotes" => Ok(Self::Quote),
            "fundamentals" => Ok(Self::Fundamentals),
            "news" => Ok(Self::News),
            "filing" | "filings" => Ok(Self::Filing),
            other => Err(format!(
                "unknown capability '{other}' (expected quote, fundamentals, news or filing)"
            )),
        }
    }
}

/// Identifier that cannot be embedded in a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier '{identifier}': {reason}")]
pub struct InvalidIdentifier {
    pub identifier: String,
    pub reason: &'static str,
}

/// Trim and (for ticker capabilities) upper-case an identifier.
///
/// Key separators, whitespace and glob metacharacters are rejected so that a
/// key can never be mistaken for a pattern or straddle two namespaces.
pub fn normalize_identifier(
    capability: Capability,
    raw: &str,
) -> Result<String, InvalidIdentifier> {
    let trimmed = raw.trim();
    let invalid = |reason| InvalidIdentifier {
        identifier: raw.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("identifier must not be empty"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("identifier must not contain whitespace"));
    }
    if trimmed.contains(|ch| matches!(ch, ':' | '*' | '?' | '[' | ']')) {
        return Err(invalid("identifier must not contain ':' or glob characters"));
    }

    Ok(if capability.ticker_keyed() {
        trimmed.to_ascii_uppercase()
    } else {
        trimmed.to_string()
    })
}

/// Build the routed cache key for a capability and identifier.
pub fn cache_key(capability: Capability, identifier: &str) -> Result<String, InvalidIdentifier> {
    let identifier = normalize_identifier(capability, identifier)?;
    Ok(format!("{capability}:{identifier}:{KEY_VERSION}"))
}

/// Glob matching every key of one capability.
pub fn capability_pattern(capability: Capability) -> String {
    format!("{capability}:*")
}
