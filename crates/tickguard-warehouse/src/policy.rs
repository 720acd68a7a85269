//! Write-time TTL policy for persisted artifacts.
//!
//! The policy is consulted only when an artifact is written; the result is
//! stored as an absolute expiry so reads never need the policy again.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Persisted artifact families, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FilingSummary,
    CompanyProfile,
    NewsSentiment,
}

impl ArtifactKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilingSummary => "filing_summary",
            Self::CompanyProfile => "company_profile",
            Self::NewsSentiment => "news_sentiment",
        }
    }

    /// News sentiment is a historical record and is kept forever.
    pub const fn expires(self) -> bool {
        !matches!(self, Self::NewsSentiment)
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription tier of the account an artifact is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountTier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl AccountTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Premium => "premium",
        }
    }
}

impl FromStr for AccountTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown account tier '{other}'")),
        }
    }
}

/// Static `(artifact kind, account tier) -> TTL` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    filing_summary: [Duration; 3],
    company_profile: [Duration; 3],
}

impl Default for TtlPolicy {
    /// Lower tiers tolerate older artifacts, so they keep them longer.
    fn default() -> Self {
        Self {
            filing_summary: [DAY * 30, DAY * 14, DAY * 7],
            company_profile: [DAY * 7, DAY * 3, DAY],
        }
    }
}

impl TtlPolicy {
    pub fn with_ttl(mut self, kind: ArtifactKind, tier: AccountTier, ttl: Duration) -> Self {
        match kind {
            ArtifactKind::FilingSummary => self.filing_summary[tier_index(tier)] = ttl,
            ArtifactKind::CompanyProfile => self.company_profile[tier_index(tier)] = ttl,
            ArtifactKind::NewsSentiment => {}
        }
        self
    }

    /// TTL for a kind and tier; `None` for artifacts that never expire.
    pub fn ttl(&self, kind: ArtifactKind, tier: AccountTier) -> Option<Duration> {
        match kind {
            ArtifactKind::FilingSummary => Some(self.filing_summary[tier_index(tier)]),
            ArtifactKind::CompanyProfile => Some(self.company_profile[tier_index(tier)]),
            ArtifactKind::NewsSentiment => None,
        }
    }

    /// Absolute expiry in epoch milliseconds for an artifact written at `now_ms`.
    pub fn expires_at_ms(&self, kind: ArtifactKind, tier: AccountTier, now_ms: i64) -> Option<i64> {
        let ttl = self.ttl(kind, tier)?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Some(now_ms.saturating_add(ttl_ms))
    }
}

const fn tier_index(tier: AccountTier) -> usize {
    match tier {
        AccountTier::Free => 0,
        AccountTier::Pro => 1,
        AccountTier::Premium => 2,
    }
}
