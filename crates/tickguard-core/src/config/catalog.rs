//! Built-in HTTP JSON providers and their per-capability priority.

use std::collections::HashMap;

use crate::keys::Capability;
use crate::provider::{CredentialPlacement, HttpProviderSpec};

/// One catalog entry: how to call the provider and whether it is mandatory.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub spec: HttpProviderSpec,
    /// Environment suffix, e.g. `FINNHUB` for `TICKGUARD_FINNHUB_API_KEY`.
    pub env_name: &'static str,
    pub base_url: &'static str,
    /// A missing credential is an error rather than a warning.
    pub required: bool,
}

impl CatalogEntry {
    /// Credential variables in lookup order.
    pub fn credential_env(&self) -> [String; 2] {
        [
            format!("TICKGUARD_{}_API_KEY", self.env_name),
            format!("{}_API_KEY", self.env_name),
        ]
    }
}

/// Provider ids per capability, highest priority first.
pub const PRIORITY: [(Capability, &[&str]); 4] = [
    (Capability::Quote, &["finnhub", "fmp", "alphavantage"]),
    (Capability::Fundamentals, &["fmp", "alphavantage"]),
    (Capability::News, &["finnhub", "alphavantage"]),
    (Capability::Filing, &["fmp"]),
];

pub fn builtin_providers() -> Vec<CatalogEntry> {
    vec![finnhub(), fmp(), alphavantage()]
}

fn finnhub() -> CatalogEntry {
    let base_url = "https://finnhub.io/api/v1";
    CatalogEntry {
        spec: HttpProviderSpec {
            id: "finnhub",
            endpoints: HashMap::from([
                (Capability::Quote, format!("{base_url}/quote?symbol={{identifier}}")),
                (
                    Capability::News,
                    format!("{base_url}/news-sentiment?symbol={{identifier}}"),
                ),
            ]),
            credential: CredentialPlacement::Header("X-Finnhub-Token"),
            rate_limit_markers: Vec::new(),
        },
        env_name: "FINNHUB",
        base_url,
        required: false,
    }
}

fn fmp() -> CatalogEntry {
    let base_url = "https://financialmodelingprep.com/api/v3";
    CatalogEntry {
        spec: HttpProviderSpec {
            id: "fmp",
            endpoints: HashMap::from([
                (Capability::Quote, format!("{base_url}/quote/{{identifier}}")),
                (Capability::Fundamentals, format!("{base_url}/profile/{{identifier}}")),
                (
                    Capability::Filing,
                    format!("{base_url}/sec_filings/{{identifier}}?limit=20"),
                ),
            ]),
            credential: CredentialPlacement::Query("apikey"),
            rate_limit_markers: Vec::new(),
        },
        env_name: "FMP",
        base_url,
        required: true,
    }
}

fn alphavantage() -> CatalogEntry {
    let base_url = "https://www.alphavantage.co/query";
    CatalogEntry {
        spec: HttpProviderSpec {
            id: "alphavantage",
            endpoints: HashMap::from([
                (
                    Capability::Quote,
                    format!("{base_url}?function=GLOBAL_QUOTE&symbol={{identifier}}"),
                ),
                (
                    Capability::Fundamentals,
                    format!("{base_url}?function=OVERVIEW&symbol={{identifier}}"),
                ),
                (
                    Capability::News,
                    format!("{base_url}?function=NEWS_SENTIMENT&tickers={{identifier}}"),
                ),
            ]),
            credential: CredentialPlacement::Query("apikey"),
            // Quota notices arrive with HTTP 200.
            rate_limit_markers: vec!["Note", "Information"],
        },
        env_name: "ALPHAVANTAGE",
        base_url,
        required: false,
    }
}
