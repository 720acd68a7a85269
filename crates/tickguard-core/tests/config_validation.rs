//! Behavior-driven tests for startup configuration and validation.
//!
//! Configuration is built from an explicit variable table; the process
//! environment is never read or modified.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::tempdir;
use tickguard_core::{
    AppConfig, CacheBackendKind, Capability, ConfigError, ManualClock, RuntimeMode,
};

fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let table: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    AppConfig::from_lookup(move |name| table.get(name).cloned())
}

const ALL_KEYS: [(&str, &str); 3] = [
    ("FINNHUB_API_KEY", "finnhub-key"),
    ("FMP_API_KEY", "fmp-key"),
    ("ALPHAVANTAGE_API_KEY", "av-key"),
];

// =============================================================================
// Validation Outcomes
// =============================================================================

#[test]
fn fully_configured_production_passes() {
    // Given: Every credential and a networked cache in production
    let mut vars = ALL_KEYS.to_vec();
    vars.push(("TICKGUARD_ENV", "production"));
    vars.push(("TICKGUARD_REDIS_URL", "redis://cache.internal:6379"));
    let config = config_from(&vars).expect("config");

    // When: It is validated
    let report = config.validate();

    // Then: No errors or warnings, and enforcement succeeds
    assert!(report.success, "unexpected errors: {:?}", report.errors);
    assert!(report.warnings.is_empty());
    assert!(report.enforce(config.mode).is_ok());
}

#[test]
fn missing_required_credential_is_fatal_in_production() {
    // Given: Production without the filing provider's key
    let config = config_from(&[
        ("FINNHUB_API_KEY", "finnhub-key"),
        ("ALPHAVANTAGE_API_KEY", "av-key"),
        ("TICKGUARD_ENV", "production"),
        ("REDIS_URL", "redis://cache.internal:6379"),
    ])
    .expect("config");

    // When: Validation is enforced
    let report = config.validate();
    let outcome = report.enforce(config.mode);

    // Then: Startup is refused with the collected messages
    assert!(!report.success);
    match outcome {
        Err(ConfigError::StartupValidation { errors }) => {
            assert_eq!(errors, report.errors);
            assert!(errors.iter().any(|message| message.contains("fmp")));
        }
        other => panic!("expected startup failure, got {other:?}"),
    }
}

#[test]
fn the_same_problems_are_non_fatal_in_development() {
    // Given: Development mode with nothing configured
    let config = config_from(&[]).expect("config");
    assert_eq!(config.mode, RuntimeMode::Development);

    // When: Validation is enforced
    let report = config.validate();

    // Then: Problems are reported but startup continues
    assert!(!report.success);
    assert!(!report.errors.is_empty());
    assert!(report.enforce(config.mode).is_ok());
}

#[test]
fn memory_cache_is_an_error_only_in_production() {
    let mut production = ALL_KEYS.to_vec();
    production.push(("APP_ENV", "production"));
    let report = config_from(&production).expect("config").validate();
    assert!(report
        .errors
        .iter()
        .any(|message| message.contains("networked cache")));

    let report = config_from(&ALL_KEYS).expect("config").validate();
    assert!(report.success);
    assert!(report
        .warnings
        .iter()
        .any(|message| message.contains("memory cache")));
}

#[test]
fn every_capability_needs_an_enabled_provider() {
    // Given: Only the quote/news provider has a key
    let config = config_from(&[("FINNHUB_API_KEY", "finnhub-key")]).expect("config");

    // Then: Capabilities it cannot serve are reported
    let report = config.validate();
    for capability in [Capability::Fundamentals, Capability::Filing] {
        assert!(
            report
                .errors
                .iter()
                .any(|message| message.contains(&format!("'{capability}'"))),
            "{capability} should be reported: {:?}",
            report.errors
        );
    }
    assert!(!report
        .errors
        .iter()
        .any(|message| message.contains("'quote'")));
}

#[test]
fn reports_never_contain_api_keys() {
    let config = config_from(&ALL_KEYS).expect("config");
    let report = config.validate();

    let rendered = serde_json::to_string(&report).expect("report serializes");
    for (_, key) in ALL_KEYS {
        assert!(!rendered.contains(key));
    }
}

// =============================================================================
// Wiring From Configuration
// =============================================================================

#[test]
fn redis_url_selects_the_shared_backend() {
    let config = config_from(&[
        ("TICKGUARD_REDIS_URL", "redis://:hunter2@cache.internal:6379/1"),
        ("TICKGUARD_CACHE_NAMESPACE", "staging"),
    ])
    .expect("config");

    let details = config.cache_provider_details();
    assert_eq!(details.kind, CacheBackendKind::Redis);
    assert_eq!(details.namespace.as_deref(), Some("staging"));
    assert!(!details.location.contains("hunter2"));
    assert!(!format!("{config:?}").contains("hunter2"));
}

#[tokio::test]
async fn artifact_store_opens_at_the_configured_path() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("artifacts.duckdb");
    let config = config_from(&[(
        "TICKGUARD_WAREHOUSE_PATH",
        db_path.to_str().expect("utf-8 path"),
    )])
    .expect("config");

    let store = config
        .open_artifact_store(Arc::new(ManualClock::new(0)))
        .expect("store opens");

    assert_eq!(store.warehouse().db_path(), db_path.as_path());
    assert_eq!(store.cleanup_expired_data().await, 0);
}

#[test]
fn router_lists_providers_in_priority_order() {
    let config = config_from(&ALL_KEYS).expect("config");
    let router = config
        .build_router(
            Arc::new(ManualClock::new(0)),
            Arc::new(tickguard_core::ReqwestHttpClient::new()),
        )
        .expect("router");

    let quote: Vec<String> = router
        .providers_for(Capability::Quote)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(quote, vec!["finnhub", "fmp", "alphavantage"]);
    assert_eq!(
        router.providers_for(Capability::Filing),
        vec![(String::from("fmp"), true)]
    );
}
