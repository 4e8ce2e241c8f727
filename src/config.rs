use crate::limiter::RateWindow;
use crate::money::RoundingMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Frankfurter,
    OpenErApi,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sliding quota windows for this provider; empty means unlimited.
    #[serde(default)]
    pub limits: Vec<RateWindow>,
}

impl ProviderConfig {
    pub fn default_base_url(kind: ProviderKind) -> &'static str {
        match kind {
            ProviderKind::Frankfurter => "https://api.frankfurter.dev",
            ProviderKind::OpenErApi => "https://open.er-api.com",
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| Self::default_base_url(self.kind))
    }
}

/// Engine construction parameters, supplied by the surrounding application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Reference currency all conversions route through.
    #[serde(default = "default_pivot")]
    pub pivot_currency: String,
    #[serde(default)]
    pub rounding: RoundingMode,
    /// How long a current rate stays fresh, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Snapshot file for restart continuity; in-memory only when unset.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Rate sources in priority order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

fn default_pivot() -> String {
    "USD".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    4 * 3_600
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            kind: ProviderKind::Frankfurter,
            base_url: None,
            limits: vec![RateWindow::per_minute(10), RateWindow::per_day(1_000)],
        },
        ProviderConfig {
            kind: ProviderKind::OpenErApi,
            base_url: None,
            limits: vec![RateWindow::per_hour(50), RateWindow::per_day(500)],
        },
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pivot_currency: default_pivot(),
            rounding: RoundingMode::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_path: None,
            providers: default_providers(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
pivot_currency: "EUR"
rounding: half-even
cache_ttl_secs: 7200
providers:
  - kind: frankfurter
    limits:
      - window_secs: 60
        max_requests: 5
  - kind: open-er-api
    base_url: "http://localhost:9000"
"#;

        let config: EngineConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.pivot_currency, "EUR");
        assert_eq!(config.rounding, RoundingMode::HalfEven);
        assert_eq!(config.cache_ttl_secs, 7_200);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Frankfurter);
        assert_eq!(
            config.providers[0].limits,
            vec![RateWindow { window_secs: 60, max_requests: 5 }]
        );
        assert_eq!(config.providers[0].base_url(), "https://api.frankfurter.dev");
        assert_eq!(config.providers[1].base_url(), "http://localhost:9000");
        assert!(config.providers[1].limits.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: EngineConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert_eq!(config.pivot_currency, "USD");
        assert_eq!(config.rounding, RoundingMode::HalfUp);
        assert_eq!(config.cache_ttl_secs, 4 * 3_600);
        assert!(config.cache_path.is_none());
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_load_from_missing_path_fails_with_context() {
        let err = EngineConfig::load_from_path("/nonexistent/engine.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
