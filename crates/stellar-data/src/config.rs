//! Engine configuration, loaded from JSON and overridden by environment

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use stellar_core::constants::{ABUNDANCE_DECIMALS, PLUSMINUS_DECIMALS};

use crate::error::CatalogResult;

const SECONDS_PER_YEAR: f64 = 60.0 * 60.0 * 24.0 * 365.24;

/// External resolver behaviour: batching, rate limiting, retries
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Names per batched external query
    pub batch_size: usize,
    /// Sleep after every query (seconds)
    pub small_sleep_secs: f64,
    /// Cool-down sleep after `queries_per_cool_down` queries (seconds)
    pub big_sleep_secs: f64,
    pub queries_per_cool_down: u32,
    pub max_retries: u32,
    pub retry_sleep_secs: f64,
    /// Defer unresolved names to an operator queue instead of auto-creating
    pub interactive: bool,
    /// Identities not created by the external service are re-checked after this age (seconds)
    pub refresh_age_secs: f64,
    /// Use the in-memory resolver instead of the network service
    pub offline: bool,
    pub tap_url: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            small_sleep_secs: 1.0,
            big_sleep_secs: 30.0,
            queries_per_cool_down: 100,
            max_retries: 3,
            retry_sleep_secs: 5.0,
            interactive: false,
            refresh_age_secs: SECONDS_PER_YEAR,
            offline: false,
            tap_url: "https://simbad.cds.unistra.fr/simbad/sim-tap/sync".to_string(),
        }
    }
}

impl ResolverConfig {
    /// No sleeping, for in-memory resolvers. Retries keep their default count.
    pub fn unthrottled() -> Self {
        Self {
            small_sleep_secs: 0.0,
            big_sleep_secs: 0.0,
            retry_sleep_secs: 0.0,
            ..Self::default()
        }
    }

    pub fn small_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.small_sleep_secs.max(0.0))
    }

    pub fn big_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.big_sleep_secs.max(0.0))
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.retry_sleep_secs.max(0.0))
    }
}

/// Reduction and normalization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Solar scales every catalog is normalized to; `original` means the catalog's own scale
    pub scales: Vec<String>,
    pub decimals: i32,
    pub plusminus_decimals: i32,
    /// Representative error used when no table entry or proxy exists
    pub default_representative_error: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            scales: vec!["original".to_string(), "asplund09".to_string(), "lodders09".to_string()],
            decimals: ABUNDANCE_DECIMALS,
            plusminus_decimals: PLUSMINUS_DECIMALS,
            default_representative_error: 0.1,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub reduction: ReductionConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply `STELLAR_INTERACTIVE`, `STELLAR_BATCH_SIZE` and `STELLAR_OFFLINE`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("STELLAR_INTERACTIVE") {
            self.resolver.interactive = parse_flag(&value);
        }
        if let Some(value) = var("STELLAR_OFFLINE") {
            self.resolver.offline = parse_flag(&value);
        }
        if let Some(value) = var("STELLAR_BATCH_SIZE") {
            match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.resolver.batch_size = size,
                _ => tracing::warn!(value = %value, "ignoring invalid STELLAR_BATCH_SIZE"),
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "t" | "y" | "yes" | "on")
}
