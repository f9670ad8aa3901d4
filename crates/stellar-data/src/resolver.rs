//! External identity resolution service boundary.
//!
//! The service is queried in two steps: names to external ids, then external
//! ids to full records. [`RateLimited`] wraps any resolver with the pacing
//! and bounded-retry policy a shared remote service requires.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use crate::config::ResolverConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::names::match_key;

/// Outcome for one name in a batched lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverOutcome {
    /// Service-internal id of the object the name refers to
    Found(String),
    NotFound,
}

impl ResolverOutcome {
    pub fn external_id(&self) -> Option<&str> {
        match self {
            ResolverOutcome::Found(id) => Some(id),
            ResolverOutcome::NotFound => None,
        }
    }
}

/// Authoritative record for one object from the external service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalStar {
    pub external_id: String,
    pub main_id: String,
    pub aliases: Vec<String>,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub coord_bibcode: Option<String>,
    pub sptype: Option<String>,
    pub sp_bibcode: Option<String>,
}

pub trait ExternalResolver {
    /// Look up every name in one round trip. Every requested name gets an outcome.
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>>;

    /// Fetch records for external ids in one round trip.
    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>>;
}

/// Minimum spacing between queries plus a longer cool-down every N queries
#[derive(Debug)]
pub struct RateLimiter {
    small_sleep: Duration,
    big_sleep: Duration,
    per_cool_down: u32,
    count: u32,
    total_queries: u64,
}

impl RateLimiter {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            small_sleep: config.small_sleep(),
            big_sleep: config.big_sleep(),
            per_cool_down: config.queries_per_cool_down.max(1),
            count: 0,
            total_queries: 0,
        }
    }

    /// Record a finished query and return how long to pause before the next.
    pub fn record_query(&mut self) -> Duration {
        self.count += 1;
        self.total_queries += 1;
        if self.count >= self.per_cool_down {
            self.count = 0;
            self.big_sleep
        } else {
            self.small_sleep
        }
    }

    pub fn pause(&mut self) {
        let wait = self.record_query();
        if wait == self.big_sleep && !wait.is_zero() {
            tracing::info!(queries = self.total_queries, "cool-down sleep for {:?}", wait);
        }
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries
    }
}

/// Run `op`, retrying transient failures with a fixed sleep.
///
/// After `max_retries` failed attempts the last error surfaces as
/// `ResolverExhausted`; permanent errors are returned at once.
pub fn with_retry<T>(
    config: &ResolverConfig,
    what: &str,
    mut op: impl FnMut() -> CatalogResult<T>,
) -> CatalogResult<T> {
    let attempts = config.max_retries.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(attempt, max = attempts, error = %err, "{} failed, retrying", what);
                last_error = err.to_string();
                if attempt < attempts && !config.retry_sleep().is_zero() {
                    std::thread::sleep(config.retry_sleep());
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(CatalogError::ResolverExhausted { attempts, message: last_error })
}

/// Rate limiting and retry around another resolver
pub struct RateLimited<R> {
    inner: R,
    config: ResolverConfig,
    limiter: RateLimiter,
}

impl<R: ExternalResolver> RateLimited<R> {
    pub fn new(inner: R, config: ResolverConfig) -> Self {
        let limiter = RateLimiter::new(&config);
        Self { inner, config, limiter }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn total_queries(&self) -> u64 {
        self.limiter.total_queries()
    }
}

impl<R: ExternalResolver> ExternalResolver for RateLimited<R> {
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>> {
        let Self { inner, config, limiter } = self;
        let result = with_retry(config, "name lookup", || {
            let result = inner.resolve_batch(names);
            limiter.pause();
            result
        })?;
        tracing::debug!(names = names.len(), found = result.values().filter(|o| o.external_id().is_some()).count(), "batch lookup");
        Ok(result)
    }

    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>> {
        let Self { inner, config, limiter } = self;
        with_retry(config, "detail fetch", || {
            let result = inner.fetch_details(external_ids);
            limiter.pause();
            result
        })
    }
}

impl<R: ExternalResolver + ?Sized> ExternalResolver for Box<R> {
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>> {
        (**self).resolve_batch(names)
    }

    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>> {
        (**self).fetch_details(external_ids)
    }
}

/// In-memory resolver backed by a fixed set of records.
///
/// Stands in for the network service in offline runs and tests; counts the
/// calls it receives.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    /// match key -> external id
    names: HashMap<String, String>,
    records: BTreeMap<String, ExternalStar>,
    pub batch_calls: usize,
    pub detail_calls: usize,
    pub names_queried: usize,
    fail_next: u32,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record; its main id and every alias resolve to it.
    pub fn with_star(mut self, star: ExternalStar) -> Self {
        self.add_star(star);
        self
    }

    pub fn add_star(&mut self, star: ExternalStar) {
        for name in star.aliases.iter().chain(std::iter::once(&star.main_id)) {
            self.names.insert(match_key(name), star.external_id.clone());
        }
        self.records.insert(star.external_id.clone(), star);
    }

    /// Records from a JSON array of [`ExternalStar`].
    pub fn load(path: &std::path::Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let stars: Vec<ExternalStar> = serde_json::from_str(&json)?;
        let mut resolver = Self::new();
        for star in stars {
            resolver.add_star(star);
        }
        tracing::info!("Loaded {} offline identity records from {:?}", resolver.records.len(), path);
        Ok(resolver)
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    fn check_failure(&mut self) -> CatalogResult<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(CatalogError::Resolver("connection reset".to_string()));
        }
        Ok(())
    }
}

impl ExternalResolver for StaticResolver {
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>> {
        self.batch_calls += 1;
        self.check_failure()?;
        self.names_queried += names.len();
        Ok(names
            .iter()
            .map(|name| {
                let outcome = match self.names.get(&match_key(name)) {
                    Some(id) => ResolverOutcome::Found(id.clone()),
                    None => ResolverOutcome::NotFound,
                };
                (name.clone(), outcome)
            })
            .collect())
    }

    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>> {
        self.detail_calls += 1;
        self.check_failure()?;
        Ok(external_ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

/// Resolver that must never be reached
#[cfg(test)]
pub(crate) struct PanicResolver;

#[cfg(test)]
impl ExternalResolver for PanicResolver {
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>> {
        panic!("external resolver called for {names:?}");
    }

    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>> {
        panic!("external resolver called for {external_ids:?}");
    }
}

#[cfg(test)]
pub(crate) fn external(id: &str, main_id: &str, aliases: &[&str]) -> ExternalStar {
    ExternalStar {
        external_id: id.to_string(),
        main_id: main_id.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        ra: Some(26.017),
        dec: Some(-15.937),
        coord_bibcode: Some("2007A&A...474..653V".to_string()),
        sptype: Some("G8V".to_string()),
        sp_bibcode: None,
    }
}
