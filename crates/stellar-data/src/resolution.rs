//! Star identity resolution.
//!
//! Each star arrives as one or more candidate names and is resolved in a
//! fixed order: process cache, persisted alias store, batched external
//! lookup (with alias merge onto existing identities), and finally the
//! unresolved-star policy. Network work for a batch finishes before any
//! cache or store write, so a failed batch leaves both untouched.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::cache::IdentityCache;
use crate::canonical::{now_timestamp, CanonicalStar};
use crate::config::ResolverConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::names::{match_key, micro_lensing_lookup_name};
use crate::policy::{ResolutionPolicy, UnresolvedDecision};
use crate::resolver::{ExternalResolver, ExternalStar, ResolverOutcome};
use crate::store::AliasStore;

/// Which step produced an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    Cache,
    Store,
    External,
    /// External lookup that also folded existing local identities together
    Merged,
    /// New identity from the unresolved-star policy
    Created,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved { main_id: String, via: ResolvedVia },
    /// Left for an operator; the star has no identity this run
    Deferred { names: Vec<String> },
}

impl Resolution {
    pub fn main_id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { main_id, .. } => Some(main_id),
            Resolution::Deferred { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub cache_hits: usize,
    pub store_hits: usize,
    pub external: usize,
    pub merged: usize,
    pub created: usize,
    pub deferred: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub external_batches: usize,
}

/// A star that missed the cache
struct Pending {
    index: usize,
    names: Vec<String>,
    /// Names sent to the external service
    search: Vec<String>,
    /// Stale non-external identity being re-checked
    refresh: Option<String>,
}

pub struct StarResolver<S, R, P> {
    cache: IdentityCache,
    store: S,
    resolver: R,
    policy: P,
    config: ResolverConfig,
    stats: ResolutionStats,
    /// Identities folded into another one this run, to their survivor
    absorbed: BTreeMap<String, String>,
}

impl<S: AliasStore, R: ExternalResolver, P: ResolutionPolicy> StarResolver<S, R, P> {
    /// Resolver whose cache is preloaded with every identity in the store.
    pub fn new(store: S, resolver: R, policy: P, config: ResolverConfig) -> CatalogResult<Self> {
        let cache = IdentityCache::from_stars(store.all()?);
        tracing::info!("Identity cache preloaded with {} stars", cache.len());
        Ok(Self::with_cache(cache, store, resolver, policy, config))
    }

    pub fn with_cache(cache: IdentityCache, store: S, resolver: R, policy: P, config: ResolverConfig) -> Self {
        Self { cache, store, resolver, policy, config, stats: ResolutionStats::default(), absorbed: BTreeMap::new() }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn stats(&self) -> &ResolutionStats {
        &self.stats
    }

    pub fn identity(&self, main_id: &str) -> Option<&CanonicalStar> {
        self.cache.get_by_id(main_id)
    }

    /// Current main id for an id handed out earlier in the run. Identities
    /// absorbed by an alias merge map to the identity that survived.
    pub fn survivor<'a>(&'a self, main_id: &'a str) -> &'a str {
        let mut current = main_id;
        for _ in 0..=self.absorbed.len() {
            match self.absorbed.get(current) {
                Some(next) => current = next.as_str(),
                None => break,
            }
        }
        current
    }

    pub fn absorbed(&self) -> &BTreeMap<String, String> {
        &self.absorbed
    }

    pub fn flush(&mut self) -> CatalogResult<()> {
        self.store.flush()
    }

    /// Resolve one star from its candidate names.
    pub fn resolve(&mut self, names: &[String], origin: &str) -> CatalogResult<Resolution> {
        self.resolve_batch(&[names.to_vec()], origin)?
            .pop()
            .unwrap_or_else(|| Ok(Resolution::Deferred { names: names.to_vec() }))
    }

    /// Resolve many stars with as few external round trips as possible.
    ///
    /// The outer error means a whole external batch failed (retries
    /// exhausted) and should be retried by the caller. Inner errors are
    /// per-star and never stop the other stars.
    pub fn resolve_batch(
        &mut self,
        stars: &[Vec<String>],
        origin: &str,
    ) -> CatalogResult<Vec<CatalogResult<Resolution>>> {
        let mut results: Vec<Option<CatalogResult<Resolution>>> = stars.iter().map(|_| None).collect();
        let mut pending = Vec::new();
        let now = now_timestamp();

        for (index, raw) in stars.iter().enumerate() {
            let names = clean_names(raw);
            if names.is_empty() {
                results[index] = Some(Err(CatalogError::EmptyAliases(format!("{origin} row {index}"))));
                self.stats.failed += 1;
                continue;
            }
            let mut refresh = None;
            let cached = names
                .iter()
                .find_map(|n| self.cache.get(n))
                .map(|star| (star.main_id.clone(), star.needs_refresh(self.config.refresh_age_secs, now)));
            if let Some((main_id, stale)) = cached {
                if !stale {
                    self.stats.cache_hits += 1;
                    results[index] = Some(Ok(Resolution::Resolved { main_id, via: ResolvedVia::Cache }));
                    continue;
                }
                tracing::debug!(main_id = %main_id, "re-checking stale identity against external service");
                refresh = Some(main_id);
            } else if let Some(star) = self.find_in_store(&names)? {
                if star.needs_refresh(self.config.refresh_age_secs, now) {
                    tracing::debug!(main_id = %star.main_id, "re-checking stale identity against external service");
                    refresh = Some(star.main_id.clone());
                } else {
                    self.stats.store_hits += 1;
                    let main_id = star.main_id.clone();
                    self.cache.insert(star);
                    results[index] = Some(Ok(Resolution::Resolved { main_id, via: ResolvedVia::Store }));
                    continue;
                }
            }

            let mut search = names.clone();
            for name in &names {
                if let Some(lookup) = micro_lensing_lookup_name(name) {
                    if !search.iter().any(|s| match_key(s) == match_key(&lookup)) {
                        search.insert(0, lookup);
                    }
                }
            }
            pending.push(Pending { index, names, search, refresh });
        }

        for batch in batch_indexes(&pending, self.config.batch_size) {
            self.run_batch(&pending, &batch, origin, &mut results)?;
        }

        Ok(results
            .into_iter()
            .zip(stars)
            .map(|(result, names)| result.unwrap_or_else(|| Ok(Resolution::Deferred { names: names.clone() })))
            .collect())
    }

    fn find_in_store(&self, names: &[String]) -> CatalogResult<Option<CanonicalStar>> {
        for name in names {
            if let Some(star) = self.store.find_by_alias(name)? {
                return Ok(Some(star));
            }
        }
        Ok(None)
    }

    fn run_batch(
        &mut self,
        pending: &[Pending],
        batch: &[usize],
        origin: &str,
        results: &mut [Option<CatalogResult<Resolution>>],
    ) -> CatalogResult<()> {
        let names: BTreeSet<String> = batch.iter().flat_map(|&i| pending[i].search.iter().cloned()).collect();
        let outcomes = self.resolver.resolve_batch(&names)?;
        self.stats.external_batches += 1;

        let mut oid_to_stars: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut not_found = Vec::new();
        for &i in batch {
            let star = &pending[i];
            let found: BTreeSet<&str> = star
                .search
                .iter()
                .filter_map(|n| outcomes.get(n).and_then(ResolverOutcome::external_id))
                .collect();
            match found.len() {
                0 => not_found.push(i),
                1 => {
                    let oid = found.iter().next().map(|s| s.to_string()).unwrap_or_default();
                    oid_to_stars.entry(oid).or_default().push(i);
                }
                _ => {
                    tracing::warn!(names = ?star.names, ids = ?found, "names resolve to more than one external object");
                    self.stats.failed += 1;
                    results[star.index] = Some(Err(CatalogError::AmbiguousIdentity {
                        names: star.names.clone(),
                        ids: found.iter().map(|s| s.to_string()).collect(),
                    }));
                }
            }
        }
        tracing::info!(
            names = names.len(),
            found = oid_to_stars.len(),
            not_found = not_found.len(),
            "external lookup batch"
        );

        let details = if oid_to_stars.is_empty() {
            BTreeMap::new()
        } else {
            let oids: BTreeSet<String> = oid_to_stars.keys().cloned().collect();
            self.resolver.fetch_details(&oids)?
        };

        // all network work is done; from here on only local writes
        for (oid, stars) in &oid_to_stars {
            let Some(record) = details.get(oid) else {
                for &i in stars {
                    self.stats.failed += 1;
                    results[pending[i].index] =
                        Some(Err(CatalogError::Resolver(format!("no record returned for external id {oid}"))));
                }
                continue;
            };
            let provided: Vec<String> = stars.iter().flat_map(|&i| pending[i].names.iter().cloned()).collect();
            match self.adopt_external(record, &provided) {
                Ok((main_id, merged)) => {
                    for &i in stars {
                        let via = if merged { ResolvedVia::Merged } else { ResolvedVia::External };
                        if merged {
                            self.stats.merged += 1;
                        } else {
                            self.stats.external += 1;
                        }
                        results[pending[i].index] = Some(Ok(Resolution::Resolved { main_id: main_id.clone(), via }));
                    }
                }
                Err(err) => {
                    tracing::warn!(main_id = %record.main_id, error = %err, "failed to store external identity");
                    let message = err.to_string();
                    let mut first = Some(err);
                    for &i in stars {
                        self.stats.failed += 1;
                        let err = first.take().unwrap_or_else(|| CatalogError::Resolver(message.clone()));
                        results[pending[i].index] = Some(Err(err));
                    }
                }
            }
        }

        for i in not_found {
            let star = &pending[i];
            let result = self.handle_not_found(star, origin);
            if result.is_err() {
                self.stats.failed += 1;
            }
            results[star.index] = Some(result);
        }
        Ok(())
    }

    /// Store an external record, folding in every local identity that
    /// already claims one of its names. Returns the surviving main id and
    /// whether existing identities were merged.
    fn adopt_external(&mut self, record: &ExternalStar, provided: &[String]) -> CatalogResult<(String, bool)> {
        let mut names: Vec<String> = record.aliases.clone();
        names.extend(provided.iter().cloned());
        names.push(record.main_id.clone());

        let mut locals: BTreeMap<String, CanonicalStar> = BTreeMap::new();
        for name in &names {
            let found = match self.store.find_by_alias(name)? {
                Some(star) => Some(star),
                None => self.cache.get(name).cloned(),
            };
            if let Some(star) = found {
                locals.entry(star.main_id.clone()).or_insert(star);
            }
        }

        // the oldest externally confirmed identity survives
        let survivor = locals
            .values()
            .filter(|s| s.origin.is_external())
            .min_by(|a, b| a.timestamp.total_cmp(&b.timestamp).then_with(|| a.main_id.cmp(&b.main_id)))
            .cloned();
        let mut merged = match survivor {
            Some(mut star) => {
                star.apply_external(record);
                star
            }
            None => CanonicalStar::from_external(record, Vec::<String>::new()),
        };
        for local in locals.values() {
            merged.merge_aliases(local.aliases.iter().map(String::as_str));
        }
        merged.merge_aliases(names.iter().map(String::as_str));

        if !locals.is_empty() {
            tracing::info!(
                main_id = %merged.main_id,
                absorbed = ?locals.keys().collect::<Vec<_>>(),
                "merging local identities onto external identity"
            );
        }
        for main_id in locals.keys() {
            self.store.remove(main_id)?;
            self.cache.remove(main_id);
        }
        let main_id = self.create_identity(merged)?;
        for absorbed in locals.keys().filter(|id| **id != main_id) {
            self.absorbed.insert(absorbed.clone(), main_id.clone());
        }
        Ok((main_id, !locals.is_empty()))
    }

    fn handle_not_found(&mut self, star: &Pending, origin: &str) -> CatalogResult<Resolution> {
        // still unknown externally: keep the local identity and restart its clock
        if let Some(main_id) = &star.refresh {
            if let Some(mut refreshed) = self.store.find_by_id(main_id)? {
                self.store.touch(main_id)?;
                refreshed.touch();
                self.cache.insert(refreshed);
                self.stats.refreshed += 1;
                return Ok(Resolution::Resolved { main_id: main_id.clone(), via: ResolvedVia::Store });
            }
        }

        // another star in this run may have claimed one of the names since
        if let Some(main_id) = star.names.iter().find_map(|n| self.cache.main_id(n)) {
            self.stats.cache_hits += 1;
            return Ok(Resolution::Resolved { main_id: main_id.to_string(), via: ResolvedVia::Cache });
        }

        match self.policy.unresolved(&star.names, origin, &self.cache) {
            UnresolvedDecision::Create(identity) => {
                let main_id = self.create_identity(identity)?;
                self.stats.created += 1;
                Ok(Resolution::Resolved { main_id, via: ResolvedVia::Created })
            }
            UnresolvedDecision::Defer => {
                self.stats.deferred += 1;
                Ok(Resolution::Deferred { names: star.names.clone() })
            }
        }
    }

    /// Insert into the store; an identity created concurrently under the
    /// same key is merged into instead.
    fn create_identity(&mut self, star: CanonicalStar) -> CatalogResult<String> {
        let main_id = star.main_id.clone();
        match self.store.create(star.clone()) {
            Ok(()) => {
                self.absorbed.remove(&main_id);
                self.cache.insert(star);
                Ok(main_id)
            }
            Err(CatalogError::DuplicateKey(existing)) => {
                tracing::info!(main_id = %existing, "identity already exists, merging aliases");
                let aliases = self.unclaimed_aliases(&existing, &star)?;
                let updated = self.store.update_aliases(&existing, &aliases)?;
                self.absorbed.remove(&existing);
                self.cache.insert(updated);
                Ok(existing)
            }
            Err(err) => Err(err),
        }
    }

    fn unclaimed_aliases(&self, main_id: &str, star: &CanonicalStar) -> CatalogResult<Vec<String>> {
        let mut aliases = Vec::new();
        for alias in &star.aliases {
            match self.store.find_by_alias(alias)? {
                Some(owner) if owner.main_id != main_id => {
                    tracing::debug!(alias = %alias, owner = %owner.main_id, "skipping alias owned by another identity");
                }
                _ => aliases.push(alias.clone()),
            }
        }
        Ok(aliases)
    }
}

/// Trimmed names, first spelling kept per match key, original order.
fn clean_names(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty() && seen.insert(match_key(n)))
        .collect()
}

/// Group pending stars into batches of about `batch_size` names; one
/// star's names are never split across batches.
fn batch_indexes(pending: &[Pending], batch_size: usize) -> Vec<Vec<usize>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut count = 0;
    for (i, star) in pending.iter().enumerate() {
        current.push(i);
        count += star.search.len();
        if count >= batch_size {
            batches.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::IdentityOrigin;
    use crate::policy::{AutoCreate, OperatorQueue};
    use crate::resolver::{external, PanicResolver, StaticResolver};
    use crate::store::InMemoryAliasStore;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> ResolverConfig {
        ResolverConfig::unthrottled()
    }

    fn tau_ceti_resolver() -> StaticResolver {
        StaticResolver::new().with_star(external("1089", "* tau Cet", &["* tau Cet", "HD 10700", "HIP 8102"]))
    }

    #[test]
    fn test_cache_hit_never_calls_resolver() {
        let cache = IdentityCache::from_stars([CanonicalStar::new("* tau Cet", ["HD 10700"], IdentityOrigin::External)]);
        let mut resolver =
            StarResolver::with_cache(cache, InMemoryAliasStore::new(), PanicResolver, AutoCreate, config());

        let resolution = resolver.resolve(&names(&["HD10700"]), "test").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::Cache });
        assert_eq!(resolver.stats().cache_hits, 1);
    }

    #[test]
    fn test_store_hit_loads_cache() {
        let mut store = InMemoryAliasStore::new();
        store.create(CanonicalStar::new("* tau Cet", ["HD 10700"], IdentityOrigin::External)).unwrap();
        let mut resolver =
            StarResolver::with_cache(IdentityCache::new(), store, PanicResolver, AutoCreate, config());

        let first = resolver.resolve(&names(&["HD 10700"]), "test").unwrap();
        assert_eq!(first, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::Store });
        let second = resolver.resolve(&names(&["HD 10700"]), "test").unwrap();
        assert_eq!(second, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::Cache });
    }

    #[test]
    fn test_external_creates_identity() {
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), tau_ceti_resolver(), AutoCreate, config()).unwrap();
        let resolution = resolver.resolve(&names(&["HIP 8102", "my catalog name"]), "test").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::External });

        let stored = resolver.store().find_by_id("* tau Cet").unwrap().unwrap();
        assert!(stored.origin.is_external());
        assert!(stored.aliases.contains("my catalog name"));
        assert_eq!(stored.sptype.as_deref(), Some("G8V"));
        assert_eq!(resolver.cache().main_id("my catalog name"), Some("* tau Cet"));
    }

    #[test]
    fn test_external_merges_local_identities() {
        let mut store = InMemoryAliasStore::new();
        let mut older = CanonicalStar::new("* tau Cet", ["HD 10700"], IdentityOrigin::External);
        older.timestamp = 100.0;
        store.create(older).unwrap();
        let mut newer = CanonicalStar::new("tau Ceti", ["GJ 71"], IdentityOrigin::External);
        newer.timestamp = 200.0;
        store.create(newer).unwrap();

        let resolver_stub = StaticResolver::new()
            .with_star(external("1089", "* tau Cet", &["* tau Cet", "HD 10700", "GJ 71", "new name"]));
        let mut resolver =
            StarResolver::with_cache(IdentityCache::new(), store, resolver_stub, AutoCreate, config());

        let resolution = resolver.resolve(&names(&["new name"]), "test").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::Merged });

        let all = resolver.store().all().unwrap();
        assert_eq!(all.len(), 1);
        let survivor = &all[0];
        assert!(survivor.aliases.contains("tau Ceti"));
        assert!(survivor.aliases.contains("GJ 71"));
        assert!(survivor.aliases.contains("new name"));
        // no duplicates by match key
        assert_eq!(survivor.aliases.len(), survivor.match_keys().len());
    }

    #[test]
    fn test_auto_create_when_not_found() {
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), StaticResolver::new(), AutoCreate, config()).unwrap();
        let resolution = resolver.resolve(&names(&["Unknown 1", "Unknown 1b"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "Unknown 1".into(), via: ResolvedVia::Created });
        let stored = resolver.store().find_by_alias("unknown1b").unwrap().unwrap();
        assert_eq!(stored.origin, IdentityOrigin::Ingest("cat".into()));
        assert_eq!(resolver.stats().created, 1);
    }

    #[test]
    fn test_operator_queue_defers_without_writing() {
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), StaticResolver::new(), OperatorQueue::new(), config())
                .unwrap();
        let resolution = resolver.resolve(&names(&["Unknown 1"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Deferred { names: names(&["Unknown 1"]) });
        assert!(resolver.store().is_empty());
        assert!(resolver.cache().is_empty());
        assert_eq!(resolver.policy().len(), 1);
    }

    #[test]
    fn test_batched_external_resolution() {
        let stars: Vec<Vec<String>> = (0..1500).map(|i| vec![format!("Star {i}")]).collect();
        let config = ResolverConfig { batch_size: 1000, ..config() };
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), StaticResolver::new(), AutoCreate, config).unwrap();

        let results = resolver.resolve_batch(&stars, "cat").unwrap();
        assert_eq!(results.len(), 1500);
        assert_eq!(resolver.resolver().batch_calls, 2);
        assert_eq!(resolver.resolver().names_queried, 1500);
        assert_eq!(resolver.resolver().detail_calls, 0);
        assert_eq!(resolver.stats().external_batches, 2);
    }

    #[test]
    fn test_ambiguous_identity_is_per_star() {
        let resolver_stub = tau_ceti_resolver().with_star(external("2", "* eps Eri", &["HD 22049"]));
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), resolver_stub, AutoCreate, config()).unwrap();

        let results = resolver
            .resolve_batch(&[names(&["HD 10700", "HD 22049"]), names(&["HD 22049"])], "cat")
            .unwrap();
        assert!(matches!(results[0], Err(CatalogError::AmbiguousIdentity { .. })));
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Resolution::Resolved { main_id: "* eps Eri".into(), via: ResolvedVia::External }
        );
        assert_eq!(resolver.stats().failed, 1);
    }

    #[test]
    fn test_exhausted_retries_leave_cache_untouched() {
        let mut stub = tau_ceti_resolver();
        stub.fail_next(10);
        let mut resolver = StarResolver::new(
            InMemoryAliasStore::new(),
            crate::resolver::RateLimited::new(stub, config()),
            AutoCreate,
            config(),
        )
        .unwrap();

        let err = resolver.resolve_batch(&[names(&["HD 10700"])], "cat").unwrap_err();
        assert!(matches!(err, CatalogError::ResolverExhausted { .. }));
        assert!(resolver.cache().is_empty());
        assert!(resolver.store().is_empty());
    }

    #[test]
    fn test_stale_identity_replaced_by_external() {
        let mut store = InMemoryAliasStore::new();
        let mut stale = CanonicalStar::new("HD 10700 local", ["HD 10700"], IdentityOrigin::Ingest("cat".into()));
        stale.timestamp = 0.0;
        store.create(stale).unwrap();

        // the stale identity is preloaded into the cache and still re-checked
        let mut resolver = StarResolver::new(store, tau_ceti_resolver(), AutoCreate, config()).unwrap();
        assert_eq!(resolver.cache().main_id("HD 10700"), Some("HD 10700 local"));

        let resolution = resolver.resolve(&names(&["HD 10700"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::Merged });
        assert_eq!(resolver.resolver().batch_calls, 1);
        assert!(resolver.store().find_by_id("HD 10700 local").unwrap().is_none());
        let star = resolver.store().find_by_id("* tau Cet").unwrap().unwrap();
        assert!(star.aliases.contains("HD 10700 local"));
        assert_eq!(resolver.cache().main_id("HD 10700"), Some("* tau Cet"));
        assert_eq!(resolver.survivor("HD 10700 local"), "* tau Cet");
    }

    #[test]
    fn test_stale_identity_still_unknown_is_touched() {
        let mut store = InMemoryAliasStore::new();
        let mut stale = CanonicalStar::new("Local 1", ["Local 1"], IdentityOrigin::Ingest("cat".into()));
        stale.timestamp = 0.0;
        store.create(stale).unwrap();

        let mut resolver = StarResolver::new(store, StaticResolver::new(), AutoCreate, config()).unwrap();
        let resolution = resolver.resolve(&names(&["Local 1"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "Local 1".into(), via: ResolvedVia::Store });
        assert!(resolver.store().find_by_id("Local 1").unwrap().unwrap().timestamp > 0.0);
        assert_eq!(resolver.stats().refreshed, 1);
        assert_eq!(resolver.resolver().batch_calls, 1);

        // fresh again, so the next lookup stays in the cache
        let again = resolver.resolve(&names(&["Local 1"]), "cat").unwrap();
        assert_eq!(again, Resolution::Resolved { main_id: "Local 1".into(), via: ResolvedVia::Cache });
        assert_eq!(resolver.resolver().batch_calls, 1);
    }

    #[test]
    fn test_fresh_local_identity_stays_in_cache() {
        let mut store = InMemoryAliasStore::new();
        store.create(CanonicalStar::new("Local 1", ["Local 1"], IdentityOrigin::Ingest("cat".into()))).unwrap();
        let mut resolver = StarResolver::new(store, PanicResolver, AutoCreate, config()).unwrap();
        let resolution = resolver.resolve(&names(&["Local 1"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "Local 1".into(), via: ResolvedVia::Cache });
        assert_eq!(resolver.stats().refreshed, 0);
    }

    #[test]
    fn test_merge_records_absorbed_identities() {
        let mut store = InMemoryAliasStore::new();
        let mut older = CanonicalStar::new("* tau Cet", ["HD 10700"], IdentityOrigin::External);
        older.timestamp = 100.0;
        store.create(older).unwrap();
        let mut newer = CanonicalStar::new("tau Ceti", ["GJ 71"], IdentityOrigin::External);
        newer.timestamp = 200.0;
        store.create(newer).unwrap();

        let stub = StaticResolver::new()
            .with_star(external("1089", "* tau Cet", &["* tau Cet", "HD 10700", "GJ 71", "new name"]));
        let mut resolver = StarResolver::new(store, stub, AutoCreate, config()).unwrap();

        let first = resolver.resolve(&names(&["GJ 71"]), "alpha10").unwrap();
        assert_eq!(first.main_id(), Some("tau Ceti"));
        let second = resolver.resolve(&names(&["new name"]), "beta20").unwrap();
        assert_eq!(second.main_id(), Some("* tau Cet"));

        assert_eq!(resolver.survivor("tau Ceti"), "* tau Cet");
        assert_eq!(resolver.survivor("* tau Cet"), "* tau Cet");
        assert_eq!(resolver.absorbed().len(), 1);
        assert!(resolver.identity("tau Ceti").is_none());
    }

    /// Store that gains a competing identity right before the next create,
    /// as if another writer got there first.
    struct RacingStore {
        inner: InMemoryAliasStore,
        competitor: Option<CanonicalStar>,
    }

    impl AliasStore for RacingStore {
        fn find_by_alias(&self, name: &str) -> CatalogResult<Option<CanonicalStar>> {
            self.inner.find_by_alias(name)
        }

        fn find_by_id(&self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
            self.inner.find_by_id(main_id)
        }

        fn create(&mut self, star: CanonicalStar) -> CatalogResult<()> {
            if let Some(competitor) = self.competitor.take() {
                self.inner.create(competitor)?;
            }
            self.inner.create(star)
        }

        fn update_aliases(&mut self, main_id: &str, new_aliases: &[String]) -> CatalogResult<CanonicalStar> {
            self.inner.update_aliases(main_id, new_aliases)
        }

        fn touch(&mut self, main_id: &str) -> CatalogResult<()> {
            self.inner.touch(main_id)
        }

        fn remove(&mut self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
            self.inner.remove(main_id)
        }

        fn all(&self) -> CatalogResult<Vec<CanonicalStar>> {
            self.inner.all()
        }
    }

    #[test]
    fn test_concurrent_create_merges_aliases() {
        let store = RacingStore {
            inner: InMemoryAliasStore::new(),
            competitor: Some(CanonicalStar::new("* tau Cet", ["HIP 8102", "GJ 71"], IdentityOrigin::External)),
        };
        let mut resolver = StarResolver::new(store, tau_ceti_resolver(), AutoCreate, config()).unwrap();
        assert!(resolver.cache().is_empty());

        let resolution = resolver.resolve(&names(&["HD 10700", "my catalog name"]), "cat").unwrap();
        assert_eq!(resolution, Resolution::Resolved { main_id: "* tau Cet".into(), via: ResolvedVia::External });

        let stored = resolver.store().find_by_id("* tau Cet").unwrap().unwrap();
        for alias in ["HIP 8102", "GJ 71", "HD 10700", "my catalog name"] {
            assert!(stored.aliases.contains(alias), "missing {alias}");
        }
        assert_eq!(resolver.store().all().unwrap().len(), 1);
        assert_eq!(resolver.cache().main_id("my catalog name"), Some("* tau Cet"));
        assert_eq!(resolver.cache().main_id("GJ 71"), Some("* tau Cet"));
    }

    #[test]
    fn test_duplicate_names_in_batch_share_identity() {
        let mut resolver =
            StarResolver::new(InMemoryAliasStore::new(), StaticResolver::new(), AutoCreate, config()).unwrap();
        let results = resolver.resolve_batch(&[names(&["New 1"]), names(&["new1"])], "cat").unwrap();
        assert_eq!(results[0].as_ref().unwrap().main_id(), Some("New 1"));
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Resolution::Resolved { main_id: "New 1".into(), via: ResolvedVia::Cache }
        );
        assert_eq!(resolver.store().len(), 1);
    }

    #[test]
    fn test_batch_grouping_keeps_star_names_together() {
        let pending: Vec<Pending> = [3usize, 3, 3]
            .iter()
            .enumerate()
            .map(|(index, n)| Pending {
                index,
                names: Vec::new(),
                search: (0..*n).map(|k| format!("{index}-{k}")).collect(),
                refresh: None,
            })
            .collect();
        assert_eq!(batch_indexes(&pending, 5), vec![vec![0, 1], vec![2]]);
        assert_eq!(batch_indexes(&pending, 100), vec![vec![0, 1, 2]]);
    }
}
