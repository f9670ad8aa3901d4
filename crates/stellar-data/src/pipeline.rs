//! Ingestion pipeline: resolves catalog rows to stars and reduces each star

use crate::canonical::CanonicalStar;
use crate::catalog::{unique_groups, CatalogTable};
use crate::config::ReductionConfig;
use crate::document::StarDocument;
use crate::error::{CatalogError, CatalogResult};
use crate::names::match_key;
use crate::normalize::CatalogAbundances;
use crate::policy::ResolutionPolicy;
use crate::reducer::{CalcReport, ParamSources, StarParams};
use crate::representative::RepresentativeErrors;
use crate::resolution::{Resolution, ResolutionStats, StarResolver};
use crate::resolver::ExternalResolver;
use crate::solar::{SolarNorms, ORIGINAL_SCALE};
use crate::stats::reduce_abundances;
use crate::store::AliasStore;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use stellar_core::{ElementId, ObjectParams};

/// Stellar-parameter source tables, each keyed by star name
#[derive(Clone, Debug, Default)]
pub struct ParamSourceTables {
    gaia: BTreeMap<String, ObjectParams>,
    pastel: BTreeMap<String, ObjectParams>,
    xhip: BTreeMap<String, ObjectParams>,
    nea: BTreeMap<String, ObjectParams>,
}

/// Which parameter source a table feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSource {
    Gaia,
    Pastel,
    Xhip,
    Nea,
}

impl ParamSource {
    pub const ALL: [ParamSource; 4] = [ParamSource::Gaia, ParamSource::Pastel, ParamSource::Xhip, ParamSource::Nea];

    pub fn file_stem(&self) -> &'static str {
        match self {
            ParamSource::Gaia => "gaia",
            ParamSource::Pastel => "pastel",
            ParamSource::Xhip => "xhip",
            ParamSource::Nea => "nea",
        }
    }
}

impl ParamSourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `gaia.json`, `pastel.json`, `xhip.json` and `nea.json` from `dir`
    /// where present. Each file maps star name to parameters.
    pub fn load_dir(dir: &Path) -> CatalogResult<Self> {
        let mut tables = Self::new();
        for source in ParamSource::ALL {
            let path = dir.join(format!("{}.json", source.file_stem()));
            if !path.exists() {
                tracing::debug!(source = source.file_stem(), "no parameter table");
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            let table: BTreeMap<String, ObjectParams> = serde_json::from_str(&json)?;
            tracing::info!("Loaded {} {} parameter records", table.len(), source.file_stem());
            for (name, params) in table {
                tables.insert(source, &name, params);
            }
        }
        Ok(tables)
    }

    pub fn insert(&mut self, source: ParamSource, name: &str, params: ObjectParams) {
        self.table_mut(source).entry(match_key(name)).or_default().extend(params);
    }

    /// Every record filed under any alias of `identity`.
    pub fn for_star(&self, identity: &CanonicalStar) -> ParamSources {
        let keys = identity.match_keys();
        let collect = |table: &BTreeMap<String, ObjectParams>| {
            let mut params = ObjectParams::new();
            for key in &keys {
                if let Some(found) = table.get(key) {
                    params.extend(found.clone());
                }
            }
            params
        };
        ParamSources {
            gaia: collect(&self.gaia),
            pastel: collect(&self.pastel),
            xhip: collect(&self.xhip),
            nea: collect(&self.nea),
        }
    }

    fn table_mut(&mut self, source: ParamSource) -> &mut BTreeMap<String, ObjectParams> {
        match source {
            ParamSource::Gaia => &mut self.gaia,
            ParamSource::Pastel => &mut self.pastel,
            ParamSource::Xhip => &mut self.xhip,
            ParamSource::Nea => &mut self.nea,
        }
    }
}

/// A catalog row that did not reach the merged output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub catalog: String,
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a run did, including every fallback it took
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub stars: usize,
    pub catalogs: usize,
    pub rows: usize,
    pub resolution: ResolutionStats,
    /// Rows left for an operator
    pub deferred: Vec<SkippedRow>,
    /// Rows or stars that failed
    pub failures: Vec<SkippedRow>,
    /// Catalog to the number of rows that repeat a star already in it
    pub double_listed: BTreeMap<String, usize>,
    /// Catalog to elements its own solar scale could not un-normalize
    pub missing_from_norm: BTreeMap<String, BTreeSet<ElementId>>,
    /// Elements whose plus-minus came from a proxy or the default error
    pub representative_fallbacks: BTreeSet<ElementId>,
    /// Stars whose non-positive parallax was dropped
    pub dropped_parallax: Vec<String>,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!(
            "Run complete: {} stars from {} rows in {} catalogs",
            self.stars,
            self.rows,
            self.catalogs
        );
        tracing::info!(
            cache = self.resolution.cache_hits,
            store = self.resolution.store_hits,
            external = self.resolution.external,
            merged = self.resolution.merged,
            created = self.resolution.created,
            refreshed = self.resolution.refreshed,
            "identity resolution"
        );
        if self.resolution.created > 0 {
            tracing::warn!("{} identities auto-created without external confirmation", self.resolution.created);
        }
        if !self.deferred.is_empty() {
            tracing::warn!("{} rows deferred to the operator queue", self.deferred.len());
        }
        if !self.failures.is_empty() {
            tracing::warn!("{} rows or stars failed", self.failures.len());
        }
        if !self.representative_fallbacks.is_empty() {
            tracing::warn!(
                elements = ?self.representative_fallbacks.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "representative error fallbacks used"
            );
        }
        if !self.dropped_parallax.is_empty() {
            tracing::warn!("{} stars had a non-positive parallax dropped", self.dropped_parallax.len());
        }
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// One star ready for reduction
struct StarJob {
    identity: CanonicalStar,
    sources: ParamSources,
    catalogs: Vec<CatalogAbundances>,
}

/// Main ingestion pipeline
pub struct IngestionPipeline<S, R, P> {
    resolver: StarResolver<S, R, P>,
    norms: SolarNorms,
    errors: RepresentativeErrors,
    config: ReductionConfig,
    sources: ParamSourceTables,
    progress: bool,
}

impl<S: AliasStore, R: ExternalResolver, P: ResolutionPolicy> IngestionPipeline<S, R, P> {
    pub fn new(resolver: StarResolver<S, R, P>, norms: SolarNorms, config: ReductionConfig) -> Self {
        let errors = RepresentativeErrors::new(BTreeMap::new(), config.default_representative_error);
        Self { resolver, norms, errors, config, sources: ParamSourceTables::new(), progress: true }
    }

    pub fn with_errors(mut self, errors: RepresentativeErrors) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_sources(mut self, sources: ParamSourceTables) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn resolver(&self) -> &StarResolver<S, R, P> {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut StarResolver<S, R, P> {
        &mut self.resolver
    }

    /// Resolve, merge, normalize and reduce every catalog.
    ///
    /// Returns one document per resolved star, sorted by main id.
    pub fn run(&mut self, tables: &[CatalogTable]) -> CatalogResult<(Vec<StarDocument>, RunSummary)> {
        self.check_scales()?;
        let mut summary = RunSummary { catalogs: tables.len(), ..Default::default() };
        let mut per_star: BTreeMap<String, Vec<CatalogAbundances>> = BTreeMap::new();

        for table in tables {
            summary.rows += table.len();
            if !table.missing_from_norm.is_empty() {
                summary.missing_from_norm.insert(table.name.clone(), table.missing_from_norm.clone());
            }
            for (main_id, record) in self.merge_table(table, &mut summary)? {
                per_star.entry(main_id).or_default().push(record);
            }
        }
        self.resolver.flush()?;
        summary.resolution = self.resolver.stats().clone();

        // later catalogs may have merged identities that earlier ones resolved to
        let mut merged: BTreeMap<String, Vec<CatalogAbundances>> = BTreeMap::new();
        for (main_id, catalogs) in per_star {
            let survivor = self.resolver.survivor(&main_id);
            if survivor != main_id {
                tracing::debug!(from = %main_id, to = %survivor, "moving catalog records onto merged identity");
            }
            merged.entry(survivor.to_string()).or_default().extend(catalogs);
        }

        let mut jobs = Vec::with_capacity(merged.len());
        for (main_id, mut catalogs) in merged {
            label_repeats(&mut catalogs);
            match self.resolver.identity(&main_id) {
                Some(identity) => jobs.push(StarJob {
                    sources: self.sources.for_star(identity),
                    identity: identity.clone(),
                    catalogs,
                }),
                None => summary.failures.push(SkippedRow {
                    catalog: String::new(),
                    names: vec![main_id.clone()],
                    error: Some(CatalogError::IdentityNotFound(main_id).to_string()),
                }),
            }
        }

        let (documents, reports) = self.reduce_stars(jobs, &mut summary);
        summary.stars = documents.len();
        summary.dropped_parallax = reports;
        summary.representative_fallbacks = self.errors.fallback_elements();
        Ok((documents, summary))
    }

    /// Configured scales must exist before any catalog is touched.
    fn check_scales(&self) -> CatalogResult<()> {
        for scale in &self.config.scales {
            if scale.trim().eq_ignore_ascii_case(ORIGINAL_SCALE) {
                continue;
            }
            if self.norms.scale(scale)?.is_none() {
                return Err(CatalogError::UnknownScale(scale.clone()));
            }
        }
        Ok(())
    }

    /// Resolve one catalog's rows and split repeated listings into their own groups.
    fn merge_table(
        &mut self,
        table: &CatalogTable,
        summary: &mut RunSummary,
    ) -> CatalogResult<Vec<(String, CatalogAbundances)>> {
        tracing::info!("Resolving {} rows of catalog {}", table.len(), table.name);
        let names: Vec<Vec<String>> = table.rows.iter().map(|r| r.names.clone()).collect();
        let results = match self.resolver.resolve_batch(&names, &table.name) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(catalog = %table.name, error = %err, "catalog resolution failed");
                summary.failures.extend(table.rows.iter().map(|row| SkippedRow {
                    catalog: table.name.clone(),
                    names: row.names.clone(),
                    error: Some(err.to_string()),
                }));
                return Ok(Vec::new());
            }
        };

        let mut resolved = Vec::new();
        for (row, result) in table.rows.iter().zip(results) {
            match result {
                Ok(Resolution::Resolved { main_id, .. }) => resolved.push((main_id, row.abundances.clone())),
                Ok(Resolution::Deferred { names }) => {
                    summary.deferred.push(SkippedRow { catalog: table.name.clone(), names, error: None })
                }
                Err(err) => {
                    tracing::warn!(catalog = %table.name, names = ?row.names, error = %err, "row not resolved");
                    summary.failures.push(SkippedRow {
                        catalog: table.name.clone(),
                        names: row.names.clone(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let main_ids: Vec<&str> = resolved.iter().map(|(id, _)| id.as_str()).collect();
        let groups = unique_groups(&main_ids);
        let total = groups.len();
        if total > 1 {
            let repeats: usize = groups.iter().skip(1).map(Vec::len).sum();
            tracing::warn!(catalog = %table.name, repeats, groups = total, "catalog lists some stars more than once");
            summary.double_listed.insert(table.name.clone(), repeats);
        }
        let mut group_of = vec![0; resolved.len()];
        for (group, rows) in groups.iter().enumerate() {
            for row in rows {
                group_of[*row] = group;
            }
        }

        let mut merged = Vec::with_capacity(resolved.len());
        for ((main_id, mut record), group) in resolved.into_iter().zip(group_of) {
            if group > 0 {
                record.catalog = format!("{} ({} of {})", table.name, group + 1, total);
            }
            record.normalize_all(&self.config.scales, &self.norms, self.config.decimals)?;
            merged.push((main_id, record));
        }
        Ok(merged)
    }

    /// Per-star parameters and abundance statistics, in parallel.
    fn reduce_stars(&self, jobs: Vec<StarJob>, summary: &mut RunSummary) -> (Vec<StarDocument>, Vec<String>) {
        tracing::info!("Reducing {} stars", jobs.len());

        let pb = if self.progress { ProgressBar::new(jobs.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style);
        }

        let config = &self.config;
        let errors = &self.errors;
        let results: Vec<(String, CatalogResult<(StarDocument, CalcReport)>)> = jobs
            .into_par_iter()
            .map(|job| {
                let main_id = job.identity.main_id.clone();
                let result = reduce_star(job, config, errors);
                pb.inc(1);
                (main_id, result)
            })
            .collect();

        pb.finish_with_message("Reduction complete");

        let mut documents = Vec::with_capacity(results.len());
        let mut dropped = Vec::new();
        for (main_id, result) in results {
            match result {
                Ok((document, report)) => {
                    if report.dropped_parallax {
                        dropped.push(main_id);
                    }
                    documents.push(document);
                }
                Err(err) => {
                    tracing::warn!(main_id = %main_id, error = %err, "star reduction failed");
                    summary.failures.push(SkippedRow {
                        catalog: String::new(),
                        names: vec![main_id],
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        documents.sort_by(|a, b| a.main_id.cmp(&b.main_id));
        (documents, dropped)
    }
}

/// Give records that share a catalog name distinct `(k of n)` labels.
fn label_repeats(catalogs: &mut [CatalogAbundances]) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in catalogs.iter() {
        *counts.entry(record.catalog.clone()).or_default() += 1;
    }
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for record in catalogs.iter_mut() {
        let total = counts.get(&record.catalog).copied().unwrap_or(1);
        if total < 2 {
            continue;
        }
        let k = seen.entry(record.catalog.clone()).or_default();
        *k += 1;
        record.catalog = format!("{} ({} of {})", record.catalog, k, total);
    }
}

fn reduce_star(
    job: StarJob,
    config: &ReductionConfig,
    errors: &RepresentativeErrors,
) -> CatalogResult<(StarDocument, CalcReport)> {
    let (params, report) = StarParams::from_sources(&job.identity, &job.sources)?;
    let reduced_abundances = reduce_abundances(&job.catalogs, config, errors);
    let catalogs = job.catalogs.into_iter().map(|c| (c.catalog.clone(), c)).collect();
    let document = StarDocument {
        main_id: job.identity.main_id.clone(),
        identity: job.identity,
        params,
        catalogs,
        reduced_abundances,
    };
    Ok((document, report))
}
