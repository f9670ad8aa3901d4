//! Reduced abundance statistics across catalogs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use stellar_core::{round_to, ElementId};

use crate::config::ReductionConfig;
use crate::normalize::CatalogAbundances;
use crate::representative::{ErrorSource, RepresentativeErrors};
use crate::solar::ABSOLUTE_SCALE;

/// Significant figures kept for the standard deviation
const STD_SIG_FIGS: i32 = 3;

/// Statistics for one element of one star.
///
/// Values are collected with [`add_value`](Self::add_value); nothing is
/// computed until [`calc_stats`](Self::calc_stats).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementStats {
    pub element: ElementId,
    /// (catalog, value) in insertion order
    values: Vec<(String, f64)>,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub spread: Option<f64>,
    pub plusminus: Option<f64>,
    pub std: Option<f64>,
    /// Catalogs whose values define the median
    pub median_catalogs: Vec<String>,
    /// Set when `plusminus` came from the representative error table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plusminus_source: Option<ErrorSource>,
}

impl ElementStats {
    pub fn new(element: ElementId) -> Self {
        Self {
            element,
            values: Vec::new(),
            count: 0,
            mean: None,
            median: None,
            min: None,
            max: None,
            spread: None,
            plusminus: None,
            std: None,
            median_catalogs: Vec::new(),
            plusminus_source: None,
        }
    }

    pub fn add_value(&mut self, value: f64, catalog: &str, decimals: i32) {
        self.values.push((catalog.to_string(), round_to(value, decimals)));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Catalog name to its (rounded) value
    pub fn catalogs(&self) -> BTreeMap<&str, f64> {
        self.values.iter().map(|(c, v)| (c.as_str(), *v)).collect()
    }

    pub fn calc_stats(&mut self, config: &ReductionConfig, errors: &RepresentativeErrors) {
        let decimals = config.decimals;
        self.count = self.values.len();
        self.std = None;
        self.spread = None;
        self.plusminus = None;
        self.plusminus_source = None;

        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        match sorted.as_slice() {
            [] => {
                self.mean = None;
                self.median = None;
                self.min = None;
                self.max = None;
                self.median_catalogs.clear();
            }
            [(catalog, value)] => {
                self.mean = Some(*value);
                self.median = Some(*value);
                self.min = Some(*value);
                self.max = Some(*value);
                self.median_catalogs = vec![catalog.clone()];
            }
            _ => {
                let values: Vec<f64> = sorted.iter().map(|(_, v)| *v).collect();
                let n = values.len();
                let min = values[0];
                let max = values[n - 1];

                self.mean = Some(round_to(log_space_mean(&values), decimals));
                let (median, median_catalogs) = if n % 2 == 1 {
                    (values[n / 2], vec![sorted[n / 2].0.clone()])
                } else {
                    let (low, high) = (&sorted[n / 2 - 1], &sorted[n / 2]);
                    let mut catalogs = vec![low.0.clone()];
                    if high.0 != low.0 {
                        catalogs.push(high.0.clone());
                    }
                    ((low.1 + high.1) / 2.0, catalogs)
                };
                self.median = Some(round_to(median, decimals));
                self.median_catalogs = median_catalogs;
                self.min = Some(min);
                self.max = Some(max);
                let spread = round_to(max - min, decimals);
                self.spread = Some(spread);
                self.plusminus = Some(round_to(spread / 2.0, config.plusminus_decimals));
                if n > 2 {
                    self.std = Some(round_sig(population_std(&values), STD_SIG_FIGS));
                }
            }
        }

        if self.plusminus.map_or(true, |pm| pm == 0.0) {
            let (error, source) = errors.lookup(&self.element);
            self.plusminus = Some(error);
            self.plusminus_source = Some(source);
        }
    }
}

/// Mean of log-ratio values taken in linear space.
pub fn log_space_mean(values: &[f64]) -> f64 {
    let linear: f64 = values.iter().map(|v| 10f64.powf(*v)).sum::<f64>() / values.len() as f64;
    linear.log10()
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn round_sig(value: f64, sig_figs: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    round_to(value, sig_figs - 1 - magnitude)
}

/// Element statistics for one normalization scale of one star
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReducedAbundances {
    pub elements: BTreeMap<ElementId, ElementStats>,
    /// Element to the catalogs that report it but cannot be expressed on this scale
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub not_normalizable: BTreeMap<ElementId, BTreeSet<String>>,
}

impl ReducedAbundances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_abundance(&mut self, element: &ElementId, value: f64, catalog: &str, decimals: i32) {
        self.elements
            .entry(element.clone())
            .or_insert_with(|| ElementStats::new(element.clone()))
            .add_value(value, catalog, decimals);
    }

    pub fn calc(&mut self, config: &ReductionConfig, errors: &RepresentativeErrors) {
        for stats in self.elements.values_mut() {
            stats.calc_stats(config, errors);
        }
    }

    pub fn get(&self, element: &ElementId) -> Option<&ElementStats> {
        self.elements.get(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.not_normalizable.is_empty()
    }
}

/// Reduce a star's catalogs into per-scale statistics.
///
/// The `absolute` bucket is always present; other scales appear only when
/// some catalog has values or non-normalizable elements under them.
pub fn reduce_abundances(
    catalogs: &[CatalogAbundances],
    config: &ReductionConfig,
    errors: &RepresentativeErrors,
) -> BTreeMap<String, ReducedAbundances> {
    let mut buckets: BTreeMap<String, ReducedAbundances> = BTreeMap::new();
    buckets.insert(ABSOLUTE_SCALE.to_string(), ReducedAbundances::new());

    let mut ordered: Vec<&CatalogAbundances> = catalogs.iter().collect();
    ordered.sort_by(|a, b| a.catalog.cmp(&b.catalog));

    for catalog in &ordered {
        let absolute = buckets.entry(ABSOLUTE_SCALE.to_string()).or_default();
        for (element, value) in &catalog.absolute {
            absolute.add_abundance(element, *value, &catalog.catalog, config.decimals);
        }
    }
    for catalog in &ordered {
        for (scale, normalized) in &catalog.normalized {
            if normalized.values.is_empty() && normalized.not_normalizable.is_empty() {
                continue;
            }
            let bucket = buckets.entry(scale.clone()).or_default();
            for (element, value) in &normalized.values {
                bucket.add_abundance(element, *value, &catalog.catalog, config.decimals);
            }
            for element in &normalized.not_normalizable {
                bucket.not_normalizable.entry(element.clone()).or_default().insert(catalog.catalog.clone());
            }
        }
    }
    for bucket in buckets.values_mut() {
        bucket.calc(config, errors);
    }
    buckets
}
