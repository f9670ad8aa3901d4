//! Catalog abundance records and their solar normalizations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use stellar_core::{round_to, ElementId};

use crate::error::{CatalogError, CatalogResult};
use crate::solar::{SolarNorms, ABSOLUTE_SCALE, ORIGINAL_SCALE};

/// Abundances of one catalog re-expressed against one solar scale
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAbundances {
    /// Scale key actually used (the catalog's own for `original`)
    pub reference_scale: String,
    pub values: BTreeMap<ElementId, f64>,
    /// Elements the catalog reports but the scale does not define
    pub not_normalizable: BTreeSet<ElementId>,
}

/// One catalog's abundances for one star.
///
/// `absolute` holds log-epsilon values and is never modified; every
/// normalization is a separate record keyed by scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogAbundances {
    pub catalog: String,
    /// The catalog's own solar reference
    pub norm_key: String,
    /// Star name as it appears in the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub absolute: BTreeMap<ElementId, f64>,
    #[serde(default)]
    pub normalized: BTreeMap<String, NormalizedAbundances>,
}

impl CatalogAbundances {
    pub fn new(catalog: &str, norm_key: &str, absolute: BTreeMap<ElementId, f64>) -> Self {
        Self {
            catalog: catalog.to_string(),
            norm_key: norm_key.trim().to_lowercase(),
            original_name: None,
            absolute,
            normalized: BTreeMap::new(),
        }
    }

    pub fn with_original_name(mut self, name: &str) -> Self {
        self.original_name = Some(name.to_string());
        self
    }

    /// Normalize against `scale`; `original` means the catalog's own scale.
    ///
    /// Each value becomes `value - reference[element]` rounded to
    /// `decimals`. A second call for the same scale is rejected.
    pub fn normalize(&mut self, scale: &str, norms: &SolarNorms, decimals: i32) -> CatalogResult<&NormalizedAbundances> {
        let scale = scale.trim().to_lowercase();
        if self.normalized.contains_key(&scale) {
            return Err(CatalogError::AlreadyNormalized { catalog: self.catalog.clone(), scale });
        }
        let reference_scale = if scale == ORIGINAL_SCALE { self.norm_key.clone() } else { scale.clone() };
        let reference = norms
            .scale(&reference_scale)?
            .ok_or_else(|| CatalogError::UnknownScale(format!("{scale} has no solar reference values")))?;

        let mut normalized = NormalizedAbundances { reference_scale, ..Default::default() };
        for (element, value) in &self.absolute {
            match reference.get(element) {
                Some(solar) => {
                    normalized.values.insert(element.clone(), round_to(value - solar, decimals));
                }
                None => {
                    normalized.not_normalizable.insert(element.clone());
                }
            }
        }
        if !normalized.not_normalizable.is_empty() {
            tracing::warn!(
                catalog = %self.catalog,
                scale = %scale,
                elements = ?normalized.not_normalizable.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "elements not normalizable under scale"
            );
        }
        Ok(self.normalized.entry(scale).or_insert(normalized))
    }

    /// Normalize against every scale not yet applied. `original` is skipped
    /// for catalogs that report absolute values.
    pub fn normalize_all(&mut self, scales: &[String], norms: &SolarNorms, decimals: i32) -> CatalogResult<()> {
        for scale in scales {
            let key = scale.trim().to_lowercase();
            if self.normalized.contains_key(&key) {
                continue;
            }
            if key == ORIGINAL_SCALE && self.norm_key == ABSOLUTE_SCALE {
                tracing::debug!(catalog = %self.catalog, "absolute catalog has no original normalization");
                continue;
            }
            self.normalize(&key, norms, decimals)?;
        }
        Ok(())
    }

    pub fn normalization(&self, scale: &str) -> Option<&NormalizedAbundances> {
        self.normalized.get(&scale.trim().to_lowercase())
    }
}
