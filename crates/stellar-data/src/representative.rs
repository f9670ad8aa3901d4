//! Representative plus-minus errors per element.
//!
//! Used when a reduced abundance has no usable spread. Missing entries fall
//! back through proxy variants of the element, then a global default; every
//! fallback is logged and remembered so it is only reported once per element.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use stellar_core::{round_to, ElementId, IonState};

use crate::error::CatalogResult;

pub const DEFAULT_REPRESENTATIVE_ERROR: f64 = 0.1;
const ERROR_DECIMALS: i32 = 2;

/// Where a representative error came from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Table,
    Proxy(ElementId),
    Default,
}

/// Shared across reduction threads; fallbacks are memoized behind a lock.
#[derive(Debug)]
pub struct RepresentativeErrors {
    table: BTreeMap<ElementId, f64>,
    default: f64,
    /// Elements already resolved through a fallback
    fallbacks: Mutex<BTreeMap<ElementId, (f64, ErrorSource)>>,
}

impl Default for RepresentativeErrors {
    fn default() -> Self {
        Self::new(BTreeMap::new(), DEFAULT_REPRESENTATIVE_ERROR)
    }
}

impl RepresentativeErrors {
    pub fn new(table: BTreeMap<ElementId, f64>, default: f64) -> Self {
        let table = table.into_iter().map(|(k, v)| (k, round_to(v, ERROR_DECIMALS))).collect();
        Self { table, default, fallbacks: Mutex::new(BTreeMap::new()) }
    }

    /// Load a JSON object of element name to error, e.g. `{"Fe": 0.05}`.
    pub fn load(path: &Path, default: f64) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, f64> = serde_json::from_str(&json)?;
        let mut table = BTreeMap::new();
        for (name, value) in raw {
            table.insert(name.parse::<ElementId>()?, value);
        }
        tracing::info!("Loaded {} representative errors from {:?}", table.len(), path);
        Ok(Self::new(table, default))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Error for `element`, with where it came from.
    pub fn lookup(&self, element: &ElementId) -> (f64, ErrorSource) {
        if let Some(value) = self.table.get(element) {
            return (*value, ErrorSource::Table);
        }
        let mut fallbacks = self.fallbacks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(found) = fallbacks.get(element) {
            return found.clone();
        }

        let proxy = self.proxy(element).and_then(|p| self.table.get(&p).map(|v| (p, *v)));
        let found = match proxy {
            Some((proxy, value)) => {
                tracing::warn!(element = %element, proxy = %proxy, value, "using proxy representative error");
                (value, ErrorSource::Proxy(proxy))
            }
            None => {
                tracing::warn!(element = %element, value = self.default, "using default representative error");
                (self.default, ErrorSource::Default)
            }
        };
        fallbacks.insert(element.clone(), found.clone());
        found
    }

    pub fn get(&self, element: &ElementId) -> f64 {
        self.lookup(element).0
    }

    /// Elements that needed a fallback so far
    pub fn fallback_elements(&self) -> BTreeSet<ElementId> {
        self.fallbacks.lock().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
    }

    /// LTE variant of the same ion for NLTE species (or the NLTE neutral
    /// variant for ionized ones), then the LTE neutral variant.
    fn proxy(&self, element: &ElementId) -> Option<ElementId> {
        let ionized = element.ion != IonState::Neutral;
        let mut candidates = Vec::new();
        if element.nlte {
            candidates.push(element.lte());
            if ionized {
                candidates.push(element.clone().with_ion(IonState::Neutral));
            }
        }
        if ionized {
            candidates.push(element.neutral_lte());
        }
        candidates.into_iter().find(|c| self.table.contains_key(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    fn errors() -> RepresentativeErrors {
        let table = [(el("Fe"), 0.05), (el("NLTE_O"), 0.111), (el("Ti_II"), 0.08)].into_iter().collect();
        RepresentativeErrors::new(table, 0.1)
    }

    #[test]
    fn test_exact_entry() {
        let errors = errors();
        assert_eq!(errors.lookup(&el("Fe")), (0.05, ErrorSource::Table));
        // rounded to two decimals on load
        assert_eq!(errors.get(&el("NLTE_O")), 0.11);
        assert!(errors.fallback_elements().is_empty());
    }

    #[test]
    fn test_nlte_falls_back_to_lte_same_ion() {
        let errors = errors();
        assert_eq!(errors.lookup(&el("NLTE_Ti_II")), (0.08, ErrorSource::Proxy(el("Ti_II"))));
    }

    #[test]
    fn test_ionized_nlte_falls_back_to_nlte_neutral() {
        let errors = errors();
        assert_eq!(errors.lookup(&el("NLTE_O_II")), (0.11, ErrorSource::Proxy(el("NLTE_O"))));
    }

    #[test]
    fn test_ionized_falls_back_to_neutral_lte() {
        let errors = errors();
        assert_eq!(errors.lookup(&el("Fe_II")), (0.05, ErrorSource::Proxy(el("Fe"))));
        // the LTE neutral variant of an NLTE-only entry is not a proxy
        assert_eq!(errors.lookup(&el("O_II")), (0.1, ErrorSource::Default));
    }

    #[test]
    fn test_default_remembered() {
        let errors = errors();
        assert_eq!(errors.get(&el("Ba")), 0.1);
        assert_eq!(errors.get(&el("Ba")), 0.1);
        assert_eq!(errors.fallback_elements(), [el("Ba")].into_iter().collect());
    }

    #[test]
    fn test_load_json() {
        let path = std::env::temp_dir().join(format!("stellar-rep-err-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"Fe": 0.054, "Mg_II": 0.07}"#).unwrap();
        let errors = RepresentativeErrors::load(&path, 0.1).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get(&el("Fe")), 0.05);
        assert_eq!(errors.get(&el("MgII")), 0.07);
        std::fs::remove_file(&path).unwrap();
    }
}
