//! Solar reference abundance scales.
//!
//! Read from a CSV with a `catalog` key column (the scale key), one column
//! per element, and a free-text `#ref` column. Empty cells mean the scale
//! has no value for that element.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;

use stellar_core::ElementId;

use crate::error::{CatalogError, CatalogResult};

/// Key for values that carry no solar normalization
pub const ABSOLUTE_SCALE: &str = "absolute";
/// Key meaning "the catalog's own reference scale"
pub const ORIGINAL_SCALE: &str = "original";

const KEY_COLUMN: &str = "catalog";
const REF_COLUMN: &str = "#ref";

pub type SolarScale = BTreeMap<ElementId, f64>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolarNorms {
    scales: BTreeMap<String, SolarScale>,
}

impl SolarNorms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> CatalogResult<Self> {
        let norms = Self::from_reader(std::fs::File::open(path)?)?;
        tracing::info!("Loaded {} solar scales from {:?}", norms.len(), path);
        Ok(norms)
    }

    pub fn from_reader<R: Read>(reader: R) -> CatalogResult<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv.headers()?.clone();
        let key_index = headers
            .iter()
            .position(|h| h == KEY_COLUMN)
            .ok_or_else(|| CatalogError::format("solar norms", format!("missing `{KEY_COLUMN}` column")))?;
        let mut columns: Vec<Option<ElementId>> = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            if i == key_index || header == REF_COLUMN || header.is_empty() {
                columns.push(None);
            } else {
                columns.push(Some(header.parse()?));
            }
        }

        let mut norms = Self::new();
        for record in csv.records() {
            let record = record?;
            let Some(key) = record.get(key_index).filter(|k| !k.is_empty()) else {
                continue;
            };
            let mut scale = SolarScale::new();
            for (cell, element) in record.iter().zip(&columns) {
                let Some(element) = element else { continue };
                if cell.is_empty() {
                    continue;
                }
                let value = cell
                    .parse::<f64>()
                    .map_err(|_| CatalogError::format("solar norms", format!("scale {key}: bad value {cell:?} for {element}")))?;
                scale.insert(element.clone(), value);
            }
            norms.add_scale(key, scale);
        }
        Ok(norms)
    }

    pub fn add_scale(&mut self, key: &str, scale: SolarScale) {
        self.scales.insert(key.trim().to_lowercase(), scale);
    }

    /// Reference values for a scale; `None` for the absolute scale.
    pub fn scale(&self, key: &str) -> CatalogResult<Option<&SolarScale>> {
        let key = key.trim().to_lowercase();
        if key == ABSOLUTE_SCALE {
            return Ok(None);
        }
        self.scales.get(&key).map(Some).ok_or(CatalogError::UnknownScale(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        let key = key.trim().to_lowercase();
        key == ABSOLUTE_SCALE || self.scales.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.scales.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    /// Write in the same layout `from_reader` accepts, elements by rank.
    pub fn write<W: Write>(&self, writer: W) -> CatalogResult<()> {
        let elements: BTreeSet<&ElementId> = self.scales.values().flat_map(|s| s.keys()).collect();
        let mut csv = csv::Writer::from_writer(writer);
        let mut header = vec![KEY_COLUMN.to_string()];
        header.extend(elements.iter().map(|e| e.to_string()));
        header.push(REF_COLUMN.to_string());
        csv.write_record(&header)?;
        for (key, scale) in &self.scales {
            let mut row = vec![key.clone()];
            row.extend(elements.iter().map(|e| scale.get(*e).map(|v| v.to_string()).unwrap_or_default()));
            row.push(String::new());
            csv.write_record(&row)?;
        }
        csv.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) const NORMS_CSV: &str = "\
catalog,Fe,O,C,#ref
asplund09,7.5,8.69,8.43,Asplund et al. (2009)
Lodders09,7.46,8.73,,Lodders et al. (2009)
";

#[cfg(test)]
mod tests {
    use super::*;

    fn fe() -> ElementId {
        "Fe".parse().unwrap()
    }

    #[test]
    fn test_read_scales() {
        let norms = SolarNorms::from_reader(NORMS_CSV.as_bytes()).unwrap();
        assert_eq!(norms.len(), 2);
        let asplund = norms.scale("asplund09").unwrap().unwrap();
        assert_eq!(asplund[&fe()], 7.5);
        assert_eq!(asplund.len(), 3);

        // keys are lowercased and empty cells skipped
        let lodders = norms.scale("LODDERS09").unwrap().unwrap();
        assert_eq!(lodders.len(), 2);
        assert!(!lodders.contains_key(&"C".parse::<ElementId>().unwrap()));
    }

    #[test]
    fn test_absolute_and_unknown() {
        let norms = SolarNorms::from_reader(NORMS_CSV.as_bytes()).unwrap();
        assert!(norms.scale("absolute").unwrap().is_none());
        assert!(norms.contains("Absolute"));
        assert!(matches!(norms.scale("grevesse98"), Err(CatalogError::UnknownScale(_))));
    }

    #[test]
    fn test_bad_value() {
        let csv = "catalog,Fe\nx,abc\n";
        assert!(matches!(SolarNorms::from_reader(csv.as_bytes()), Err(CatalogError::CatalogFormat { .. })));
    }

    #[test]
    fn test_write_reads_back() {
        let norms = SolarNorms::from_reader(NORMS_CSV.as_bytes()).unwrap();
        let mut out = Vec::new();
        norms.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("catalog,C,O,Fe,#ref"));
        assert_eq!(SolarNorms::from_reader(text.as_bytes()).unwrap(), norms);
    }
}
