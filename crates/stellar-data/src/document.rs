//! Per-star output documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::canonical::CanonicalStar;
use crate::error::CatalogResult;
use crate::names::attr_name;
use crate::normalize::CatalogAbundances;
use crate::reducer::StarParams;
use crate::stats::ReducedAbundances;

/// Everything known about one star after a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StarDocument {
    pub main_id: String,
    pub identity: CanonicalStar,
    pub params: StarParams,
    /// Catalog name to the values it reported, with their normalizations
    pub catalogs: BTreeMap<String, CatalogAbundances>,
    /// Scale key to reduced statistics; always has `absolute`
    pub reduced_abundances: BTreeMap<String, ReducedAbundances>,
}

impl StarDocument {
    pub fn file_name(&self) -> String {
        format!("{}.json", attr_name(&self.main_id))
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Write one file per star under `dir`, returning the paths written.
pub fn save_per_star(documents: &[StarDocument], dir: &Path) -> CatalogResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(documents.len());
    for document in documents {
        let path = dir.join(document.file_name());
        document.save(&path)?;
        paths.push(path);
    }
    tracing::info!("Wrote {} star documents to {:?}", paths.len(), dir);
    Ok(paths)
}

/// Write every star into a single JSON array.
pub fn save_array(documents: &[StarDocument], path: &Path) -> CatalogResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(documents)?;
    std::fs::write(path, json)?;
    tracing::info!("Wrote {} star documents to {:?}", documents.len(), path);
    Ok(())
}

pub fn load_array(path: &Path) -> CatalogResult<Vec<StarDocument>> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
