//! Persisted alias store: durable home of canonical identities across runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::canonical::CanonicalStar;
use crate::error::{CatalogError, CatalogResult};
use crate::names::match_key;

/// Backing store for canonical identities.
///
/// Implementations enforce that an alias belongs to at most one identity.
pub trait AliasStore {
    fn find_by_alias(&self, name: &str) -> CatalogResult<Option<CanonicalStar>>;

    fn find_by_id(&self, main_id: &str) -> CatalogResult<Option<CanonicalStar>>;

    /// Insert a new identity; `DuplicateKey` when the `main_id` is taken.
    fn create(&mut self, star: CanonicalStar) -> CatalogResult<()>;

    /// Union aliases into an existing identity and return the updated record.
    fn update_aliases(&mut self, main_id: &str, new_aliases: &[String]) -> CatalogResult<CanonicalStar>;

    /// Refresh the last-modified timestamp.
    fn touch(&mut self, main_id: &str) -> CatalogResult<()>;

    fn remove(&mut self, main_id: &str) -> CatalogResult<Option<CanonicalStar>>;

    fn all(&self) -> CatalogResult<Vec<CanonicalStar>>;

    /// Make pending writes durable.
    fn flush(&mut self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Alias store held in memory, used for tests and offline runs
#[derive(Debug, Default, Clone)]
pub struct InMemoryAliasStore {
    stars: BTreeMap<String, CanonicalStar>,
    /// match key -> main_id
    alias_index: HashMap<String, String>,
}

impl InMemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    fn check_aliases<'a>(
        &self,
        main_id: &str,
        aliases: impl IntoIterator<Item = &'a String>,
    ) -> CatalogResult<()> {
        for alias in aliases {
            if let Some(owner) = self.alias_index.get(&match_key(alias)) {
                if owner != main_id {
                    return Err(CatalogError::AliasConflict {
                        alias: alias.clone(),
                        owner: owner.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index(&mut self, star: &CanonicalStar) {
        for key in star.match_keys() {
            self.alias_index.insert(key, star.main_id.clone());
        }
    }
}

impl AliasStore for InMemoryAliasStore {
    fn find_by_alias(&self, name: &str) -> CatalogResult<Option<CanonicalStar>> {
        Ok(self
            .alias_index
            .get(&match_key(name))
            .and_then(|main_id| self.stars.get(main_id))
            .cloned())
    }

    fn find_by_id(&self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
        Ok(self.stars.get(main_id).cloned())
    }

    fn create(&mut self, star: CanonicalStar) -> CatalogResult<()> {
        if star.aliases.is_empty() {
            return Err(CatalogError::EmptyAliases(star.main_id));
        }
        if self.stars.contains_key(&star.main_id) {
            return Err(CatalogError::DuplicateKey(star.main_id));
        }
        self.check_aliases(&star.main_id, &star.aliases)?;
        self.index(&star);
        self.stars.insert(star.main_id.clone(), star);
        Ok(())
    }

    fn update_aliases(&mut self, main_id: &str, new_aliases: &[String]) -> CatalogResult<CanonicalStar> {
        self.check_aliases(main_id, new_aliases)?;
        let star = self
            .stars
            .get_mut(main_id)
            .ok_or_else(|| CatalogError::IdentityNotFound(main_id.to_string()))?;
        star.merge_aliases(new_aliases.iter().map(String::as_str));
        let updated = star.clone();
        self.index(&updated);
        Ok(updated)
    }

    fn touch(&mut self, main_id: &str) -> CatalogResult<()> {
        self.stars
            .get_mut(main_id)
            .ok_or_else(|| CatalogError::IdentityNotFound(main_id.to_string()))?
            .touch();
        Ok(())
    }

    fn remove(&mut self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
        let removed = self.stars.remove(main_id);
        if let Some(star) = &removed {
            for key in star.match_keys() {
                if self.alias_index.get(&key).is_some_and(|owner| owner == main_id) {
                    self.alias_index.remove(&key);
                }
            }
        }
        Ok(removed)
    }

    fn all(&self) -> CatalogResult<Vec<CanonicalStar>> {
        Ok(self.stars.values().cloned().collect())
    }
}

/// Alias store persisted as a JSON array of identities.
///
/// Loaded whole on open; `flush` writes a temp file then renames it over
/// the target so a crash never leaves a truncated store.
#[derive(Debug)]
pub struct JsonAliasStore {
    path: PathBuf,
    inner: InMemoryAliasStore,
    dirty: bool,
}

impl JsonAliasStore {
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let mut inner = InMemoryAliasStore::new();
        if path.exists() {
            let json = std::fs::read_to_string(path)?;
            let stars: Vec<CanonicalStar> = serde_json::from_str(&json)?;
            for star in stars {
                inner.create(star)?;
            }
            tracing::info!("Loaded {} identities from {:?}", inner.len(), path);
        }
        Ok(Self { path: path.to_path_buf(), inner, dirty: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl AliasStore for JsonAliasStore {
    fn find_by_alias(&self, name: &str) -> CatalogResult<Option<CanonicalStar>> {
        self.inner.find_by_alias(name)
    }

    fn find_by_id(&self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
        self.inner.find_by_id(main_id)
    }

    fn create(&mut self, star: CanonicalStar) -> CatalogResult<()> {
        self.inner.create(star)?;
        self.dirty = true;
        Ok(())
    }

    fn update_aliases(&mut self, main_id: &str, new_aliases: &[String]) -> CatalogResult<CanonicalStar> {
        let star = self.inner.update_aliases(main_id, new_aliases)?;
        self.dirty = true;
        Ok(star)
    }

    fn touch(&mut self, main_id: &str) -> CatalogResult<()> {
        self.inner.touch(main_id)?;
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, main_id: &str) -> CatalogResult<Option<CanonicalStar>> {
        let removed = self.inner.remove(main_id)?;
        self.dirty |= removed.is_some();
        Ok(removed)
    }

    fn all(&self) -> CatalogResult<Vec<CanonicalStar>> {
        self.inner.all()
    }

    fn flush(&mut self) -> CatalogResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.inner.all()?)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        tracing::debug!("Flushed {} identities to {:?}", self.inner.len(), self.path);
        Ok(())
    }
}
