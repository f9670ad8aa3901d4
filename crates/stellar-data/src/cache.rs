//! In-process identity cache.
//!
//! Built once per run and passed into the pipeline; the single source of
//! truth for name lookups while the run lasts.

use std::collections::{BTreeMap, HashMap};

use crate::canonical::CanonicalStar;
use crate::names::match_key;

#[derive(Debug, Default)]
pub struct IdentityCache {
    /// match key -> main_id
    names: HashMap<String, String>,
    stars: BTreeMap<String, CanonicalStar>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload every identity from a store snapshot.
    pub fn from_stars(stars: impl IntoIterator<Item = CanonicalStar>) -> Self {
        let mut cache = Self::new();
        for star in stars {
            cache.insert(star);
        }
        cache
    }

    pub fn main_id(&self, name: &str) -> Option<&str> {
        self.names.get(&match_key(name)).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalStar> {
        self.main_id(name).and_then(|id| self.stars.get(id))
    }

    pub fn get_by_id(&self, main_id: &str) -> Option<&CanonicalStar> {
        self.stars.get(main_id)
    }

    /// Add or replace an identity. Alias keys already claimed by a different
    /// identity keep their first owner.
    pub fn insert(&mut self, star: CanonicalStar) {
        let main_id = star.main_id.clone();
        self.names.insert(match_key(&main_id), main_id.clone());
        for key in star.match_keys() {
            let owner = self.names.entry(key).or_insert_with(|| main_id.clone());
            if *owner != main_id {
                tracing::debug!(alias_owner = %owner, main_id = %main_id, "alias already cached for another identity");
            }
        }
        self.stars.insert(main_id, star);
    }

    pub fn remove(&mut self, main_id: &str) -> Option<CanonicalStar> {
        let removed = self.stars.remove(main_id)?;
        self.names.retain(|_, owner| owner != main_id);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn stars(&self) -> impl Iterator<Item = &CanonicalStar> {
        self.stars.values()
    }

    /// Cached identities whose aliases look like `name`, best first.
    ///
    /// Used to offer an operator candidates for an unresolved name.
    pub fn candidates(&self, name: &str, limit: usize) -> Vec<String> {
        let key = match_key(name);
        if key.len() < 3 {
            return Vec::new();
        }
        let mut scored: BTreeMap<&str, usize> = BTreeMap::new();
        for (alias_key, main_id) in &self.names {
            let score = if alias_key.contains(&key) || key.contains(alias_key.as_str()) {
                key.len().min(alias_key.len()) + 100
            } else {
                common_prefix_len(alias_key, &key)
            };
            if score >= 4 {
                let best = scored.entry(main_id.as_str()).or_default();
                *best = (*best).max(score);
            }
        }
        let mut ranked: Vec<(&str, usize)> = scored.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(limit).map(|(id, _)| id.to_string()).collect()
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::IdentityOrigin;

    fn star(main_id: &str, aliases: &[&str]) -> CanonicalStar {
        CanonicalStar::new(main_id, aliases, IdentityOrigin::External)
    }

    #[test]
    fn test_lookup_any_alias() {
        let cache = IdentityCache::from_stars([star("* tau Cet", &["HD 10700", "HIP 8102"])]);
        assert_eq!(cache.main_id("hd10700"), Some("* tau Cet"));
        assert_eq!(cache.main_id("* TAU CET"), Some("* tau Cet"));
        assert_eq!(cache.get("HIP 8102").map(|s| s.aliases.len()), Some(3));
        assert!(cache.get("HIP 1").is_none());
    }

    #[test]
    fn test_first_owner_keeps_alias() {
        let mut cache = IdentityCache::new();
        cache.insert(star("A", &["shared"]));
        cache.insert(star("B", &["shared"]));
        assert_eq!(cache.main_id("shared"), Some("A"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_remove_drops_keys() {
        let mut cache = IdentityCache::from_stars([star("A", &["A1"]), star("B", &["B1"])]);
        assert!(cache.remove("A").is_some());
        assert!(cache.main_id("A1").is_none());
        assert_eq!(cache.main_id("B1"), Some("B"));
        assert!(cache.remove("A").is_none());
    }

    #[test]
    fn test_candidates() {
        let cache = IdentityCache::from_stars([
            star("* tau Cet", &["HD 10700"]),
            star("* eps Eri", &["HD 22049"]),
            star("Kepler-22", &[]),
        ]);
        assert_eq!(cache.candidates("HD 1070", 3), vec!["* tau Cet".to_string()]);
        assert_eq!(cache.candidates("Kepler-22b", 3), vec!["Kepler-22".to_string()]);
        assert!(cache.candidates("zz", 3).is_empty());
    }
}
