//! What to do with a star no cache, store or external lookup could identify.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::IdentityCache;
use crate::canonical::{CanonicalStar, IdentityOrigin};
use crate::error::CatalogResult;
use crate::names::is_micro_lensing_name;

/// Decision for an unresolved star
#[derive(Debug, Clone, PartialEq)]
pub enum UnresolvedDecision {
    /// Create this identity without cross-validation
    Create(CanonicalStar),
    /// Leave the star unidentified for an operator to settle
    Defer,
}

pub trait ResolutionPolicy {
    /// `names` holds every name supplied for the star, best first.
    fn unresolved(&mut self, names: &[String], origin: &str, cache: &IdentityCache) -> UnresolvedDecision;

    /// Names deferred so far
    fn deferred(&self) -> &[QueuedName] {
        &[]
    }
}

fn auto_identity(names: &[String], origin: &str) -> UnresolvedDecision {
    match names.first() {
        Some(first) => {
            UnresolvedDecision::Create(CanonicalStar::new(first, names, IdentityOrigin::Ingest(origin.to_string())))
        }
        None => UnresolvedDecision::Defer,
    }
}

/// Non-interactive mode: every unresolved star becomes a new identity tagged with its origin.
#[derive(Debug, Default, Clone)]
pub struct AutoCreate;

impl ResolutionPolicy for AutoCreate {
    fn unresolved(&mut self, names: &[String], origin: &str, _cache: &IdentityCache) -> UnresolvedDecision {
        tracing::warn!(names = ?names, origin, "auto-creating identity without external confirmation");
        auto_identity(names, origin)
    }
}

/// One unresolved star waiting for review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedName {
    pub names: Vec<String>,
    pub origin: String,
    /// Cached identities that look similar
    pub candidates: Vec<String>,
}

/// Interactive mode: unresolved names go on a review list instead of
/// blocking on a prompt. Micro-lensing survey names are never queued.
#[derive(Debug, Clone)]
pub struct OperatorQueue {
    queue: Vec<QueuedName>,
    max_candidates: usize,
}

impl Default for OperatorQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorQueue {
    pub fn new() -> Self {
        Self { queue: Vec::new(), max_candidates: 5 }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        save_review(&self.queue, path)
    }

    pub fn load(path: &Path) -> CatalogResult<Vec<QueuedName>> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl ResolutionPolicy for OperatorQueue {
    fn unresolved(&mut self, names: &[String], origin: &str, cache: &IdentityCache) -> UnresolvedDecision {
        if names.iter().any(|n| is_micro_lensing_name(n)) {
            tracing::info!(names = ?names, origin, "auto-creating micro-lensing identity");
            return auto_identity(names, origin);
        }
        let mut candidates: Vec<String> = Vec::new();
        for name in names {
            for candidate in cache.candidates(name, self.max_candidates) {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        candidates.truncate(self.max_candidates);
        tracing::warn!(names = ?names, origin, candidates = candidates.len(), "deferring unresolved star to operator queue");
        self.queue.push(QueuedName { names: names.to_vec(), origin: origin.to_string(), candidates });
        UnresolvedDecision::Defer
    }

    fn deferred(&self) -> &[QueuedName] {
        &self.queue
    }
}

/// Write deferred stars as a JSON review file.
pub fn save_review(queue: &[QueuedName], path: &Path) -> CatalogResult<()> {
    let json = serde_json::to_string_pretty(queue)?;
    std::fs::write(path, json)?;
    tracing::info!("Wrote {} deferred stars to {:?}", queue.len(), path);
    Ok(())
}

impl<P: ResolutionPolicy + ?Sized> ResolutionPolicy for Box<P> {
    fn unresolved(&mut self, names: &[String], origin: &str, cache: &IdentityCache) -> UnresolvedDecision {
        (**self).unresolved(names, origin, cache)
    }

    fn deferred(&self) -> &[QueuedName] {
        (**self).deferred()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_auto_create_tags_origin() {
        let cache = IdentityCache::new();
        let decision = AutoCreate.unresolved(&names(&["XO-7", "TIC 268403451"]), "nea", &cache);
        let UnresolvedDecision::Create(star) = decision else {
            panic!("expected a new identity");
        };
        assert_eq!(star.main_id, "XO-7");
        assert_eq!(star.aliases.len(), 2);
        assert_eq!(star.origin, IdentityOrigin::Ingest("nea".to_string()));
    }

    #[test]
    fn test_operator_queue_defers() {
        let cache = IdentityCache::from_stars([CanonicalStar::new("HD 10700", ["* tau Cet"], IdentityOrigin::External)]);
        let mut queue = OperatorQueue::new();
        let decision = queue.unresolved(&names(&["HD 1070"]), "adibekyan12", &cache);
        assert_eq!(decision, UnresolvedDecision::Defer);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.deferred()[0].candidates, vec!["HD 10700".to_string()]);
        assert_eq!(queue.deferred()[0].origin, "adibekyan12");
    }

    #[test]
    fn test_operator_queue_creates_micro_lensing() {
        let mut queue = OperatorQueue::new();
        let decision = queue.unresolved(&names(&["OGLE-2005-BLG-071L"]), "nea", &IdentityCache::new());
        assert!(matches!(decision, UnresolvedDecision::Create(_)));
        assert!(queue.is_empty());
        let spaced = queue.unresolved(&names(&["OGLE 2005-BLG-071L"]), "nea", &IdentityCache::new());
        assert!(matches!(spaced, UnresolvedDecision::Create(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_review_file_round_trip() {
        let path = std::env::temp_dir().join(format!("stellar-review-{}.json", std::process::id()));
        let mut queue = OperatorQueue::new();
        queue.unresolved(&names(&["Unknown 1"]), "cat", &IdentityCache::new());
        queue.save(&path).unwrap();
        let loaded = OperatorQueue::load(&path).unwrap();
        assert_eq!(loaded, queue.deferred());
        std::fs::remove_file(&path).unwrap();
    }
}
