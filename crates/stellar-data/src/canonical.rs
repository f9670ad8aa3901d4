//! Canonical star identity
//!
//! One record per physical star: a `main_id`, every alias known to refer to
//! it, and one representative id per indexed designation type.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::names::{attr_name, indexed_names, match_key};
use crate::resolver::ExternalStar;

/// Which ingestion event created (or last rebuilt) an identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityOrigin {
    /// Confirmed by the external identity service
    External,
    /// Auto-created from an unresolved name during ingestion of a source
    Ingest(String),
    /// Entered by an operator
    Operator(String),
}

impl IdentityOrigin {
    pub fn is_external(&self) -> bool {
        matches!(self, IdentityOrigin::External)
    }
}

/// Seconds since the Unix epoch
pub fn now_timestamp() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStar {
    /// Unique key, original spelling kept for external queries
    pub main_id: String,

    pub attr_name: String,

    /// Every known name for this star; never empty
    pub aliases: BTreeSet<String>,

    /// Representative id per indexed designation type ("hip", "gaia dr3", ...)
    pub indexed: BTreeMap<String, String>,

    pub origin: IdentityOrigin,

    /// Last-modified time, seconds since the Unix epoch
    pub timestamp: f64,

    // Coordinates and spectral type reported by the external service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ra: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coord_bibcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sptype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_bibcode: Option<String>,
}

impl CanonicalStar {
    /// Identity with no external confirmation. `main_id` is always one of its aliases.
    pub fn new<I, S>(main_id: &str, aliases: I, origin: IdentityOrigin) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let main_id = main_id.trim().to_string();
        let mut star = Self {
            attr_name: attr_name(&main_id),
            aliases: BTreeSet::new(),
            indexed: BTreeMap::new(),
            origin,
            timestamp: now_timestamp(),
            ra: None,
            dec: None,
            coord_bibcode: None,
            sptype: None,
            sp_bibcode: None,
            main_id,
        };
        let mut names = vec![star.main_id.clone()];
        names.extend(aliases.into_iter().map(|a| a.as_ref().to_string()));
        star.merge_aliases(names.iter().map(String::as_str));
        star
    }

    /// Identity built from an external record plus the names that led to it.
    pub fn from_external<I, S>(external: &ExternalStar, extra_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = external
            .aliases
            .iter()
            .cloned()
            .chain(extra_names.into_iter().map(|n| n.as_ref().to_string()))
            .collect();
        let mut star = Self::new(&external.main_id, &names, IdentityOrigin::External);
        star.apply_external(external);
        star
    }

    /// Copy coordinates and spectral type from an external record.
    pub fn apply_external(&mut self, external: &ExternalStar) {
        self.ra = external.ra;
        self.dec = external.dec;
        self.coord_bibcode = external.coord_bibcode.clone();
        self.sptype = external.sptype.clone();
        self.sp_bibcode = external.sp_bibcode.clone();
        self.origin = IdentityOrigin::External;
    }

    /// Union new aliases in. Spellings differing only by case or spacing
    /// count as the same alias. Returns true when the set grew.
    pub fn merge_aliases<'a, I>(&mut self, aliases: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys: BTreeSet<String> = self.match_keys();
        let mut grew = false;
        for alias in aliases {
            let alias = alias.trim();
            if alias.is_empty() {
                continue;
            }
            if keys.insert(match_key(alias)) {
                self.aliases.insert(alias.to_string());
                grew = true;
            }
        }
        if grew {
            self.indexed = indexed_names(&self.aliases);
            self.timestamp = now_timestamp();
        }
        grew
    }

    /// Lookup keys for every alias
    pub fn match_keys(&self) -> BTreeSet<String> {
        self.aliases.iter().map(|a| match_key(a)).collect()
    }

    pub fn touch(&mut self) {
        self.timestamp = now_timestamp();
    }

    /// Non-external identities older than `refresh_age_secs` are re-checked.
    pub fn needs_refresh(&self, refresh_age_secs: f64, now: f64) -> bool {
        !self.origin.is_external() && self.timestamp + refresh_age_secs < now
    }
}
