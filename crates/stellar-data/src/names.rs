//! Star name matching and designation handling.
//!
//! Nothing here fails: every function returns a best-effort result and
//! leaves correctness to the cache-miss path.

use std::collections::BTreeMap;

/// Designation types kept as one representative id per identity
pub const INDEXED_NAME_TYPES: [&str; 11] = [
    "hip", "hd", "tyc", "gaia dr1", "gaia dr2", "gaia dr3", "bd", "2mass", "koi", "kepler", "wds",
];

/// Survey prefixes whose names are auto-created without operator review
pub const MICRO_LENSING_PREFIXES: [&str; 4] = ["kmt", "ogle", "moa", "k2"];

/// Designation prefixes recognized by [`name_type`]
const KNOWN_NAME_TYPES: [&str; 28] = [
    "hip", "hd", "hr", "hic", "tyc", "gaia dr1", "gaia dr2", "gaia dr3", "gaia", "bd", "cd", "cpd",
    "2mass", "koi", "kepler", "k2", "wds", "gj", "gl", "g", "ltt", "wasp", "hat", "xo", "tres",
    "kmt", "ogle", "moa",
];

const SYSTEM_DESIGNATIONS: [&str; 6] = ["a", "b", "c", "ab", "ac", "bc"];

/// Lookup key: whitespace removed, lowercased. `"HIP 12345"` and `"hip12345"` share a key.
pub fn match_key(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

/// A filesystem and identifier safe rendition of a star name.
pub fn attr_name(name: &str) -> String {
    let mut key = name.trim().to_lowercase().replace(' ', "_");
    while key.contains("__") {
        key = key.replace("__", "_");
    }
    key.replace('*', "star")
        .replace('+', "plus")
        .replace('-', "minus")
        .replace("2mass", "twomass")
        .replace('.', "point")
        .replace('[', "leftsqbracket")
        .replace(']', "rightsqbracket")
        .replace(',', "comma")
}

/// One representative alias per indexed designation type.
///
/// Aliases are visited in reverse-sorted order and the first match for a
/// type is kept; longer type prefixes are tested first so `gaia dr3` is
/// never shadowed by a shorter prefix.
pub fn indexed_names<'a, I>(aliases: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut types: Vec<&str> = INDEXED_NAME_TYPES.to_vec();
    types.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let mut sorted: Vec<&String> = aliases.into_iter().collect();
    sorted.sort_by(|a, b| b.cmp(a));

    let mut found = BTreeMap::new();
    for alias in sorted {
        let lower = alias.to_lowercase();
        if let Some(name_type) = types.iter().find(|t| lower.starts_with(**t)) {
            found.entry(name_type.to_string()).or_insert_with(|| alias.clone());
        }
    }
    found
}

/// Longest known designation prefix of a name, so `Gl 581` is `gl` and not `g`.
pub fn name_type(name: &str) -> Option<&'static str> {
    let lower = name.trim().to_lowercase();
    KNOWN_NAME_TYPES
        .iter()
        .filter(|t| lower.starts_with(**t))
        .max_by_key(|t| t.len())
        .copied()
}

/// Micro-lensing survey names look like `OGLE-2005-BLG-071L` or `OGLE 2005-BLG-071L`.
pub fn is_micro_lensing_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    name_type(&lower).is_some_and(|prefix| {
        MICRO_LENSING_PREFIXES.contains(&prefix)
            && !lower[prefix.len()..].starts_with(|c: char| c.is_ascii_alphabetic())
    })
}

/// Exoplanet archives append the lens marker `L` to micro-lensing hosts;
/// the identity service knows them without it. Returns the stripped name
/// (keeping any system designation) or `None` when no change is needed.
pub fn micro_lensing_lookup_name(name: &str) -> Option<String> {
    if !is_micro_lensing_name(name) {
        return None;
    }
    let (base, system) = match name.rsplit_once(' ') {
        Some((base, suffix)) if SYSTEM_DESIGNATIONS.contains(&suffix.to_lowercase().as_str()) => {
            (base, format!(" {suffix}"))
        }
        _ => (name, String::new()),
    };
    base.strip_suffix(['l', 'L']).map(|stripped| format!("{stripped}{system}"))
}

/// Prefix a bare catalog number with its column's designation, e.g. `HIP` + `12345`.
pub fn designation(name_type: Option<&str>, raw: &str) -> String {
    let raw = raw.trim();
    match name_type {
        Some(prefix) if !raw.to_lowercase().starts_with(&prefix.to_lowercase()) => {
            format!("{} {}", prefix.to_uppercase(), raw)
        }
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_key() {
        assert_eq!(match_key("HIP 12345"), "hip12345");
        assert_eq!(match_key("HIP12345"), "hip12345");
        assert_eq!(match_key(" BD+44  4548\t"), "bd+444548");
        assert_eq!(match_key(""), "");
    }

    #[test]
    fn test_attr_name() {
        assert_eq!(attr_name("* alf Cen A"), "star_alf_cen_a");
        assert_eq!(attr_name("BD+44  4548"), "bdplus44_4548");
        assert_eq!(attr_name("2MASS J0123-4567"), "twomass_j0123minus4567");
        assert_eq!(attr_name("[AB] 1.5,2"), "leftsqbracketabrightsqbracket_1point5comma2");
    }

    #[test]
    fn test_indexed_names() {
        let aliases: Vec<String> = [
            "HD 10700", "HIP 8102", "Gaia DR3 2452378776434276992", "Gaia DR2 2452378776434276992",
            "* tau Cet", "2MASS J01440402-1556141", "GJ 71",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let indexed = indexed_names(&aliases);
        assert_eq!(indexed["hd"], "HD 10700");
        assert_eq!(indexed["hip"], "HIP 8102");
        assert_eq!(indexed["gaia dr3"], "Gaia DR3 2452378776434276992");
        assert_eq!(indexed["gaia dr2"], "Gaia DR2 2452378776434276992");
        assert_eq!(indexed["2mass"], "2MASS J01440402-1556141");
        assert!(!indexed.contains_key("tyc"));
        assert_eq!(indexed.len(), 5);
    }

    #[test]
    fn test_indexed_names_first_in_reverse_order() {
        let aliases: Vec<String> = vec!["HD 1".into(), "HD 2".into()];
        assert_eq!(indexed_names(&aliases)["hd"], "HD 2");
    }

    #[test]
    fn test_name_type_longest_prefix() {
        assert_eq!(name_type("Gl 581"), Some("gl"));
        assert_eq!(name_type("G 99-47"), Some("g"));
        assert_eq!(name_type("Gaia DR2 123"), Some("gaia dr2"));
        assert_eq!(name_type("HIP 1"), Some("hip"));
        assert_eq!(name_type("* tau Cet"), None);
    }

    #[test]
    fn test_micro_lensing() {
        assert!(is_micro_lensing_name("OGLE-2005-BLG-071L"));
        assert!(is_micro_lensing_name("KMT-2019-BLG-0842L"));
        assert!(!is_micro_lensing_name("HD 10700"));
        assert!(!is_micro_lensing_name("Kepler-22"));
        assert!(is_micro_lensing_name("OGLE 2005-BLG-071L"));
        assert!(is_micro_lensing_name("K2-18"));
        assert!(!is_micro_lensing_name("Moat 12"));
        assert!(!is_micro_lensing_name("KOI-123"));

        assert_eq!(
            micro_lensing_lookup_name("OGLE 2005-BLG-071L").as_deref(),
            Some("OGLE 2005-BLG-071")
        );

        assert_eq!(
            micro_lensing_lookup_name("OGLE-2005-BLG-071L").as_deref(),
            Some("OGLE-2005-BLG-071")
        );
        assert_eq!(
            micro_lensing_lookup_name("OGLE-2013-BLG-0341L B").as_deref(),
            Some("OGLE-2013-BLG-0341 B")
        );
        assert_eq!(micro_lensing_lookup_name("MOA-2007-BLG-192"), None);
    }

    #[test]
    fn test_designation() {
        assert_eq!(designation(Some("hip"), "12345"), "HIP 12345");
        assert_eq!(designation(Some("HD"), "HD 10700"), "HD 10700");
        assert_eq!(designation(None, " tau Cet "), "tau Cet");
    }
}
