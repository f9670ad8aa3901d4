//! Element identifiers for abundance measurements.
//!
//! An [`ElementId`] is the composite key used to decide whether two catalog
//! readings measure "the same quantity": element symbol, ionization state,
//! NLTE flag, and an optional isotope number. All four must match for two
//! identifiers to be equal.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Element symbols ordered by atomic number (index 0 is hydrogen)
const PERIODIC_TABLE: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne",
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca",
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn",
    "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr",
    "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn",
    "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd",
    "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb",
    "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th",
    "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es", "Fm",
    "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds",
    "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Look up the canonical symbol and atomic number for a case-insensitive symbol.
pub fn lookup_symbol(symbol: &str) -> Option<(&'static str, u32)> {
    PERIODIC_TABLE
        .iter()
        .position(|s| s.eq_ignore_ascii_case(symbol))
        .map(|i| (PERIODIC_TABLE[i], i as u32 + 1))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementParseError {
    #[error("element string is empty")]
    Empty,

    #[error("element {0:?} not found in the periodic table")]
    UnknownElement(String),

    #[error("element {0:?} has an ambiguous ionization state")]
    AmbiguousIonState(String),
}

/// Ionization state, ordered neutral < I < II < ... < VI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IonState {
    /// No ionization state reported
    Neutral,
    I,
    II,
    III,
    IV,
    V,
    VI,
}

impl IonState {
    const NUMERALS: [(&'static str, IonState); 6] = [
        ("I", IonState::I),
        ("II", IonState::II),
        ("III", IonState::III),
        ("IV", IonState::IV),
        ("V", IonState::V),
        ("VI", IonState::VI),
    ];

    /// Parse a roman numeral ion state, ignoring case.
    pub fn from_numeral(numeral: &str) -> Option<Self> {
        Self::NUMERALS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(numeral))
            .map(|(_, state)| *state)
    }

    pub fn numeral(&self) -> Option<&'static str> {
        match self {
            Self::Neutral => None,
            Self::I => Some("I"),
            Self::II => Some("II"),
            Self::III => Some("III"),
            Self::IV => Some("IV"),
            Self::V => Some("V"),
            Self::VI => Some("VI"),
        }
    }

    fn order(&self) -> u32 {
        *self as u32
    }
}

/// Composite key for one abundance quantity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct ElementId {
    symbol: &'static str,
    atomic_number: u32,
    pub ion: IonState,
    pub nlte: bool,
    pub isotope: Option<u16>,
}

impl ElementId {
    /// Neutral, LTE identifier for a symbol such as `"Fe"`.
    pub fn new(symbol: &str) -> Result<Self, ElementParseError> {
        let (symbol, atomic_number) = lookup_symbol(symbol)
            .ok_or_else(|| ElementParseError::UnknownElement(symbol.to_string()))?;
        Ok(Self { symbol, atomic_number, ion: IonState::Neutral, nlte: false, isotope: None })
    }

    pub fn with_ion(mut self, ion: IonState) -> Self {
        self.ion = ion;
        self
    }

    pub fn with_nlte(mut self, nlte: bool) -> Self {
        self.nlte = nlte;
        self
    }

    pub fn with_isotope(mut self, isotope: Option<u16>) -> Self {
        self.isotope = isotope;
        self
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn atomic_number(&self) -> u32 {
        self.atomic_number
    }

    /// Same element and isotope, LTE.
    pub fn lte(&self) -> Self {
        self.clone().with_nlte(false)
    }

    /// Same element and isotope, neutral and LTE.
    pub fn neutral_lte(&self) -> Self {
        self.clone().with_nlte(false).with_ion(IonState::Neutral)
    }

    /// Sort rank for display: atomic number, then isotope as a minor
    /// fractional offset, then ionization state as a smaller one still.
    pub fn rank(&self) -> f64 {
        let mut rank = self.atomic_number as f64;
        if let Some(isotope) = self.isotope {
            rank += isotope as f64 * 1e-4;
        }
        rank += self.ion.order() as f64 * 1e-5;
        if self.nlte {
            rank += 1e-6;
        }
        rank
    }
}

impl Ord for ElementId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.atomic_number, self.isotope, self.ion, self.nlte)
            .cmp(&(other.atomic_number, other.isotope, other.ion, other.nlte))
    }
}

impl PartialOrd for ElementId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nlte {
            write!(f, "NLTE_")?;
        }
        if let Some(isotope) = self.isotope {
            write!(f, "{isotope}")?;
        }
        write!(f, "{}", self.symbol)?;
        if let Some(numeral) = self.ion.numeral() {
            write!(f, "_{numeral}")?;
        }
        Ok(())
    }
}

impl From<ElementId> for String {
    fn from(id: ElementId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ElementId {
    type Error = ElementParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// Symbols point into the periodic table, never into the input.
impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl FromStr for ElementId {
    type Err = ElementParseError;

    /// Accepts `Fe`, `FeII`, `Fe_II`, `Fe II`, `NLTE_Fe`, `Fe_NLTE`, `13C`,
    /// and a trailing hydrogen ratio suffix such as `FeH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let original = s.trim();
        if original.is_empty() {
            return Err(ElementParseError::Empty);
        }
        let mut work = original.replace(' ', "_");

        // NLTE marker as a prefix or a suffix
        let mut nlte = false;
        let is_nlte = |part: Option<&str>| part.is_some_and(|p| p.eq_ignore_ascii_case("nlte"));
        if is_nlte(work.get(..4)) {
            nlte = true;
            work = work[4..].trim_matches('_').to_string();
        } else if work.len() > 4 && is_nlte(work.get(work.len() - 4..)) {
            nlte = true;
            work = work[..work.len() - 4].trim_matches('_').to_string();
        }

        // leading isotope number, e.g. 13C
        let digits: String = work.chars().take_while(|c| c.is_ascii_digit()).collect();
        let isotope = if digits.is_empty() {
            None
        } else {
            work = work[digits.len()..].trim_start_matches('_').to_string();
            digits.parse::<u16>().ok()
        };

        let (symbol, ion) = split_symbol_and_ion(&work)
            .or_else(|err| {
                // a trailing 'H' marks an [X/H] style key
                let stripped = work.strip_suffix(['h', 'H']).map(|w| w.trim_end_matches('_'));
                match stripped {
                    Some(rest) if !rest.is_empty() => split_symbol_and_ion(rest),
                    _ => Err(err),
                }
            })
            .map_err(|err| match err {
                ElementParseError::UnknownElement(_) => {
                    ElementParseError::UnknownElement(original.to_string())
                }
                other => other,
            })?;

        Ok(ElementId::new(symbol)?
            .with_ion(ion)
            .with_nlte(nlte)
            .with_isotope(isotope))
    }
}

/// Separate an element symbol from a trailing ionization numeral.
fn split_symbol_and_ion(work: &str) -> Result<(&str, IonState), ElementParseError> {
    if work.is_empty() {
        return Err(ElementParseError::Empty);
    }
    if lookup_symbol(work).is_some() {
        return Ok((work, IonState::Neutral));
    }

    // underscore-delimited numeral: Fe_II
    if let Some((head, tail)) = work.rsplit_once('_') {
        if let Some(ion) = IonState::from_numeral(tail) {
            let head = head.trim_end_matches('_');
            return lookup_symbol(head)
                .map(|_| (head, ion))
                .ok_or_else(|| ElementParseError::UnknownElement(work.to_string()));
        }
    }

    // mixed case carries the boundary: symbols are one capital plus an optional lowercase letter
    let mut chars = work.char_indices();
    if let Some((_, first)) = chars.next() {
        if first.is_ascii_uppercase() {
            let split = match chars.next() {
                Some((i, c)) if c.is_ascii_lowercase() => i + c.len_utf8(),
                Some((i, _)) => i,
                None => work.len(),
            };
            let (head, tail) = work.split_at(split);
            if let (Some(_), Some(ion)) = (lookup_symbol(head), IonState::from_numeral(tail)) {
                return Ok((head, ion));
            }
        }
    }

    // no case information left: try both symbol lengths
    let candidates: Vec<(&str, IonState)> = [1usize, 2]
        .iter()
        .filter(|&&len| work.len() > len && work.is_char_boundary(len))
        .filter_map(|&len| {
            let (head, tail) = work.split_at(len);
            lookup_symbol(head)?;
            IonState::from_numeral(tail).map(|ion| (head, ion))
        })
        .collect();

    match candidates.as_slice() {
        [single] => Ok(*single),
        [] => Err(ElementParseError::UnknownElement(work.to_string())),
        _ => Err(ElementParseError::AmbiguousIonState(work.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_symbols() {
        assert_eq!(id("Fe"), ElementId::new("Fe").unwrap());
        assert_eq!(id("fe").symbol(), "Fe");
        assert_eq!(id("Fe").atomic_number(), 26);
        assert_eq!(id("I").symbol(), "I");
    }

    #[test]
    fn test_parse_ion_states() {
        assert_eq!(id("Fe_II").ion, IonState::II);
        assert_eq!(id("FeII").ion, IonState::II);
        assert_eq!(id("Fe II").ion, IonState::II);
        assert_eq!(id("TiI").ion, IonState::I);
        assert_eq!(id("SII").symbol(), "S");
        assert_eq!(id("SII").ion, IonState::II);
        assert_eq!(id("SiI").symbol(), "Si");
        assert_eq!(id("SiI").ion, IonState::I);
        // whole-symbol match wins over an ion split
        assert_eq!(id("ni").symbol(), "Ni");
        assert_eq!(id("ni").ion, IonState::Neutral);
    }

    #[test]
    fn test_parse_ambiguous_lowercase() {
        assert_eq!(
            "sii".parse::<ElementId>(),
            Err(ElementParseError::AmbiguousIonState("sii".to_string()))
        );
    }

    #[test]
    fn test_parse_nlte_and_isotope() {
        let nlte = id("NLTE_Fe_II");
        assert!(nlte.nlte);
        assert_eq!(nlte.ion, IonState::II);
        assert!(id("Fe_NLTE").nlte);

        let carbon13 = id("13C");
        assert_eq!(carbon13.isotope, Some(13));
        assert_ne!(carbon13, id("C"));
    }

    #[test]
    fn test_parse_hydrogen_suffix() {
        assert_eq!(id("FeH"), id("Fe"));
        assert_eq!(id("Fe_H"), id("Fe"));
        assert_eq!(id("Rh").symbol(), "Rh");
        assert_eq!(id("Th").symbol(), "Th");
    }

    #[test]
    fn test_unknown_element() {
        assert!(matches!("Xx".parse::<ElementId>(), Err(ElementParseError::UnknownElement(_))));
        assert_eq!("  ".parse::<ElementId>(), Err(ElementParseError::Empty));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["Fe", "Fe_II", "NLTE_Fe", "NLTE_Ba_II", "13C"] {
            assert_eq!(id(s).to_string(), s);
        }
    }

    #[test]
    fn test_equality_needs_all_fields() {
        assert_ne!(id("Fe"), id("Fe_I"));
        assert_ne!(id("Fe"), id("NLTE_Fe"));
        assert_ne!(id("Fe_II"), id("NLTE_Fe_II"));
    }

    #[test]
    fn test_rank_order() {
        let mut ids = vec![id("Fe_II"), id("O"), id("Fe"), id("Fe_I"), id("C"), id("13C")];
        ids.sort_by(|a, b| a.rank().partial_cmp(&b.rank()).unwrap());
        let names: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(names, vec!["C", "13C", "O", "Fe", "Fe_I", "Fe_II"]);

        // Ord agrees with rank
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&id("Fe_II")).unwrap();
        assert_eq!(json, "\"Fe_II\"");
        let back: ElementId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id("Fe_II"));
    }

    #[test]
    fn test_deserialize_from_owned_input() {
        let owned = String::from("{\"NLTE_Ba_II\": 2.1}");
        let map: std::collections::BTreeMap<ElementId, f64> = serde_json::from_str(&owned).unwrap();
        drop(owned);
        assert_eq!(map.get(&id("NLTE_Ba_II")), Some(&2.1));

        let bad = serde_json::from_str::<ElementId>("\"Xx\"");
        assert!(bad.is_err());
    }
}
