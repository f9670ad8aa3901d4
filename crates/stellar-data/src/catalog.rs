//! Abundance catalog tables and the catalog registry.
//!
//! A catalog CSV has one or more star-name columns and one column per
//! abundance in ratio notation (`FeH`, `Ti_Fe`, `AO`, `NLTE_Na_H`). Rows are
//! un-normalized to absolute log-epsilon values with the catalog's own solar
//! scale on load.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use stellar_core::{round_to, ElementId, IonState};

use crate::error::{CatalogError, CatalogResult};
use crate::names::designation;
use crate::normalize::CatalogAbundances;
use crate::solar::{SolarNorms, SolarScale};

/// Columns holding a name of any designation type
pub const MIXED_NAME_COLUMNS: [&str; 11] = [
    "Star", "star", "Stars", "starname", "Starname", "Name", "ID", "Object", "HDBD", "simbad_id", "name",
];
/// Columns holding bare numbers of a single designation type
pub const SINGLE_TYPE_NAME_COLUMNS: [&str; 9] = ["TYC", "HD", "HIP", "HR", "TrES", "CoRoT", "XO", "HAT", "WASP"];

const COMMENT_COLUMN: &str = "comments";
const NULL_VALUE: f64 = 99.99;

/// How an abundance column is expressed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ratio {
    /// log-epsilon, no solar normalization
    Absolute,
    /// `[X/H]`
    OverH,
    /// `[X/Fe]`
    OverFe,
}

/// Parse an abundance column header into its element and ratio kind.
///
/// Accepts `XH`, `X_H`, `XFe`, `X_Fe`, `AX`, `X_A` and bare symbols (read as
/// `[X/H]`), with an optional `NLTE` marker and ion numeral. A trailing `I`
/// numeral means the neutral species.
pub fn parse_ratio(header: &str) -> CatalogResult<(ElementId, Ratio)> {
    let mut work = header.trim().replace(' ', "_");
    let mut nlte = false;
    if let Some(pos) = work.to_ascii_uppercase().find("NLTE") {
        nlte = true;
        work = format!("{}{}", &work[..pos], &work[pos + 4..]).trim_matches('_').to_string();
    }
    if work.is_empty() {
        return Err(bad_ratio(header));
    }

    let element = |s: &str| -> Option<ElementId> {
        let s = s.trim_matches('_');
        if s.is_empty() {
            return None;
        }
        s.parse::<ElementId>().ok()
    };

    let mut chars = work.chars();
    let first = chars.next();
    let second = chars.next();
    let lower = work.to_lowercase();

    let parsed = if first == Some('A') && second.is_some_and(|c| c.is_ascii_uppercase()) && work.len() > 1 {
        element(&work[1..]).map(|e| (e, Ratio::Absolute))
    } else {
        None
    }
    .or_else(|| {
        let rest = work.strip_suffix("_A").or_else(|| work.strip_suffix("_a"))?;
        element(rest).map(|e| (e, Ratio::Absolute))
    })
    .or_else(|| {
        if !lower.ends_with("fe") {
            return None;
        }
        element(work.get(..work.len() - 2)?).map(|e| (e, Ratio::OverFe))
    })
    .or_else(|| {
        if !lower.ends_with('h') {
            return None;
        }
        element(work.get(..work.len() - 1)?).map(|e| (e, Ratio::OverH))
    })
    .or_else(|| element(&work).map(|e| (e, Ratio::OverH)));

    let (mut element, ratio) = parsed.ok_or_else(|| bad_ratio(header))?;
    if element.ion == IonState::I {
        element = element.with_ion(IonState::Neutral);
    }
    let nlte = nlte || element.nlte;
    Ok((element.with_nlte(nlte), ratio))
}

fn bad_ratio(header: &str) -> CatalogError {
    CatalogError::format(header, format!("abundance column {header:?} is not in a known ratio format"))
}

/// `[X/H]` to absolute
pub fn un_norm_x_over_h(value: f64, solar: f64) -> f64 {
    value + solar
}

/// `[X/Fe]` to absolute, given the star's `[Fe/H]`
pub fn un_norm_x_over_fe(value: f64, fe_h: f64, solar: f64) -> f64 {
    value + fe_h + solar
}

fn is_iron(element: &ElementId, ion: IonState) -> bool {
    element.symbol() == "Fe" && element.ion == ion && !element.nlte && element.isotope.is_none()
}

/// One row of a catalog after un-normalization
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRow {
    /// Every name the row gives for its star, designation prefixed
    pub names: Vec<String>,
    pub abundances: CatalogAbundances,
}

/// A loaded abundance catalog
#[derive(Clone, Debug)]
pub struct CatalogTable {
    pub name: String,
    pub norm_key: String,
    pub rows: Vec<CatalogRow>,
    /// Reported elements the catalog's own scale cannot un-normalize
    pub missing_from_norm: BTreeSet<ElementId>,
    pub comments: Vec<String>,
}

struct Columns {
    names: Vec<(usize, Option<String>)>,
    elements: Vec<(usize, ElementId, Ratio)>,
    comments: Option<usize>,
}

impl CatalogTable {
    pub fn load(path: &Path, name: &str, norm_key: &str, norms: &SolarNorms, decimals: i32) -> CatalogResult<Self> {
        tracing::info!("Loading catalog {} from {:?}", name, path);
        let table = Self::from_reader(std::fs::File::open(path)?, name, norm_key, norms, decimals)?;
        tracing::info!("Loaded {} rows from catalog {}", table.rows.len(), name);
        Ok(table)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        name: &str,
        norm_key: &str,
        norms: &SolarNorms,
        decimals: i32,
    ) -> CatalogResult<Self> {
        let norm_key = norm_key.trim().to_lowercase();
        let solar = norms.scale(&norm_key)?;

        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(reader);
        let headers = csv.headers()?.clone();
        let columns = classify_columns(name, &headers)?;

        let missing_from_norm = missing_from_norm(&columns, solar);
        if !missing_from_norm.is_empty() {
            tracing::warn!(
                catalog = %name,
                norm = %norm_key,
                elements = ?missing_from_norm.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "elements not in the catalog's solar scale are omitted"
            );
        }

        let mut table = Self {
            name: name.to_string(),
            norm_key: norm_key.clone(),
            rows: Vec::new(),
            missing_from_norm,
            comments: Vec::new(),
        };

        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let names: Vec<String> = columns
                .names
                .iter()
                .filter_map(|(i, prefix)| {
                    let raw = record.get(*i)?.trim();
                    (!raw.is_empty()).then(|| designation(prefix.as_deref(), raw))
                })
                .collect();
            if let Some(comment) = columns.comments.and_then(|i| record.get(i)).filter(|c| !c.is_empty()) {
                table.comments.push(comment.to_string());
            }
            let Some(original_name) = names.first().cloned() else {
                tracing::warn!(catalog = %name, row = line + 2, "row has no star name, skipped");
                continue;
            };

            let mut reported = BTreeMap::new();
            for (i, element, ratio) in &columns.elements {
                let cell = record.get(*i).unwrap_or_default();
                if cell.is_empty() {
                    continue;
                }
                let value = cell.parse::<f64>().map_err(|_| {
                    CatalogError::format(name, format!("row {}: bad value {cell:?} for {element}", line + 2))
                })?;
                if (value - NULL_VALUE).abs() < 1e-9 {
                    continue;
                }
                reported.insert(element.clone(), (*ratio, value));
            }

            let absolute = un_normalize(name, &original_name, &reported, solar, &table.missing_from_norm, decimals);
            let abundances = CatalogAbundances::new(name, &norm_key, absolute).with_original_name(&original_name);
            table.rows.push(CatalogRow { names, abundances });
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn classify_columns(catalog: &str, headers: &csv::StringRecord) -> CatalogResult<Columns> {
    let mut columns = Columns { names: Vec::new(), elements: Vec::new(), comments: None };
    for (i, header) in headers.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        if header.eq_ignore_ascii_case(COMMENT_COLUMN) {
            columns.comments = Some(i);
        } else if MIXED_NAME_COLUMNS.contains(&header) {
            columns.names.insert(0, (i, None));
        } else if SINGLE_TYPE_NAME_COLUMNS.contains(&header) {
            columns.names.push((i, Some(header.to_string())));
        } else {
            let (element, ratio) = parse_ratio(header).map_err(|_| {
                CatalogError::format(catalog, format!("column {header:?} is neither a star name nor an abundance"))
            })?;
            if is_iron(&element, IonState::II) {
                tracing::warn!(catalog = %catalog, column = %header, "Fe_II column removed");
                continue;
            }
            if columns.elements.iter().any(|(_, seen, _)| *seen == element) {
                return Err(CatalogError::format(catalog, format!("more than one column for {element}")));
            }
            columns.elements.push((i, element, ratio));
        }
    }
    if columns.names.is_empty() {
        return Err(CatalogError::format(catalog, "no star name column"));
    }
    Ok(columns)
}

/// Elements that are reported relative to the sun but absent from its scale.
fn missing_from_norm(columns: &Columns, solar: Option<&SolarScale>) -> BTreeSet<ElementId> {
    columns
        .elements
        .iter()
        .filter(|(_, _, ratio)| *ratio != Ratio::Absolute)
        .filter(|(_, element, _)| solar.map_or(true, |s| !s.contains_key(element)))
        .map(|(_, element, _)| element.clone())
        .collect()
}

fn un_normalize(
    catalog: &str,
    star: &str,
    reported: &BTreeMap<ElementId, (Ratio, f64)>,
    solar: Option<&SolarScale>,
    missing: &BTreeSet<ElementId>,
    decimals: i32,
) -> BTreeMap<ElementId, f64> {
    // [Fe/H] is needed for every [X/Fe] value in the row
    let fe_h = reported.iter().find(|(e, _)| is_iron(e, IonState::Neutral)).and_then(|(fe, (ratio, value))| {
        match ratio {
            Ratio::OverH => Some(*value),
            Ratio::Absolute => solar.and_then(|s| s.get(fe)).map(|sun| value - sun),
            Ratio::OverFe => None,
        }
    });

    let mut absolute = BTreeMap::new();
    for (element, (ratio, value)) in reported {
        if *ratio != Ratio::Absolute && missing.contains(element) {
            continue;
        }
        let converted = match ratio {
            Ratio::Absolute => Some(*value),
            Ratio::OverH => solar.and_then(|s| s.get(element)).map(|sun| un_norm_x_over_h(*value, *sun)),
            Ratio::OverFe => match (fe_h, solar.and_then(|s| s.get(element))) {
                (Some(fe_h), Some(sun)) => Some(un_norm_x_over_fe(*value, fe_h, *sun)),
                _ => {
                    tracing::warn!(catalog = %catalog, star = %star, element = %element, "no [Fe/H] for [X/Fe] value, omitted");
                    None
                }
            },
        };
        if let Some(converted) = converted {
            absolute.insert(element.clone(), round_to(converted, decimals));
        }
    }
    absolute
}

/// Group row indexes so no group holds the same star twice.
///
/// Each row joins the first group that does not already contain its star;
/// the first group is the catalog itself and every further group holds
/// repeated listings.
pub fn unique_groups<S: AsRef<str>>(main_ids: &[S]) -> Vec<Vec<usize>> {
    let mut groups: Vec<(BTreeSet<&str>, Vec<usize>)> = Vec::new();
    for (index, main_id) in main_ids.iter().enumerate() {
        let main_id = main_id.as_ref();
        match groups.iter_mut().find(|(ids, _)| !ids.contains(main_id)) {
            Some((ids, rows)) => {
                ids.insert(main_id);
                rows.push(index);
            }
            None => groups.push(([main_id].into_iter().collect(), vec![index])),
        }
    }
    groups.into_iter().map(|(_, rows)| rows).collect()
}

/// One line of the catalog registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Short catalog key, lowercased
    pub id: String,
    /// Full citation, e.g. `Adibekyan et al. (2012)`
    pub author: String,
    pub year: u16,
    /// The catalog's own solar scale key
    pub original_norm_id: String,
}

impl CatalogRecord {
    pub fn new(short: &str, long: &str, norm: &str) -> CatalogResult<Self> {
        let year = long
            .rsplit_once('(')
            .map(|(_, tail)| tail.chars().skip_while(|c| !c.is_ascii_digit()).take_while(char::is_ascii_digit).collect::<String>())
            .and_then(|digits| digits.parse::<u16>().ok())
            .ok_or_else(|| CatalogError::format(short, format!("year not found in the long name: {long}")))?;
        Ok(Self {
            id: short.trim().to_lowercase(),
            author: long.trim().to_string(),
            year,
            original_norm_id: norm.trim().to_lowercase(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RegistryCsvRecord {
    short: String,
    long: String,
    norm: String,
}

/// Catalogs to ingest, keyed by short name
#[derive(Clone, Debug, Default)]
pub struct CatalogRegistry {
    records: BTreeMap<String, CatalogRecord>,
}

impl CatalogRegistry {
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let registry = Self::from_reader(std::fs::File::open(path)?)?;
        tracing::info!("Loaded {} catalogs from registry {:?}", registry.len(), path);
        Ok(registry)
    }

    pub fn from_reader<R: Read>(reader: R) -> CatalogResult<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).comment(Some(b'#')).from_reader(reader);
        let mut records = BTreeMap::new();
        for result in csv.deserialize() {
            let raw: RegistryCsvRecord = result?;
            let record = CatalogRecord::new(&raw.short, &raw.long, &raw.norm)?;
            records.insert(record.id.clone(), record);
        }
        Ok(Self { records })
    }

    pub fn get(&self, short: &str) -> Option<&CatalogRecord> {
        self.records.get(&short.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Expected data file for a catalog under `dir`
    pub fn catalog_path(dir: &Path, record: &CatalogRecord) -> PathBuf {
        dir.join(format!("{}.csv", record.id))
    }

    /// Load every registered catalog found under `dir`; missing files are skipped.
    pub fn load_tables(&self, dir: &Path, norms: &SolarNorms, decimals: i32) -> CatalogResult<Vec<CatalogTable>> {
        let mut tables = Vec::new();
        for record in self.iter() {
            let path = Self::catalog_path(dir, record);
            if !path.exists() {
                tracing::warn!(catalog = %record.id, path = ?path, "catalog file not found, skipped");
                continue;
            }
            tables.push(CatalogTable::load(&path, &record.id, &record.original_norm_id, norms, decimals)?);
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solar::NORMS_CSV;
    use approx::assert_relative_eq;

    fn el(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    fn norms() -> SolarNorms {
        SolarNorms::from_reader(NORMS_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("FeH").unwrap(), (el("Fe"), Ratio::OverH));
        assert_eq!(parse_ratio("Fe_H").unwrap(), (el("Fe"), Ratio::OverH));
        assert_eq!(parse_ratio("OFe").unwrap(), (el("O"), Ratio::OverFe));
        assert_eq!(parse_ratio("Ti_II_Fe").unwrap(), (el("Ti_II"), Ratio::OverFe));
        assert_eq!(parse_ratio("AO").unwrap(), (el("O"), Ratio::Absolute));
        assert_eq!(parse_ratio("C_A").unwrap(), (el("C"), Ratio::Absolute));
        assert_eq!(parse_ratio("NLTE_Na_H").unwrap(), (el("NLTE_Na"), Ratio::OverH));
        assert_eq!(parse_ratio("FeIH").unwrap(), (el("Fe"), Ratio::OverH));
        // bare symbols, including ones ending in h or a
        assert_eq!(parse_ratio("Th").unwrap(), (el("Th"), Ratio::OverH));
        assert_eq!(parse_ratio("Na").unwrap(), (el("Na"), Ratio::OverH));
        assert_eq!(parse_ratio("Ag").unwrap(), (el("Ag"), Ratio::OverH));
        assert!(parse_ratio("Teff").is_err());
    }

    #[test]
    fn test_un_norm_functions() {
        assert_relative_eq!(un_norm_x_over_h(0.1, 7.5), 7.6);
        assert_relative_eq!(un_norm_x_over_fe(-0.2, 0.1, 8.69), 8.59);
    }

    const CATALOG: &str = "\
Star,HIP,FeH,OFe,CH,Fe_II_H,XeH,comments
HD 10700,8102,-0.5,0.2,99.99,-0.4,0.1,thin disk
,9999,0.1,,,,,
tau Cet,,-0.48,,-0.3,,,
";

    #[test]
    fn test_read_and_un_normalize() {
        let table = CatalogTable::from_reader(CATALOG.as_bytes(), "test12", "Asplund09", &norms(), 3).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.norm_key, "asplund09");
        assert_eq!(table.missing_from_norm, [el("Xe")].into_iter().collect());
        assert_eq!(table.comments, vec!["thin disk"]);

        let first = &table.rows[0];
        assert_eq!(first.names, vec!["HD 10700", "HIP 8102"]);
        assert_eq!(first.abundances.original_name.as_deref(), Some("HD 10700"));
        let absolute = &first.abundances.absolute;
        assert_relative_eq!(absolute[&el("Fe")], 7.0);
        assert_relative_eq!(absolute[&el("O")], 8.39);
        // null marker, Fe_II column and unscaled element are all absent
        assert_eq!(absolute.len(), 2);

        // only the single-type name column is filled
        assert_eq!(table.rows[1].names, vec!["HIP 9999"]);
        assert_relative_eq!(table.rows[2].abundances.absolute[&el("C")], 8.13);
    }

    #[test]
    fn test_x_over_fe_without_iron_is_omitted() {
        let csv = "Name,OFe\nHD 1,0.3\n";
        let table = CatalogTable::from_reader(csv.as_bytes(), "t", "asplund09", &norms(), 3).unwrap();
        assert!(table.rows[0].abundances.absolute.is_empty());
    }

    #[test]
    fn test_absolute_catalog() {
        let csv = "Star,AFe,AO,CH\nHD 1,7.4,8.6,0.1\n";
        let table = CatalogTable::from_reader(csv.as_bytes(), "abs", "absolute", &norms(), 3).unwrap();
        assert_eq!(table.missing_from_norm, [el("C")].into_iter().collect());
        let absolute = &table.rows[0].abundances.absolute;
        assert_relative_eq!(absolute[&el("Fe")], 7.4);
        assert_relative_eq!(absolute[&el("O")], 8.6);
    }

    #[test]
    fn test_bad_headers() {
        let no_name = "FeH\n0.1\n";
        assert!(matches!(
            CatalogTable::from_reader(no_name.as_bytes(), "t", "asplund09", &norms(), 3),
            Err(CatalogError::CatalogFormat { .. })
        ));
        let unknown = "Star,Teff\nHD 1,5700\n";
        assert!(CatalogTable::from_reader(unknown.as_bytes(), "t", "asplund09", &norms(), 3).is_err());
        let duplicate = "Star,FeH,Fe_H\nHD 1,0.1,0.1\n";
        assert!(CatalogTable::from_reader(duplicate.as_bytes(), "t", "asplund09", &norms(), 3).is_err());
        assert!(matches!(
            CatalogTable::from_reader("Star,FeH\n".as_bytes(), "t", "grevesse98", &norms(), 3),
            Err(CatalogError::UnknownScale(_))
        ));
    }

    #[test]
    fn test_unique_groups() {
        let ids = ["a", "b", "a", "c", "a", "b"];
        assert_eq!(unique_groups(&ids), vec![vec![0, 1, 3], vec![2, 5], vec![4]]);
        assert_eq!(unique_groups::<&str>(&[]), Vec::<Vec<usize>>::new());
    }

    #[test]
    fn test_registry() {
        let csv = "short,long,norm\nAdibekyan12 ,Adibekyan et al. (2012),Asplund09\nabs20,Absolute et al. (2020b),absolute\n";
        let registry = CatalogRegistry::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(registry.len(), 2);
        let record = registry.get("ADIBEKYAN12").unwrap();
        assert_eq!(record.year, 2012);
        assert_eq!(record.original_norm_id, "asplund09");
        assert_eq!(record.author, "Adibekyan et al. (2012)");
        assert_eq!(registry.get("abs20").unwrap().year, 2020);
        assert_eq!(
            CatalogRegistry::catalog_path(Path::new("/data"), record),
            PathBuf::from("/data/adibekyan12.csv")
        );
    }

    #[test]
    fn test_registry_requires_year() {
        assert!(CatalogRecord::new("x", "No Year et al.", "asplund09").is_err());
        assert!(CatalogRecord::new("x", "Someone (in prep)", "asplund09").is_err());
    }
}
