//! SIMBAD TAP client for the external identity service.
//!
//! Two synchronous ADQL queries per batch: names against the `ident` table,
//! then object ids against `basic` joined with `ids`.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use crate::error::{CatalogError, CatalogResult};
use crate::names::match_key;
use crate::resolver::{ExternalResolver, ExternalStar, ResolverOutcome};

/// TAP synchronous JSON response
#[derive(Debug, Deserialize)]
pub(crate) struct TapResponse {
    metadata: Vec<TapColumn>,
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TapColumn {
    name: String,
}

impl TapResponse {
    /// Rows as column-name maps
    fn rows(&self) -> Vec<HashMap<&str, &Value>> {
        self.data
            .iter()
            .map(|row| self.metadata.iter().map(|c| c.name.as_str()).zip(row.iter()).collect())
            .collect()
    }
}

#[derive(Debug)]
pub struct SimbadTapResolver {
    client: reqwest::blocking::Client,
    url: String,
}

impl SimbadTapResolver {
    pub fn new(url: &str) -> CatalogResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, url: url.to_string() })
    }

    fn query(&self, adql: &str) -> CatalogResult<TapResponse> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("REQUEST", "doQuery"), ("LANG", "ADQL"), ("FORMAT", "json"), ("QUERY", adql)])
            .send()?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CatalogError::Resolver(format!("TAP service returned {status}")));
        }
        let response = response.error_for_status()?;
        Ok(response.json::<TapResponse>()?)
    }
}

/// ADQL string literal list: `'a', 'b'` with quotes doubled
fn adql_string_list<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn ident_query(names: &BTreeSet<String>) -> String {
    format!(
        "SELECT ident.id AS id, ident.oidref AS oid FROM ident WHERE ident.id IN ({})",
        adql_string_list(names)
    )
}

pub(crate) fn details_query(oids: &[i64]) -> String {
    let list = oids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
    format!(
        "SELECT basic.oid AS oid, basic.main_id AS main_id, basic.ra AS ra, basic.dec AS dec, \
         basic.coo_bibcode AS coord_bibcode, basic.sp_type AS sptype, basic.sp_bibcode AS sp_bibcode, \
         ids.ids AS aliases FROM basic JOIN ids ON basic.oid = ids.oidref WHERE basic.oid IN ({list})"
    )
}

fn text(value: Option<&&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn oid_text(value: Option<&&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Map each requested name to the oid whose identifier matches it.
pub(crate) fn parse_ident_rows(
    names: &BTreeSet<String>,
    response: &TapResponse,
) -> BTreeMap<String, ResolverOutcome> {
    let mut by_key: HashMap<String, String> = HashMap::new();
    for row in response.rows() {
        if let (Some(id), Some(oid)) = (text(row.get("id")), oid_text(row.get("oid"))) {
            by_key.insert(match_key(&id), oid);
        }
    }
    names
        .iter()
        .map(|name| {
            let outcome = match by_key.get(&match_key(name)) {
                Some(oid) => ResolverOutcome::Found(oid.clone()),
                None => ResolverOutcome::NotFound,
            };
            (name.clone(), outcome)
        })
        .collect()
}

pub(crate) fn parse_detail_rows(response: &TapResponse) -> BTreeMap<String, ExternalStar> {
    let mut records = BTreeMap::new();
    for row in response.rows() {
        let (Some(oid), Some(main_id)) = (oid_text(row.get("oid")), text(row.get("main_id"))) else {
            continue;
        };
        let aliases = text(row.get("aliases"))
            .map(|ids| ids.split('|').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect())
            .unwrap_or_default();
        records.insert(
            oid.clone(),
            ExternalStar {
                external_id: oid,
                main_id,
                aliases,
                ra: row.get("ra").and_then(|v| v.as_f64()),
                dec: row.get("dec").and_then(|v| v.as_f64()),
                coord_bibcode: text(row.get("coord_bibcode")),
                sptype: text(row.get("sptype")),
                sp_bibcode: text(row.get("sp_bibcode")),
            },
        );
    }
    records
}

impl ExternalResolver for SimbadTapResolver {
    fn resolve_batch(&mut self, names: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ResolverOutcome>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        tracing::info!(names = names.len(), "querying SIMBAD identifiers");
        let response = self.query(&ident_query(names))?;
        Ok(parse_ident_rows(names, &response))
    }

    fn fetch_details(&mut self, external_ids: &BTreeSet<String>) -> CatalogResult<BTreeMap<String, ExternalStar>> {
        let oids: Vec<i64> = external_ids.iter().filter_map(|id| id.parse().ok()).collect();
        if oids.is_empty() {
            return Ok(BTreeMap::new());
        }
        tracing::info!(objects = oids.len(), "querying SIMBAD object details");
        let response = self.query(&details_query(&oids))?;
        Ok(parse_detail_rows(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> TapResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_ident_query_escapes_quotes() {
        let names: BTreeSet<String> = ["HD 10700".to_string(), "Barnard's star".to_string()].into();
        let adql = ident_query(&names);
        assert!(adql.ends_with("IN ('Barnard''s star', 'HD 10700')"));
    }

    #[test]
    fn test_parse_ident_rows() {
        let names: BTreeSet<String> = ["HD10700".to_string(), "HIP 1".to_string()].into();
        let tap = response(json!({
            "metadata": [{"name": "id"}, {"name": "oid"}],
            "data": [["HD 10700", 1089]]
        }));
        let outcomes = parse_ident_rows(&names, &tap);
        assert_eq!(outcomes["HD10700"], ResolverOutcome::Found("1089".to_string()));
        assert_eq!(outcomes["HIP 1"], ResolverOutcome::NotFound);
    }

    #[test]
    fn test_parse_detail_rows() {
        let tap = response(json!({
            "metadata": [
                {"name": "oid"}, {"name": "main_id"}, {"name": "ra"}, {"name": "dec"},
                {"name": "coord_bibcode"}, {"name": "sptype"}, {"name": "sp_bibcode"}, {"name": "aliases"}
            ],
            "data": [[1089, "* tau Cet", 26.017, -15.937, "2007A&A...474..653V", "G8V", "", "HD 10700|HIP 8102|* tau Cet"]]
        }));
        let records = parse_detail_rows(&tap);
        let star = &records["1089"];
        assert_eq!(star.main_id, "* tau Cet");
        assert_eq!(star.aliases, vec!["HD 10700", "HIP 8102", "* tau Cet"]);
        assert_eq!(star.sptype.as_deref(), Some("G8V"));
        assert_eq!(star.sp_bibcode, None);
        assert_eq!(star.ra, Some(26.017));
    }
}
