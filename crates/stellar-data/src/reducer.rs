//! Curated stellar parameters.
//!
//! Every observation of a parameter is kept in the history; one of them is
//! the curated value. Sources are applied in a fixed order and the first
//! writer wins unless a caller explicitly overwrites:
//!
//! 1. SIMBAD coordinates and spectral type (from the canonical identity)
//! 2. Gaia, best-ranked data release first
//! 3. Pastel
//! 4. XHIP
//! 5. NEA stellar parameters, reverse-sorted by reference
//! 6. Calculated parameters (distance, position, disk population)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stellar_core::{classify_disk, format_hmsdms, parallax_to_distance, spectral_type_to_float};
use stellar_core::{EquatorialPosition, ObjectParams, SingleParam};

use crate::canonical::CanonicalStar;
use crate::error::{CatalogError, CatalogResult};

/// Gaia references, most preferred first
pub const GAIA_REFERENCE_RANKING: [&str; 4] = [
    "Gaia DR3 Gaia Collaboration et al. (2016b) and Gaia Collaboration et al. (2022k)",
    "Bailer-Jones et al. (2018)",
    "Gaia Data Release 2",
    "Gaia Data Release 1",
];

/// Reference attached to calculated parameters
pub const CALCULATED_REFERENCE: &str = "Stellar Calc";

/// Position of `reference` in the Gaia ranking.
pub fn gaia_rank(param: &str, reference: &str) -> CatalogResult<usize> {
    GAIA_REFERENCE_RANKING
        .iter()
        .position(|r| *r == reference)
        .ok_or_else(|| CatalogError::UnrankedReference { param: param.to_string(), reference: reference.to_string() })
}

/// Parameter sources for one star, other than SIMBAD
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSources {
    pub gaia: ObjectParams,
    pub pastel: ObjectParams,
    pub xhip: ObjectParams,
    pub nea: ObjectParams,
}

/// Outcome of the calculated-parameter step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcReport {
    /// Non-positive parallax removed from the curated set
    pub dropped_parallax: bool,
    pub distance_from_parallax: bool,
    pub position: bool,
    pub disk: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StarParams {
    curated: BTreeMap<String, SingleParam>,
    history: ObjectParams,
}

impl StarParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every source in order, then calculate derived parameters.
    pub fn from_sources(identity: &CanonicalStar, sources: &ParamSources) -> CatalogResult<(Self, CalcReport)> {
        let mut params = Self::new();
        params.simbad_params(identity);
        params.gaia_params(&sources.gaia)?;
        params.update_params(&sources.pastel, false);
        params.update_params(&sources.xhip, false);
        params.nea_params(&sources.nea);
        let report = params.calculated_params();
        Ok((params, report))
    }

    /// Record `param` in the history. It becomes the curated value when
    /// none exists yet or when `overwrite_existing` is set.
    pub fn update_param(&mut self, name: &str, param: SingleParam, overwrite_existing: bool) {
        let name = name.to_lowercase();
        if overwrite_existing || !self.curated.contains_key(&name) {
            self.curated.insert(name.clone(), param.clone());
        }
        self.history.insert(&name, param);
    }

    pub fn update_params(&mut self, params: &ObjectParams, overwrite_existing: bool) {
        for (name, observations) in params.iter() {
            for param in observations {
                self.update_param(name, param.clone(), overwrite_existing);
            }
        }
    }

    pub fn curated(&self, name: &str) -> Option<&SingleParam> {
        self.curated.get(&name.to_lowercase())
    }

    /// Numeric curated value
    pub fn value(&self, name: &str) -> Option<f64> {
        self.curated(name).and_then(|p| p.value.as_f64())
    }

    pub fn history(&self, name: &str) -> &[SingleParam] {
        self.history.get(name).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.curated.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.curated.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.curated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curated.is_empty()
    }

    /// Coordinates and spectral type carried by the canonical identity.
    pub fn simbad_params(&mut self, identity: &CanonicalStar) {
        if let (Some(ra), Some(dec), Some(bibcode)) = (identity.ra, identity.dec, &identity.coord_bibcode) {
            let reference = format!("SIMBAD provided bibcode: {bibcode}");
            let param = |value: SingleParam, units: &str| value.with_units(units).with_reference(reference.clone());
            self.update_param("raj2000", param(SingleParam::new(ra), "deg"), false);
            self.update_param("decj2000", param(SingleParam::new(dec), "deg"), false);
            self.update_param("hmsdms", param(SingleParam::new(format_hmsdms(ra, dec)), "string"), false);
        }
        if let Some(sptype) = &identity.sptype {
            let reference = match &identity.sp_bibcode {
                Some(bibcode) => format!("SIMBAD provided bibcode: {bibcode}"),
                None => "SIMBAD".to_string(),
            };
            self.update_param(
                "sptype",
                SingleParam::new(sptype.as_str()).with_units("string").with_reference(reference.clone()),
                false,
            );
            if let Some(num) = spectral_type_to_float(sptype) {
                self.update_param("sptype_num", SingleParam::new(num).with_reference(reference), false);
            }
        }
    }

    /// Gaia observations, best-ranked release first. Fails without writing
    /// anything when a reference is missing from the ranking.
    pub fn gaia_params(&mut self, gaia: &ObjectParams) -> CatalogResult<()> {
        let mut ranked: Vec<(&str, usize, &SingleParam)> = Vec::new();
        for (name, observations) in gaia.iter() {
            for param in observations {
                ranked.push((name, gaia_rank(name, param.reference())?, param));
            }
        }
        // stable: names stay sorted, ties keep source order
        ranked.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(&b.1)));
        for (name, _, param) in ranked {
            self.update_param(name, param.clone(), false);
        }
        Ok(())
    }

    /// NEA stellar parameters; within a parameter, references sorted in reverse.
    pub fn nea_params(&mut self, nea: &ObjectParams) {
        for (name, observations) in nea.iter() {
            let mut sorted: Vec<&SingleParam> = observations.iter().collect();
            sorted.sort_by(|a, b| b.reference().cmp(a.reference()));
            for param in sorted {
                self.update_param(name, param.clone(), false);
            }
        }
    }

    /// Distance from parallax, Cartesian position and disk population.
    ///
    /// A non-positive parallax is removed from the curated set; its history
    /// entry remains.
    pub fn calculated_params(&mut self) -> CalcReport {
        let mut report = CalcReport::default();
        let mut dist = self.value("dist");

        if let Some(parallax) = self.curated("parallax").cloned() {
            match parallax.value.as_f64().and_then(parallax_to_distance) {
                Some(distance) => {
                    if dist.is_none() {
                        let param = SingleParam::new(distance)
                            .with_units("[pc]")
                            .with_reference(format!("{CALCULATED_REFERENCE} from parallax:{}", parallax.reference()));
                        self.update_param("dist", param, false);
                        dist = Some(distance);
                        report.distance_from_parallax = true;
                    }
                }
                None => {
                    tracing::warn!(parallax = %parallax.value, reference = parallax.reference(), "dropping invalid parallax");
                    self.curated.remove("parallax");
                    report.dropped_parallax = true;
                }
            }
        }

        let gaia_position = self.value("ra_epochj2000").zip(self.value("dec_epochj2000"));
        let position = gaia_position.or_else(|| self.value("raj2000").zip(self.value("decj2000")));
        if let (Some(dist), Some((ra, dec))) = (dist, position) {
            let xyz = EquatorialPosition::new(ra, dec, dist).to_cartesian();
            for (name, value) in [("x_pos", xyz.x), ("y_pos", xyz.y), ("z_pos", xyz.z)] {
                let param = SingleParam::new(value).with_units("[pc]").with_reference(CALCULATED_REFERENCE);
                self.update_param(name, param, true);
            }
            report.position = true;
        }

        let velocities = (self.value("u_vel"), self.value("v_vel"), self.value("w_vel"));
        let disk = match velocities {
            (Some(u), Some(v), Some(w)) => Some(classify_disk(u, v, w)),
            _ => None,
        };
        let label = disk.map_or("N/A", |d| d.label());
        self.update_param(
            "disk",
            SingleParam::new(label).with_units("string").with_reference(CALCULATED_REFERENCE),
            true,
        );
        if let Some(disk) = disk {
            self.update_param("disk_num", SingleParam::new(disk.code()).with_reference(CALCULATED_REFERENCE), true);
            report.disk = true;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::IdentityOrigin;
    use approx::assert_relative_eq;
    use stellar_core::ParamValue;

    fn obs(value: f64, reference: &str) -> SingleParam {
        SingleParam::new(value).with_reference(reference)
    }

    #[test]
    fn test_first_writer_wins() {
        let mut params = StarParams::new();
        params.update_param("teff", obs(5700.0, "a"), false);
        params.update_param("teff", obs(5800.0, "b"), false);
        assert_eq!(params.curated("teff"), Some(&obs(5700.0, "a")));
        assert_eq!(params.history("teff"), &[obs(5700.0, "a"), obs(5800.0, "b")]);
    }

    #[test]
    fn test_overwrite_replaces_curated() {
        let mut params = StarParams::new();
        params.update_param("teff", obs(5700.0, "a"), false);
        params.update_param("Teff", obs(5800.0, "b"), true);
        assert_eq!(params.curated("teff"), Some(&obs(5800.0, "b")));
        assert_eq!(params.history("teff").len(), 2);
    }

    #[test]
    fn test_gaia_ranking() {
        let mut gaia = ObjectParams::new();
        gaia.insert("dist", obs(10.0, "Gaia Data Release 1"));
        gaia.insert("dist", obs(11.0, "Gaia Data Release 2"));
        gaia.insert("dist", obs(12.0, "Bailer-Jones et al. (2018)"));

        let mut params = StarParams::new();
        params.gaia_params(&gaia).unwrap();
        assert_eq!(params.value("dist"), Some(12.0));
        assert_eq!(params.history("dist").len(), 3);
    }

    #[test]
    fn test_unranked_gaia_reference_fails() {
        let mut gaia = ObjectParams::new();
        gaia.insert("dist", obs(10.0, "Gaia Data Release 2"));
        gaia.insert("teff", obs(5000.0, "Somebody (2020)"));

        let mut params = StarParams::new();
        let err = params.gaia_params(&gaia).unwrap_err();
        assert!(matches!(err, CatalogError::UnrankedReference { ref reference, .. } if reference == "Somebody (2020)"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_invalid_parallax_dropped() {
        let mut params = StarParams::new();
        params.update_param("parallax", obs(-2.0, "Gaia Data Release 2"), false);
        let report = params.calculated_params();
        assert!(report.dropped_parallax);
        assert!(!params.contains("parallax"));
        assert!(!params.contains("dist"));
        assert_eq!(params.history("parallax").len(), 1);
    }

    #[test]
    fn test_distance_and_position() {
        let mut params = StarParams::new();
        params.update_param("parallax", obs(100.0, "plx"), false);
        params.update_param("raj2000", obs(0.0, "xhip"), false);
        params.update_param("decj2000", obs(90.0, "xhip"), false);
        let report = params.calculated_params();

        assert!(report.distance_from_parallax && report.position);
        assert_relative_eq!(params.value("dist").unwrap(), 10.0);
        assert_eq!(params.curated("dist").unwrap().reference(), "Stellar Calc from parallax:plx");
        assert_relative_eq!(params.value("z_pos").unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(params.value("x_pos").unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gaia_epoch_position_preferred() {
        let mut params = StarParams::new();
        params.update_param("dist", obs(2.0, "d"), false);
        params.update_param("ra_epochj2000", obs(90.0, "gaia"), false);
        params.update_param("dec_epochj2000", obs(0.0, "gaia"), false);
        params.update_param("raj2000", obs(0.0, "xhip"), false);
        params.update_param("decj2000", obs(0.0, "xhip"), false);
        params.calculated_params();
        assert_relative_eq!(params.value("y_pos").unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disk_population() {
        let mut params = StarParams::new();
        params.calculated_params();
        assert_eq!(params.curated("disk").unwrap().value, ParamValue::from("N/A"));
        assert!(!params.contains("disk_num"));

        params.update_param("u_vel", obs(100.0, "v"), false);
        params.update_param("v_vel", obs(-80.0, "v"), false);
        params.update_param("w_vel", obs(70.0, "v"), false);
        assert!(params.calculated_params().disk);
        assert_eq!(params.curated("disk").unwrap().value, ParamValue::from("thick"));
        assert_eq!(params.curated("disk_num").unwrap().value, ParamValue::Integer(1));
    }

    #[test]
    fn test_source_order() {
        let mut identity = CanonicalStar::new("* tau Cet", ["HD 10700"], IdentityOrigin::External);
        identity.ra = Some(26.017);
        identity.dec = Some(-15.937);
        identity.coord_bibcode = Some("2007A&A...474..653V".to_string());
        identity.sptype = Some("G8V".to_string());

        let mut sources = ParamSources::default();
        sources.xhip.insert("raj2000", obs(26.0, "XHIP"));
        sources.pastel.insert("teff", obs(5300.0, "Pastel"));
        sources.xhip.insert("teff", obs(5400.0, "XHIP"));
        sources.nea.insert("mass", obs(0.7, "A ref"));
        sources.nea.insert("mass", obs(0.8, "B ref"));

        let (params, _) = StarParams::from_sources(&identity, &sources).unwrap();
        assert_eq!(params.curated("raj2000").unwrap().reference(), "SIMBAD provided bibcode: 2007A&A...474..653V");
        assert_eq!(params.curated("hmsdms").unwrap().value, ParamValue::from("01h44m04.0800s -15d56m13.200s"));
        assert_relative_eq!(params.value("sptype_num").unwrap(), 28.05);
        assert_eq!(params.value("teff"), Some(5300.0));
        assert_eq!(params.value("mass"), Some(0.8));
    }
}
