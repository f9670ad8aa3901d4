use serde::{Deserialize, Serialize};

use crate::constants::MAS_PER_ARCSEC;

/// Heliocentric Cartesian position in parsecs (x toward RA=0 on the equator, z toward the north pole)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartesianPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CartesianPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn to_equatorial(&self) -> EquatorialPosition {
        let dist_pc = self.magnitude();
        let ra = self.y.atan2(self.x).to_degrees().rem_euclid(360.0);
        let dec = if dist_pc > 0.0 { (self.z / dist_pc).asin().to_degrees() } else { 0.0 };
        EquatorialPosition { ra_deg: ra, dec_deg: dec, dist_pc }
    }
}

/// Equatorial coordinates (J2000 degrees) with a distance in parsecs
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquatorialPosition {
    pub ra_deg: f64,   // [0, 360)
    pub dec_deg: f64,  // [-90, 90]
    pub dist_pc: f64,
}

impl EquatorialPosition {
    pub fn new(ra_deg: f64, dec_deg: f64, dist_pc: f64) -> Self {
        Self { ra_deg, dec_deg, dist_pc }
    }

    /// Sexagesimal form, e.g. `01h44m04.0834s -15d56m14.928s`
    pub fn to_hmsdms(&self) -> String {
        format_hmsdms(self.ra_deg, self.dec_deg)
    }

    pub fn to_cartesian(&self) -> CartesianPosition {
        let ra = self.ra_deg.to_radians();
        let dec = self.dec_deg.to_radians();
        let cos_dec = dec.cos();
        CartesianPosition {
            x: self.dist_pc * cos_dec * ra.cos(),
            y: self.dist_pc * cos_dec * ra.sin(),
            z: self.dist_pc * dec.sin(),
        }
    }
}

/// Distance in parsecs from a parallax in milliarcseconds.
///
/// Returns `None` for non-positive or non-finite parallaxes, which have no
/// physical distance.
pub fn parallax_to_distance(parallax_mas: f64) -> Option<f64> {
    if parallax_mas > 0.0 && parallax_mas.is_finite() {
        Some(1.0 / (parallax_mas / MAS_PER_ARCSEC))
    } else {
        None
    }
}

/// RA in hours/minutes/seconds and Dec in degrees/arcmin/arcsec.
pub fn format_hmsdms(ra_deg: f64, dec_deg: f64) -> String {
    // work in integer ten-thousandths of a time second so rounding carries
    let ra_units = (ra_deg.rem_euclid(360.0) / 15.0 * 3600.0 * 1e4).round() as i64 % (24 * 3600 * 10_000);
    let (h, rest) = (ra_units / (3600 * 10_000), ra_units % (3600 * 10_000));
    let (m, s) = (rest / (60 * 10_000), rest % (60 * 10_000));

    let sign = if dec_deg < 0.0 { '-' } else { '+' };
    let dec_units = (dec_deg.abs() * 3600.0 * 1e3).round() as i64;
    let (d, rest) = (dec_units / (3600 * 1000), dec_units % (3600 * 1000));
    let (am, asec) = (rest / (60 * 1000), rest % (60 * 1000));

    format!(
        "{h:02}h{m:02}m{:02}.{:04}s {sign}{d:02}d{am:02}m{:02}.{:03}s",
        s / 10_000,
        s % 10_000,
        asec / 1000,
        asec % 1000
    )
}
