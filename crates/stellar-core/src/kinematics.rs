//! Galactic population membership from space velocities.

use std::f64::consts::PI;

use crate::constants::{
    THICK_DISK_RATIO_THRESHOLD, THICK_DISK_SIGMA, THICK_DISK_V_LAG, THICK_TO_THIN_DENSITY,
    THIN_DISK_SIGMA, THIN_DISK_V_LAG,
};

/// Disk population of a star
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskPopulation {
    Thin,
    Thick,
}

impl DiskPopulation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Thin => "thin",
            Self::Thick => "thick",
        }
    }

    /// Numeric code stored as `disk_num`
    pub fn code(&self) -> i64 {
        match self {
            Self::Thin => 0,
            Self::Thick => 1,
        }
    }
}

/// Gaussian velocity ellipsoid probability density
fn ellipsoid_density(uvw: [f64; 3], sigma: [f64; 3], v_lag: f64) -> f64 {
    let k = 1.0 / ((2.0 * PI).powf(1.5) * sigma[0] * sigma[1] * sigma[2]);
    let u = uvw[0].powi(2) / (2.0 * sigma[0].powi(2));
    let v = (uvw[1] - v_lag).powi(2) / (2.0 * sigma[1].powi(2));
    let w = uvw[2].powi(2) / (2.0 * sigma[2].powi(2));
    k * (-u - v - w).exp()
}

/// Relative thick-to-thin disk probability (TD/D) for U, V, W in km/s.
pub fn thick_to_thin_ratio(u: f64, v: f64, w: f64) -> f64 {
    let thin = ellipsoid_density([u, v, w], THIN_DISK_SIGMA, THIN_DISK_V_LAG);
    let thick = ellipsoid_density([u, v, w], THICK_DISK_SIGMA, THICK_DISK_V_LAG);
    THICK_TO_THIN_DENSITY * (thick / thin)
}

pub fn classify_disk(u: f64, v: f64, w: f64) -> DiskPopulation {
    if thick_to_thin_ratio(u, v, w) > THICK_DISK_RATIO_THRESHOLD {
        DiskPopulation::Thick
    } else {
        DiskPopulation::Thin
    }
}
