/// Milliarcseconds per arcsecond (parallax in mas -> distance in pc)
pub const MAS_PER_ARCSEC: f64 = 1000.0;

/// Decimal places kept for abundance values and normalized results
pub const ABUNDANCE_DECIMALS: i32 = 3;

/// Decimal places kept for plus-minus uncertainties
pub const PLUSMINUS_DECIMALS: i32 = 2;

/// Thin disk velocity dispersions (U, V, W) in km/s, Bensby et al. (2003)
pub const THIN_DISK_SIGMA: [f64; 3] = [35.0, 20.0, 16.0];

/// Thick disk velocity dispersions (U, V, W) in km/s, Bensby et al. (2003)
pub const THICK_DISK_SIGMA: [f64; 3] = [67.0, 38.0, 35.0];

/// Asymmetric drift of the thin disk in km/s
pub const THIN_DISK_V_LAG: f64 = -15.0;

/// Asymmetric drift of the thick disk in km/s
pub const THICK_DISK_V_LAG: f64 = -36.0;

/// Local number density ratio thick/thin, Adibekyan et al. (2013) calibration
pub const THICK_TO_THIN_DENSITY: f64 = 0.18 / 0.82;

/// TD/D probability ratio above which a star is called thick disk
pub const THICK_DISK_RATIO_THRESHOLD: f64 = 10.0;
