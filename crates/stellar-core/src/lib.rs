//! Domain types shared by the stellar catalog engine.
//!
//! Nothing in this crate performs I/O: element identifiers, per-star
//! parameter observations, and the small amount of coordinate math needed to
//! derive positions from catalog values.

pub mod constants;
pub mod coordinates;
pub mod elements;
pub mod kinematics;
pub mod params;
pub mod spectral;

pub use coordinates::{format_hmsdms, parallax_to_distance, CartesianPosition, EquatorialPosition};
pub use elements::{ElementId, ElementParseError, IonState};
pub use kinematics::{classify_disk, DiskPopulation};
pub use params::{ObjectParams, ParamValue, SingleParam};
pub use spectral::spectral_type_to_float;

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
