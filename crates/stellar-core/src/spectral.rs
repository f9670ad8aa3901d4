//! Numeric encoding of spectral types for sorting and plotting.

/// Convert a spectral type string such as `"G2V"` to a number.
///
/// Class `F`, `G`, `K`, `M` map to 10, 20, 30, 40; the first digit is added
/// as the subclass and the luminosity class (`I`..`V`) as hundredths.
/// `G2V` becomes `22.05`. Returns `None` for classes outside FGKM.
pub fn spectral_type_to_float(sptype: &str) -> Option<f64> {
    let trimmed = sptype.trim();
    let mut chars = trimmed.chars();
    let base = match chars.next()?.to_ascii_uppercase() {
        'F' => 10.0,
        'G' => 20.0,
        'K' => 30.0,
        'M' => 40.0,
        _ => return None,
    };
    let rest = chars.as_str();

    let subclass = rest
        .chars()
        .find(|c| c.is_ascii_digit())
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0) as f64;

    Some(base + subclass + luminosity_class(rest) as f64 / 100.0)
}

/// First roman-numeral luminosity class in the string, 0 if absent.
fn luminosity_class(rest: &str) -> u32 {
    let start = match rest.find(['I', 'V']) {
        Some(i) => i,
        None => return 0,
    };
    let numeral: String = rest[start..].chars().take_while(|c| matches!(c, 'I' | 'V')).collect();
    // longest prefix that is a luminosity class
    for (text, value) in [("III", 3), ("II", 2), ("IV", 4), ("I", 1), ("V", 5)] {
        if numeral.starts_with(text) {
            return value;
        }
    }
    0
}
