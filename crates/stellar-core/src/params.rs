//! Per-star parameter observations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A measured value as reported by a source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value; text is parsed when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One observation of one parameter. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleParam {
    pub value: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_high: Option<f64>,
}

impl SingleParam {
    pub fn new(value: impl Into<ParamValue>) -> Self {
        Self { value: value.into(), units: None, reference: None, err_low: None, err_high: None }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_errors(mut self, err_low: Option<f64>, err_high: Option<f64>) -> Self {
        self.err_low = err_low;
        self.err_high = err_high;
        self
    }

    /// Symmetric error shorthand
    pub fn with_error(self, err: f64) -> Self {
        self.with_errors(Some(-err.abs()), Some(err.abs()))
    }

    pub fn reference(&self) -> &str {
        self.reference.as_deref().unwrap_or("")
    }
}

/// Parameter name to every observation received for it.
///
/// Keys are lowercased on insert and identical observations are stored once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectParams {
    params: BTreeMap<String, Vec<SingleParam>>,
}

impl ObjectParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, param: SingleParam) {
        let entry = self.params.entry(name.to_lowercase()).or_default();
        if !entry.contains(&param) {
            entry.push(param);
        }
    }

    pub fn extend(&mut self, other: ObjectParams) {
        for (name, params) in other.params {
            for param in params {
                self.insert(&name, param);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[SingleParam]> {
        self.params.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SingleParam])> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
