use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Open map of per-detector evidence shown to operators.
pub type Evidence = BTreeMap<String, EvidenceValue>;

/// Scalar-or-small-structure value stored in an [`Evidence`] map.
///
/// Kept as a tagged union rather than raw JSON so the engine has no
/// serializer dependency and the UI schema stays forward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
    Map(BTreeMap<String, EvidenceValue>),
}

impl From<bool> for EvidenceValue {
    fn from(v: bool) -> Self {
        EvidenceValue::Bool(v)
    }
}

impl From<f64> for EvidenceValue {
    fn from(v: f64) -> Self {
        EvidenceValue::Number(v)
    }
}

impl From<f32> for EvidenceValue {
    fn from(v: f32) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<usize> for EvidenceValue {
    fn from(v: usize) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<u32> for EvidenceValue {
    fn from(v: u32) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<i64> for EvidenceValue {
    fn from(v: i64) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<&str> for EvidenceValue {
    fn from(v: &str) -> Self {
        EvidenceValue::Text(v.to_string())
    }
}

impl From<String> for EvidenceValue {
    fn from(v: String) -> Self {
        EvidenceValue::Text(v)
    }
}

impl From<Vec<f64>> for EvidenceValue {
    fn from(v: Vec<f64>) -> Self {
        EvidenceValue::Numbers(v)
    }
}

impl EvidenceValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EvidenceValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EvidenceValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EvidenceValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
