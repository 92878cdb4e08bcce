//! Typed parameter values shared by recipes, primitive parameter schemas, and
//! provenance records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single named-parameter value as it appears in a recipe step.
///
/// The untagged representation lets recipe authors write plain JSON scalars
/// (`3.0`, `"green"`, `true`) without any wrapper objects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A flat list of floats, e.g. wavelength window edges `[lo, hi, lo, hi]`.
    FloatList(Vec<f64>),
}

/// The kind a parameter is declared as in a primitive's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    FloatList,
}

impl ParamValue {
    /// Returns the kind of this value. Integers are accepted where floats are
    /// declared, matching how JSON authors naturally write `3` for `3.0`.
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Bool(_) => ParamKind::Bool,
            Self::Int(_) => ParamKind::Int,
            Self::Float(_) => ParamKind::Float,
            Self::Str(_) => ParamKind::Str,
            Self::FloatList(_) => ParamKind::FloatList,
        }
    }

    /// Checks whether this value satisfies the declared kind.
    pub fn matches(&self, kind: ParamKind) -> bool {
        match (self, kind) {
            (Self::Int(_), ParamKind::Float) => true,
            _ => self.kind() == kind,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            Self::FloatList(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
            Self::FloatList(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
