//! This module defines the canonical, type-safe representation of the
//! reduction stages used throughout the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The reduction stage of a data product.
///
/// This enum replaces the string/integer level tags of ad-hoc pipelines,
/// enabling compile-time checks on the contracts between primitives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataLevel {
    /// Raw detector exposure: 2-D frames per channel plus telemetry tables.
    L0,
    /// Extracted 1-D spectra per order/fiber ("orderlets") plus the HK product.
    L1,
    /// Derived measurements keyed by exposure (e.g. radial velocity).
    L2,
}

impl DataLevel {
    /// The on-disk byte tag for the persisted product format.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::L0 => 0,
            Self::L1 => 1,
            Self::L2 => 2,
        }
    }

    /// Parses the on-disk byte tag back into a level.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::L0),
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            _ => None,
        }
    }
}

/// Provides the canonical string representation for a `DataLevel`.
impl fmt::Display for DataLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
