//! The polymorphic product wrapper: a tagged variant over the three container
//! levels with the shared capability set {validate, serialize, deserialize}.
//!
//! Level-specific behavior is composition over this enum rather than an
//! inheritance hierarchy; primitives declare which variants they accept and
//! the engine checks the tags.

use crate::error::DrpError;
use crate::models::header::{Header, ProvenanceEntry};
use crate::models::level0::Level0;
use crate::models::level1::Level1;
use crate::models::level2::Level2;
use crate::models::persist::ProductFile;
use crate::types::DataLevel;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum DataProduct {
    Level0(Level0),
    Level1(Level1),
    Level2(Level2),
}

impl DataProduct {
    pub fn level(&self) -> DataLevel {
        match self {
            Self::Level0(_) => DataLevel::L0,
            Self::Level1(_) => DataLevel::L1,
            Self::Level2(_) => DataLevel::L2,
        }
    }

    /// Reports whether the container satisfies the minimum shape/metadata
    /// contract for its level.
    pub fn validate(&self) -> bool {
        match self {
            Self::Level0(p) => p.validate(),
            Self::Level1(p) => p.validate(),
            Self::Level2(p) => p.validate(),
        }
    }

    pub fn header(&self) -> &Header {
        match self {
            Self::Level0(p) => &p.header,
            Self::Level1(p) => &p.header,
            Self::Level2(p) => &p.header,
        }
    }

    pub fn provenance(&self) -> &[ProvenanceEntry] {
        match self {
            Self::Level0(p) => &p.provenance,
            Self::Level1(p) => &p.provenance,
            Self::Level2(p) => &p.provenance,
        }
    }

    /// Appends a receipt entry. Called by the engine after a successful
    /// execute, so every produced container is traceable to the primitive and
    /// parameters that produced it.
    pub fn push_provenance(&mut self, entry: ProvenanceEntry) {
        match self {
            Self::Level0(p) => p.provenance.push(entry),
            Self::Level1(p) => p.provenance.push(entry),
            Self::Level2(p) => p.provenance.push(entry),
        }
    }

    pub fn as_level0(&self) -> Option<&Level0> {
        match self {
            Self::Level0(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_level1(&self) -> Option<&Level1> {
        match self {
            Self::Level1(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_level2(&self) -> Option<&Level2> {
        match self {
            Self::Level2(p) => Some(p),
            _ => None,
        }
    }

    //==============================================================================
    // Persisted form (whole-product dispatch)
    //==============================================================================

    pub fn to_bytes(&self) -> Result<Vec<u8>, DrpError> {
        let file = match self {
            Self::Level0(p) => p.to_product_file()?,
            Self::Level1(p) => p.to_product_file()?,
            Self::Level2(p) => p.to_product_file()?,
        };
        file.to_bytes()
    }

    /// Deserializes any persisted product, dispatching on the level tag.
    /// Either fully succeeds or fails with `MalformedProduct`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DrpError> {
        let file = ProductFile::from_bytes(bytes)?;
        match file.level {
            DataLevel::L0 => Ok(Self::Level0(Level0::from_product_file(file)?)),
            DataLevel::L1 => Ok(Self::Level1(Level1::from_product_file(file)?)),
            DataLevel::L2 => Ok(Self::Level2(Level2::from_product_file(file)?)),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DrpError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, DrpError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl From<Level0> for DataProduct {
    fn from(p: Level0) -> Self {
        Self::Level0(p)
    }
}
impl From<Level1> for DataProduct {
    fn from(p: Level1) -> Self {
        Self::Level1(p)
    }
}
impl From<Level2> for DataProduct {
    fn from(p: Level2) -> Self {
        Self::Level2(p)
    }
}
