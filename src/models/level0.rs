//! The Level-0 container: one raw detector exposure.
//!
//! Holds one 2-D detector frame per channel (e.g. `green`, `red`, `hk`),
//! header metadata, and auxiliary guide/telemetry tables. Created by an
//! ingestion primitive from a raw file and treated as immutable once
//! validated; Level-0 primitives derive corrected copies rather than editing
//! in place.

use crate::error::DrpError;
use crate::models::header::{Header, ProvenanceEntry};
use crate::models::persist::{ArrayExtension, ProductFile};
use crate::types::DataLevel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const FRAME_PREFIX: &str = "frame:";
const TABLE_PREFIX: &str = "table:";

/// An auxiliary guide/telemetry table of named f64 columns. Equal column
/// lengths are not required; telemetry streams sample at different rates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuxTable {
    pub columns: BTreeMap<String, Vec<f64>>,
}

/// Container for one raw exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Level0 {
    pub header: Header,
    pub frames: BTreeMap<String, Array2<f64>>,
    pub tables: BTreeMap<String, AuxTable>,
    pub provenance: Vec<ProvenanceEntry>,
}

/// The JSON metadata block of a persisted Level-0 product. Bulk arrays live
/// in the file's array extensions, keyed `frame:<channel>` and
/// `table:<table>:<column>`.
#[derive(Serialize, Deserialize)]
struct Level0Meta {
    header: Header,
    provenance: Vec<ProvenanceEntry>,
}

impl Level0 {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            frames: BTreeMap::new(),
            tables: BTreeMap::new(),
            provenance: Vec::new(),
        }
    }

    pub fn add_frame(&mut self, channel: &str, frame: Array2<f64>) {
        self.frames.insert(channel.to_string(), frame);
    }

    pub fn frame(&self, channel: &str) -> Option<&Array2<f64>> {
        self.frames.get(channel)
    }

    /// Minimum shape contract for Level-0: at least one channel frame, every
    /// frame non-empty.
    pub fn validate(&self) -> bool {
        !self.frames.is_empty() && self.frames.values().all(|f| f.len() > 0)
    }

    //==============================================================================
    // Persisted form
    //==============================================================================

    pub fn to_product_file(&self) -> Result<ProductFile, DrpError> {
        let meta = Level0Meta {
            header: self.header.clone(),
            provenance: self.provenance.clone(),
        };
        let mut arrays = BTreeMap::new();
        for (channel, frame) in &self.frames {
            let dims = vec![frame.nrows(), frame.ncols()];
            let data: Vec<f64> = frame.iter().copied().collect();
            arrays.insert(
                format!("{}{}", FRAME_PREFIX, channel),
                ArrayExtension::new(dims, data)?,
            );
        }
        for (table, aux) in &self.tables {
            for (column, values) in &aux.columns {
                arrays.insert(
                    format!("{}{}:{}", TABLE_PREFIX, table, column),
                    ArrayExtension::new(vec![values.len()], values.clone())?,
                );
            }
        }
        Ok(ProductFile {
            level: DataLevel::L0,
            meta_json: serde_json::to_string(&meta)?,
            arrays,
        })
    }

    pub fn from_product_file(file: ProductFile) -> Result<Self, DrpError> {
        if file.level != DataLevel::L0 {
            return Err(DrpError::MalformedProduct(format!(
                "expected a L0 product, found {}",
                file.level
            )));
        }
        let meta: Level0Meta = serde_json::from_str(&file.meta_json)?;

        let mut frames = BTreeMap::new();
        let mut tables: BTreeMap<String, AuxTable> = BTreeMap::new();
        for (name, ext) in file.arrays {
            if let Some(channel) = name.strip_prefix(FRAME_PREFIX) {
                if ext.dims.len() != 2 {
                    return Err(DrpError::MalformedProduct(format!(
                        "frame '{}' is not 2-D (dims {:?})",
                        channel, ext.dims
                    )));
                }
                let frame = Array2::from_shape_vec((ext.dims[0], ext.dims[1]), ext.data)
                    .map_err(|e| DrpError::MalformedProduct(e.to_string()))?;
                frames.insert(channel.to_string(), frame);
            } else if let Some(rest) = name.strip_prefix(TABLE_PREFIX) {
                let (table, column) = rest.split_once(':').ok_or_else(|| {
                    DrpError::MalformedProduct(format!("invalid table extension name '{}'", name))
                })?;
                if ext.dims.len() != 1 {
                    return Err(DrpError::MalformedProduct(format!(
                        "table column '{}' is not 1-D",
                        name
                    )));
                }
                tables
                    .entry(table.to_string())
                    .or_default()
                    .columns
                    .insert(column.to_string(), ext.data);
            } else {
                return Err(DrpError::MalformedProduct(format!(
                    "unexpected array extension '{}' in a L0 product",
                    name
                )));
            }
        }

        Ok(Self {
            header: meta.header,
            frames,
            tables,
            provenance: meta.provenance,
        })
    }
}
