//! The Level-2 container: derived scalar/array measurements keyed by
//! exposure (per-order and whole-exposure radial velocity).
//!
//! The measurement list is append-only: terminal primitives add rows, nothing
//! removes or rewrites them.

use crate::error::DrpError;
use crate::models::header::{Header, ProvenanceEntry};
use crate::models::persist::{ArrayExtension, ProductFile};
use crate::types::DataLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One derived measurement row.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    /// The spectral order the value refers to, or `None` for whole-exposure
    /// quantities.
    pub order: Option<u32>,
    pub value: f64,
}

/// Container for derived measurements of one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Level2 {
    pub header: Header,
    measurements: Vec<Measurement>,
    pub provenance: Vec<ProvenanceEntry>,
}

/// Measurement values are persisted in the `values` array extension so the
/// metadata block stays free of non-finite floats; the rows here carry the
/// scalar descriptors in matching order.
#[derive(Serialize, Deserialize)]
struct MeasurementMeta {
    name: String,
    order: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct Level2Meta {
    header: Header,
    provenance: Vec<ProvenanceEntry>,
    rows: Vec<MeasurementMeta>,
}

impl Level2 {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            measurements: Vec::new(),
            provenance: Vec::new(),
        }
    }

    /// Appends a measurement row. There is deliberately no removal API.
    pub fn append(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn find(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }

    /// Minimum shape contract for Level-2: at least one measurement row.
    pub fn validate(&self) -> bool {
        !self.measurements.is_empty()
    }

    //==============================================================================
    // Persisted form
    //==============================================================================

    pub fn to_product_file(&self) -> Result<ProductFile, DrpError> {
        let meta = Level2Meta {
            header: self.header.clone(),
            provenance: self.provenance.clone(),
            rows: self
                .measurements
                .iter()
                .map(|m| MeasurementMeta {
                    name: m.name.clone(),
                    order: m.order,
                })
                .collect(),
        };
        let values: Vec<f64> = self.measurements.iter().map(|m| m.value).collect();
        let mut arrays = BTreeMap::new();
        arrays.insert(
            "values".to_string(),
            ArrayExtension::new(vec![values.len()], values)?,
        );
        Ok(ProductFile {
            level: DataLevel::L2,
            meta_json: serde_json::to_string(&meta)?,
            arrays,
        })
    }

    pub fn from_product_file(mut file: ProductFile) -> Result<Self, DrpError> {
        if file.level != DataLevel::L2 {
            return Err(DrpError::MalformedProduct(format!(
                "expected a L2 product, found {}",
                file.level
            )));
        }
        let meta: Level2Meta = serde_json::from_str(&file.meta_json)?;
        let values = file.take_array("values")?;
        if values.data.len() != meta.rows.len() {
            return Err(DrpError::MalformedProduct(format!(
                "measurement rows ({}) and values ({}) disagree",
                meta.rows.len(),
                values.data.len()
            )));
        }
        if !file.arrays.is_empty() {
            return Err(DrpError::MalformedProduct(format!(
                "L2 product carries {} undeclared array extensions",
                file.arrays.len()
            )));
        }
        let measurements = meta
            .rows
            .into_iter()
            .zip(values.data)
            .map(|(row, value)| Measurement {
                name: row.name,
                order: row.order,
                value,
            })
            .collect();
        Ok(Self {
            header: meta.header,
            measurements,
            provenance: meta.provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_level2() -> Level2 {
        let mut l2 = Level2::new(Header::new());
        l2.append(Measurement {
            name: "rv_order_0000".into(),
            order: Some(0),
            value: 12.5,
        });
        l2.append(Measurement {
            name: "rv_mean".into(),
            order: None,
            value: 12.5,
        });
        l2
    }

    #[test]
    fn test_validate_contract() {
        assert!(create_test_level2().validate());
        assert!(!Level2::new(Header::new()).validate());
    }

    #[test]
    fn test_persist_roundtrip() {
        let original = create_test_level2();
        let bytes = original.to_product_file().unwrap().to_bytes().unwrap();
        let reread = Level2::from_product_file(ProductFile::from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(original, reread);
    }

    #[test]
    fn test_row_value_mismatch_is_rejected() {
        let mut file = create_test_level2().to_product_file().unwrap();
        file.arrays.insert(
            "values".into(),
            ArrayExtension::new(vec![1], vec![1.0]).unwrap(),
        );
        assert!(matches!(
            Level2::from_product_file(file),
            Err(DrpError::MalformedProduct(_))
        ));
    }
}
