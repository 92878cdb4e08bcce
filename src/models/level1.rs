//! The Level-1 container: extracted 1-D spectra per order/fiber, plus the
//! associated HK-channel product.
//!
//! Orderlets start with a NaN wavelength placeholder; `calibrate_wavelengths`
//! fills it. Level-1 primitives derive successive corrected copies; the
//! engine rebinds the result after each successful step.

use crate::error::DrpError;
use crate::models::header::{Header, ProvenanceEntry};
use crate::models::persist::{ArrayExtension, ProductFile};
use crate::types::DataLevel;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One named (order, fiber) flux/wavelength pair owned by a Level-1
/// container. Never independently persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub order: u32,
    pub fiber: String,
    pub flux: Array1<f64>,
    pub wavelength: Array1<f64>,
}

impl Spectrum {
    /// Creates an orderlet whose wavelength axis is the uncalibrated NaN
    /// placeholder.
    pub fn new_uncalibrated(order: u32, fiber: &str, flux: Array1<f64>) -> Self {
        let wavelength = Array1::from_elem(flux.len(), f64::NAN);
        Self {
            order,
            fiber: fiber.to_string(),
            flux,
            wavelength,
        }
    }

    /// True once every wavelength sample is finite.
    pub fn is_calibrated(&self) -> bool {
        self.wavelength.iter().all(|w| w.is_finite())
    }
}

/// The auxiliary HK-channel spectrum produced at extraction time.
#[derive(Debug, Clone, PartialEq)]
pub struct HkSpectrum {
    pub flux: Array1<f64>,
    pub wavelength: Array1<f64>,
}

/// Container for one extracted exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Level1 {
    pub header: Header,
    pub orderlets: Vec<Spectrum>,
    pub hk: Option<HkSpectrum>,
    pub provenance: Vec<ProvenanceEntry>,
}

/// Per-orderlet scalar descriptors for the metadata block; the flux and
/// wavelength arrays live in extensions `flux:<idx>` / `wave:<idx>`.
#[derive(Serialize, Deserialize)]
struct OrderletMeta {
    order: u32,
    fiber: String,
}

#[derive(Serialize, Deserialize)]
struct Level1Meta {
    header: Header,
    provenance: Vec<ProvenanceEntry>,
    orderlets: Vec<OrderletMeta>,
    has_hk: bool,
}

impl Level1 {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            orderlets: Vec::new(),
            hk: None,
            provenance: Vec::new(),
        }
    }

    /// Minimum shape contract for Level-1: a non-empty orderlet list, every
    /// orderlet with non-empty flux and a wavelength axis of matching length.
    pub fn validate(&self) -> bool {
        !self.orderlets.is_empty()
            && self
                .orderlets
                .iter()
                .all(|o| o.flux.len() > 0 && o.wavelength.len() == o.flux.len())
    }

    /// True once every orderlet carries a finite wavelength solution.
    pub fn wavelengths_calibrated(&self) -> bool {
        self.orderlets.iter().all(|o| o.is_calibrated())
    }

    //==============================================================================
    // Persisted form
    //==============================================================================

    pub fn to_product_file(&self) -> Result<ProductFile, DrpError> {
        let meta = Level1Meta {
            header: self.header.clone(),
            provenance: self.provenance.clone(),
            orderlets: self
                .orderlets
                .iter()
                .map(|o| OrderletMeta {
                    order: o.order,
                    fiber: o.fiber.clone(),
                })
                .collect(),
            has_hk: self.hk.is_some(),
        };

        let mut arrays = BTreeMap::new();
        for (i, orderlet) in self.orderlets.iter().enumerate() {
            arrays.insert(
                format!("flux:{:04}", i),
                ArrayExtension::new(vec![orderlet.flux.len()], orderlet.flux.to_vec())?,
            );
            arrays.insert(
                format!("wave:{:04}", i),
                ArrayExtension::new(vec![orderlet.wavelength.len()], orderlet.wavelength.to_vec())?,
            );
        }
        if let Some(hk) = &self.hk {
            arrays.insert(
                "hk:flux".to_string(),
                ArrayExtension::new(vec![hk.flux.len()], hk.flux.to_vec())?,
            );
            arrays.insert(
                "hk:wave".to_string(),
                ArrayExtension::new(vec![hk.wavelength.len()], hk.wavelength.to_vec())?,
            );
        }

        Ok(ProductFile {
            level: DataLevel::L1,
            meta_json: serde_json::to_string(&meta)?,
            arrays,
        })
    }

    pub fn from_product_file(mut file: ProductFile) -> Result<Self, DrpError> {
        if file.level != DataLevel::L1 {
            return Err(DrpError::MalformedProduct(format!(
                "expected a L1 product, found {}",
                file.level
            )));
        }
        let meta: Level1Meta = serde_json::from_str(&file.meta_json)?;

        let mut orderlets = Vec::with_capacity(meta.orderlets.len());
        for (i, om) in meta.orderlets.iter().enumerate() {
            let flux = file.take_array(&format!("flux:{:04}", i))?;
            let wave = file.take_array(&format!("wave:{:04}", i))?;
            if flux.data.len() != wave.data.len() {
                return Err(DrpError::MalformedProduct(format!(
                    "orderlet {} flux/wavelength length mismatch ({} vs {})",
                    i,
                    flux.data.len(),
                    wave.data.len()
                )));
            }
            orderlets.push(Spectrum {
                order: om.order,
                fiber: om.fiber.clone(),
                flux: Array1::from_vec(flux.data),
                wavelength: Array1::from_vec(wave.data),
            });
        }

        let hk = if meta.has_hk {
            let flux = file.take_array("hk:flux")?;
            let wave = file.take_array("hk:wave")?;
            Some(HkSpectrum {
                flux: Array1::from_vec(flux.data),
                wavelength: Array1::from_vec(wave.data),
            })
        } else {
            None
        };

        if !file.arrays.is_empty() {
            return Err(DrpError::MalformedProduct(format!(
                "L1 product carries {} undeclared array extensions",
                file.arrays.len()
            )));
        }

        Ok(Self {
            header: meta.header,
            orderlets,
            hk,
            provenance: meta.provenance,
        })
    }
}
