//! Level-0 primitives: detector-frame corrections and spectral extraction.

use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, HkSpectrum, Level1, Spectrum};
use crate::primitives::{ParamKind, ParamSchema, ParamSpec, Primitive, ResolvedParams};
use crate::types::{DataLevel, ParamValue};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Applies a per-channel binary frame operation, requiring the calibration
/// container to carry every channel of the raw exposure at the same shape.
fn combine_frames(
    raw: &BTreeMap<String, Array2<f64>>,
    cal: &BTreeMap<String, Array2<f64>>,
    op: impl Fn(&Array2<f64>, &Array2<f64>) -> Result<Array2<f64>, DrpError>,
) -> Result<BTreeMap<String, Array2<f64>>, DrpError> {
    let mut out = BTreeMap::new();
    for (channel, frame) in raw {
        let cal_frame = cal.get(channel).ok_or_else(|| {
            DrpError::MalformedProduct(format!(
                "calibration frame is missing channel '{}'",
                channel
            ))
        })?;
        if cal_frame.dim() != frame.dim() {
            return Err(DrpError::MalformedProduct(format!(
                "channel '{}' shape mismatch: raw {:?} vs calibration {:?}",
                channel,
                frame.dim(),
                cal_frame.dim()
            )));
        }
        out.insert(channel.clone(), op(frame, cal_frame)?);
    }
    Ok(out)
}

//==================================================================================
// subtract_bias
//==================================================================================

/// Subtracts a master bias frame from each channel of a raw exposure.
pub struct SubtractBias;

impl Primitive for SubtractBias {
    fn name(&self) -> &'static str {
        "subtract_bias"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L0, DataLevel::L0]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L0
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        _params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let raw = inputs[0].as_level0().ok_or_else(|| {
            DrpError::Internal("subtract_bias input slot 0 is not L0".into())
        })?;
        let bias = inputs[1].as_level0().ok_or_else(|| {
            DrpError::Internal("subtract_bias input slot 1 is not L0".into())
        })?;

        let mut out = raw.clone();
        out.frames = combine_frames(&raw.frames, &bias.frames, |f, b| Ok(f - b))?;
        Ok(DataProduct::from(out))
    }
}

//==================================================================================
// divide_flat
//==================================================================================

/// Divides each channel of an exposure by a master flat frame.
pub struct DivideFlat;

impl Primitive for DivideFlat {
    fn name(&self) -> &'static str {
        "divide_flat"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L0, DataLevel::L0]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L0
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "min_flat",
            kind: ParamKind::Float,
            default: Some(ParamValue::Float(1e-6)),
            help: "flat pixels below this value abort the division (dead-pixel guard)",
        }])
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let raw = inputs[0].as_level0().ok_or_else(|| {
            DrpError::Internal("divide_flat input slot 0 is not L0".into())
        })?;
        let flat = inputs[1].as_level0().ok_or_else(|| {
            DrpError::Internal("divide_flat input slot 1 is not L0".into())
        })?;
        let min_flat = params.get_f64("min_flat")?;

        let mut out = raw.clone();
        out.frames = combine_frames(&raw.frames, &flat.frames, |f, ff| {
            if ff.iter().any(|&v| v < min_flat) {
                return Err(DrpError::MalformedProduct(format!(
                    "flat frame contains pixels below min_flat ({})",
                    min_flat
                )));
            }
            Ok(f / ff)
        })?;
        Ok(DataProduct::from(out))
    }
}

//==================================================================================
// extract_spectrum
//==================================================================================

/// Extracts 1-D orderlets from the 2-D channel frames of a corrected
/// exposure, producing a Level-1 container.
///
/// The reference extraction maps each detector row of a science channel to
/// one orderlet (fiber = channel name, order = row index) with the NaN
/// wavelength placeholder. The frame named by `hk_channel`, when present,
/// collapses column-wise into the auxiliary HK spectrum instead.
pub struct ExtractSpectrum;

impl Primitive for ExtractSpectrum {
    fn name(&self) -> &'static str {
        "extract_spectrum"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L0]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "hk_channel",
            kind: ParamKind::Str,
            default: Some(ParamValue::Str("hk".into())),
            help: "channel treated as the HK spectrometer frame",
        }])
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l0 = inputs[0].as_level0().ok_or_else(|| {
            DrpError::Internal("extract_spectrum input slot 0 is not L0".into())
        })?;
        let hk_channel = params.get_str("hk_channel")?;

        let mut l1 = Level1::new(l0.header.clone());
        l1.provenance = l0.provenance.clone();

        for (channel, frame) in &l0.frames {
            if channel == hk_channel {
                // Column-wise mean over the HK frame rows.
                let ncols = frame.ncols();
                let nrows = frame.nrows() as f64;
                let flux: Array1<f64> = (0..ncols)
                    .map(|c| frame.column(c).sum() / nrows)
                    .collect();
                let wavelength = Array1::from_elem(ncols, f64::NAN);
                l1.hk = Some(HkSpectrum { flux, wavelength });
                continue;
            }
            for (row, flux) in frame.rows().into_iter().enumerate() {
                l1.orderlets.push(Spectrum::new_uncalibrated(
                    row as u32,
                    channel,
                    flux.to_owned(),
                ));
            }
        }

        if l1.orderlets.is_empty() {
            return Err(DrpError::MalformedProduct(
                "exposure has no science channels to extract".into(),
            ));
        }
        Ok(DataProduct::from(l1))
    }
}
