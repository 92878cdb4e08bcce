//! Level-1 primitives: wavelength calibration and the spectral corrections
//! applied to extracted orderlets.

use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, Level1};
use crate::primitives::{
    default_input_check, ParamKind, ParamSchema, ParamSpec, Primitive, ResolvedParams,
};
use crate::types::{DataLevel, ParamValue};
use ndarray::Array1;

/// Speed of light in m/s, used by the Doppler corrections.
pub const SPEED_OF_LIGHT_MPS: f64 = 299_792_458.0;

fn as_level1<'a>(product: &'a DataProduct, primitive: &str) -> Result<&'a Level1, DrpError> {
    product.as_level1().ok_or_else(|| {
        DrpError::Internal(format!("{} input slot 0 is not L1", primitive))
    })
}

/// Parses a flat `[lo, hi, lo, hi, ...]` window list into ascending pairs.
fn parse_windows(windows: &[f64]) -> Result<Vec<(f64, f64)>, DrpError> {
    if windows.is_empty() || windows.len() % 2 != 0 {
        return Err(DrpError::Configuration(format!(
            "'windows' must be a non-empty flat list of lo/hi pairs, got {} values",
            windows.len()
        )));
    }
    windows
        .chunks_exact(2)
        .map(|pair| {
            if pair[0] < pair[1] {
                Ok((pair[0], pair[1]))
            } else {
                Err(DrpError::Configuration(format!(
                    "window [{}, {}] is not ascending",
                    pair[0], pair[1]
                )))
            }
        })
        .collect()
}

/// NaN-masks every flux sample whose wavelength falls inside a window.
fn mask_windows(l1: &mut Level1, windows: &[(f64, f64)]) {
    for orderlet in &mut l1.orderlets {
        for (wl, flux) in orderlet.wavelength.iter().zip(orderlet.flux.iter_mut()) {
            if windows.iter().any(|(lo, hi)| wl >= lo && wl < hi) {
                *flux = f64::NAN;
            }
        }
    }
}

//==================================================================================
// calibrate_wavelengths
//==================================================================================

/// Assigns a wavelength solution to every orderlet.
///
/// The reference solution partitions `[min_wavelength, max_wavelength]` into
/// one contiguous linear segment per orderlet, in orderlet order. Real
/// wavelength solutions are pluggable behind the same contract.
pub struct CalibrateWavelengths;

impl Primitive for CalibrateWavelengths {
    fn name(&self) -> &'static str {
        "calibrate_wavelengths"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec {
                name: "min_wavelength",
                kind: ParamKind::Float,
                default: Some(ParamValue::Float(4450.0)),
                help: "blue edge of the instrument bandpass in Angstrom",
            },
            ParamSpec {
                name: "max_wavelength",
                kind: ParamKind::Float,
                default: Some(ParamValue::Float(8700.0)),
                help: "red edge of the instrument bandpass in Angstrom",
            },
        ])
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = as_level1(inputs[0], self.name())?;
        let min_wl = params.get_f64("min_wavelength")?;
        let max_wl = params.get_f64("max_wavelength")?;
        if !(min_wl.is_finite() && max_wl.is_finite() && min_wl < max_wl) {
            return Err(DrpError::Configuration(format!(
                "invalid bandpass [{}, {}]",
                min_wl, max_wl
            )));
        }

        let mut out = l1.clone();
        let n_orders = out.orderlets.len() as f64;
        let segment = (max_wl - min_wl) / n_orders;
        for (i, orderlet) in out.orderlets.iter_mut().enumerate() {
            let lo = min_wl + segment * i as f64;
            let hi = lo + segment;
            let n = orderlet.flux.len();
            orderlet.wavelength = if n == 1 {
                Array1::from_elem(1, lo)
            } else {
                Array1::linspace(lo, hi, n)
            };
        }
        Ok(DataProduct::from(out))
    }
}

//==================================================================================
// correct_telluric_lines
//==================================================================================

/// Divides out a Gaussian telluric absorption band.
pub struct CorrectTelluricLines;

impl Primitive for CorrectTelluricLines {
    fn name(&self) -> &'static str {
        "correct_telluric_lines"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec {
                name: "center",
                kind: ParamKind::Float,
                default: Some(ParamValue::Float(7605.0)),
                help: "band center in Angstrom (default: O2 A-band)",
            },
            ParamSpec {
                name: "width",
                kind: ParamKind::Float,
                default: Some(ParamValue::Float(5.0)),
                help: "Gaussian sigma of the band in Angstrom",
            },
            ParamSpec {
                name: "depth",
                kind: ParamKind::Float,
                default: Some(ParamValue::Float(0.1)),
                help: "fractional absorption depth at band center, in [0, 1)",
            },
        ])
    }

    /// Telluric correction is meaningless without a wavelength solution.
    fn validate_inputs(&self, inputs: &[&DataProduct]) -> bool {
        default_input_check(self.input_levels(), inputs)
            && inputs[0]
                .as_level1()
                .is_some_and(|l1| l1.wavelengths_calibrated())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = as_level1(inputs[0], self.name())?;
        let center = params.get_f64("center")?;
        let width = params.get_f64("width")?;
        let depth = params.get_f64("depth")?;
        if !(0.0..1.0).contains(&depth) || width <= 0.0 {
            return Err(DrpError::Configuration(format!(
                "telluric model requires depth in [0, 1) and positive width, got depth={} width={}",
                depth, width
            )));
        }

        let mut out = l1.clone();
        for orderlet in &mut out.orderlets {
            for (wl, flux) in orderlet.wavelength.iter().zip(orderlet.flux.iter_mut()) {
                let z = (wl - center) / width;
                let transmission = 1.0 - depth * (-z * z).exp();
                *flux /= transmission;
            }
        }
        Ok(DataProduct::from(out))
    }
}

//==================================================================================
// correct_wavelength_dependent_barycentric_velocity
//==================================================================================

/// Shifts the wavelength axis into the solar-system barycentric frame by the
/// per-exposure velocity.
pub struct CorrectBarycentricVelocity;

impl Primitive for CorrectBarycentricVelocity {
    fn name(&self) -> &'static str {
        "correct_wavelength_dependent_barycentric_velocity"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "velocity_mps",
            kind: ParamKind::Float,
            default: None,
            help: "barycentric velocity projected on the line of sight, m/s",
        }])
    }

    fn validate_inputs(&self, inputs: &[&DataProduct]) -> bool {
        default_input_check(self.input_levels(), inputs)
            && inputs[0]
                .as_level1()
                .is_some_and(|l1| l1.wavelengths_calibrated())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = as_level1(inputs[0], self.name())?;
        let velocity = params.get_f64("velocity_mps")?;
        if velocity.abs() >= SPEED_OF_LIGHT_MPS {
            return Err(DrpError::Configuration(format!(
                "barycentric velocity {} m/s is unphysical",
                velocity
            )));
        }

        let factor = 1.0 + velocity / SPEED_OF_LIGHT_MPS;
        let mut out = l1.clone();
        for orderlet in &mut out.orderlets {
            orderlet.wavelength.mapv_inplace(|wl| wl * factor);
        }
        Ok(DataProduct::from(out))
    }
}

//==================================================================================
// remove_emission_line_regions / remove_solar_regions
//==================================================================================

/// NaN-masks flux inside caller-supplied wavelength windows (sky emission
/// lines, cosmic-ray regions).
pub struct RemoveEmissionLineRegions;

impl Primitive for RemoveEmissionLineRegions {
    fn name(&self) -> &'static str {
        "remove_emission_line_regions"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "windows",
            kind: ParamKind::FloatList,
            default: None,
            help: "flat list of lo/hi wavelength pairs to mask, Angstrom",
        }])
    }

    fn validate_inputs(&self, inputs: &[&DataProduct]) -> bool {
        default_input_check(self.input_levels(), inputs)
            && inputs[0]
                .as_level1()
                .is_some_and(|l1| l1.wavelengths_calibrated())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = as_level1(inputs[0], self.name())?;
        let windows = parse_windows(params.get_float_list("windows")?)?;
        let mut out = l1.clone();
        mask_windows(&mut out, &windows);
        Ok(DataProduct::from(out))
    }
}

/// NaN-masks the solar activity regions (Ca II H & K by default). Same
/// mechanism as emission-line removal, different default windows.
pub struct RemoveSolarRegions;

impl Primitive for RemoveSolarRegions {
    fn name(&self) -> &'static str {
        "remove_solar_regions"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "windows",
            kind: ParamKind::FloatList,
            default: Some(ParamValue::FloatList(vec![
                3932.7, 3934.7, // Ca II K
                3967.6, 3969.6, // Ca II H
            ])),
            help: "flat list of lo/hi wavelength pairs to mask, Angstrom",
        }])
    }

    fn validate_inputs(&self, inputs: &[&DataProduct]) -> bool {
        default_input_check(self.input_levels(), inputs)
            && inputs[0]
                .as_level1()
                .is_some_and(|l1| l1.wavelengths_calibrated())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = as_level1(inputs[0], self.name())?;
        let windows = parse_windows(params.get_float_list("windows")?)?;
        let mut out = l1.clone();
        mask_windows(&mut out, &windows);
        Ok(DataProduct::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrpConfig;
    use crate::models::{Header, Spectrum};
    use ndarray::array;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("run-test", Arc::new(DrpConfig::default()))
    }

    fn uncalibrated_l1() -> DataProduct {
        let mut l1 = Level1::new(Header::new());
        l1.orderlets
            .push(Spectrum::new_uncalibrated(0, "green", array![1.0, 1.0, 1.0, 1.0]));
        l1.orderlets
            .push(Spectrum::new_uncalibrated(1, "green", array![2.0, 2.0, 2.0, 2.0]));
        DataProduct::from(l1)
    }

    fn calibrated_l1() -> DataProduct {
        let params = CalibrateWavelengths
            .param_schema()
            .resolve(&BTreeMap::new())
            .unwrap();
        let input = uncalibrated_l1();
        CalibrateWavelengths
            .execute(&ctx(), &[&input], &params)
            .unwrap()
    }

    #[test]
    fn test_calibrate_wavelengths_fills_placeholder() {
        let out = calibrated_l1();
        let l1 = out.as_level1().unwrap();
        assert!(l1.wavelengths_calibrated());
        // Orders partition the bandpass in ascending, contiguous segments.
        let o0 = &l1.orderlets[0].wavelength;
        let o1 = &l1.orderlets[1].wavelength;
        assert_eq!(o0[0], 4450.0);
        assert_eq!(o0[o0.len() - 1], 6575.0);
        assert_eq!(o1[0], 6575.0);
        assert_eq!(o1[o1.len() - 1], 8700.0);
    }

    #[test]
    fn test_calibrate_rejects_inverted_bandpass() {
        let mut given = BTreeMap::new();
        given.insert("min_wavelength".to_string(), ParamValue::Float(9000.0));
        let params = CalibrateWavelengths.param_schema().resolve(&given).unwrap();
        let input = uncalibrated_l1();
        assert!(matches!(
            CalibrateWavelengths.execute(&ctx(), &[&input], &params),
            Err(DrpError::Configuration(_))
        ));
    }

    #[test]
    fn test_telluric_gate_requires_calibration() {
        let uncal = uncalibrated_l1();
        assert!(!CorrectTelluricLines.validate_inputs(&[&uncal]));
        let cal = calibrated_l1();
        assert!(CorrectTelluricLines.validate_inputs(&[&cal]));
    }

    #[test]
    fn test_telluric_correction_raises_flux_inside_band() {
        let cal = calibrated_l1();
        let mut given = BTreeMap::new();
        given.insert("center".to_string(), ParamValue::Float(7000.0));
        given.insert("width".to_string(), ParamValue::Float(400.0));
        let params = CorrectTelluricLines.param_schema().resolve(&given).unwrap();
        let out = CorrectTelluricLines.execute(&ctx(), &[&cal], &params).unwrap();

        let before = cal.as_level1().unwrap();
        let after = out.as_level1().unwrap();
        // Order 1 spans the band center; its flux must rise. Samples far from
        // the band are virtually unchanged.
        let (wl, fl_before) = (
            &before.orderlets[1].wavelength,
            &before.orderlets[1].flux,
        );
        let fl_after = &after.orderlets[1].flux;
        for i in 0..wl.len() {
            assert!(fl_after[i] >= fl_before[i]);
        }
        let near_center = wl.iter().position(|w| (w - 7000.0).abs() < 400.0).unwrap();
        assert!(fl_after[near_center] > fl_before[near_center] * 1.01);
    }

    #[test]
    fn test_barycentric_shift_scales_wavelengths() {
        let cal = calibrated_l1();
        let mut given = BTreeMap::new();
        given.insert("velocity_mps".to_string(), ParamValue::Float(30000.0));
        let params = CorrectBarycentricVelocity
            .param_schema()
            .resolve(&given)
            .unwrap();
        let out = CorrectBarycentricVelocity
            .execute(&ctx(), &[&cal], &params)
            .unwrap();

        let factor = 1.0 + 30000.0 / SPEED_OF_LIGHT_MPS;
        let before = &cal.as_level1().unwrap().orderlets[0].wavelength;
        let after = &out.as_level1().unwrap().orderlets[0].wavelength;
        for (b, a) in before.iter().zip(after) {
            assert!((a - b * factor).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unphysical_velocity_is_rejected() {
        let cal = calibrated_l1();
        let mut given = BTreeMap::new();
        given.insert(
            "velocity_mps".to_string(),
            ParamValue::Float(SPEED_OF_LIGHT_MPS * 2.0),
        );
        let params = CorrectBarycentricVelocity
            .param_schema()
            .resolve(&given)
            .unwrap();
        assert!(CorrectBarycentricVelocity
            .execute(&ctx(), &[&cal], &params)
            .is_err());
    }

    #[test]
    fn test_emission_region_masking_sets_nan_inside_window() {
        let cal = calibrated_l1();
        let mut given = BTreeMap::new();
        given.insert(
            "windows".to_string(),
            ParamValue::FloatList(vec![4450.0, 5000.0]),
        );
        let params = RemoveEmissionLineRegions
            .param_schema()
            .resolve(&given)
            .unwrap();
        let out = RemoveEmissionLineRegions
            .execute(&ctx(), &[&cal], &params)
            .unwrap();
        let l1 = out.as_level1().unwrap();
        let o0 = &l1.orderlets[0];
        assert!(o0.flux[0].is_nan()); // 4450.0 falls inside
        assert!(!o0.flux[o0.flux.len() - 1].is_nan()); // 6575.0 does not
        // Other order untouched.
        assert!(l1.orderlets[1].flux.iter().all(|f| !f.is_nan()));
    }

    #[test]
    fn test_odd_window_list_is_rejected() {
        assert!(parse_windows(&[1.0, 2.0, 3.0]).is_err());
        assert!(parse_windows(&[]).is_err());
        assert!(parse_windows(&[5.0, 4.0]).is_err());
        assert_eq!(parse_windows(&[1.0, 2.0]).unwrap(), vec![(1.0, 2.0)]);
    }
}
