//! Level-2 primitives: radial-velocity measurement from calibrated spectra.

use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, Level2, Measurement, Spectrum};
use crate::primitives::{default_input_check, ParamSchema, Primitive, ResolvedParams};
use crate::primitives::level1::SPEED_OF_LIGHT_MPS;
use crate::types::DataLevel;

/// Flux-weighted centroid shift of one orderlet, expressed as a velocity.
///
/// Samples with non-finite flux or wavelength (masked regions, placeholder
/// pixels) are excluded. Returns NaN when no valid sample remains, so one
/// fully-masked orderlet degrades its own row without failing the exposure.
fn orderlet_rv(spectrum: &Spectrum) -> f64 {
    let mut weight_sum = 0.0;
    let mut weighted_wl = 0.0;
    let mut wl_min = f64::INFINITY;
    let mut wl_max = f64::NEG_INFINITY;

    for (wl, flux) in spectrum.wavelength.iter().zip(spectrum.flux.iter()) {
        if !wl.is_finite() || !flux.is_finite() {
            continue;
        }
        weight_sum += flux;
        weighted_wl += flux * wl;
        wl_min = wl_min.min(*wl);
        wl_max = wl_max.max(*wl);
    }

    if weight_sum <= 0.0 || !wl_min.is_finite() {
        return f64::NAN;
    }
    let centroid = weighted_wl / weight_sum;
    let midpoint = (wl_min + wl_max) / 2.0;
    SPEED_OF_LIGHT_MPS * (centroid - midpoint) / midpoint
}

//==================================================================================
// calculate_rv_from_spectrum
//==================================================================================

/// Measures a per-orderlet radial velocity and the exposure mean.
///
/// Each orderlet contributes one `rv_<fiber>_<order>` row; the finite rows
/// average into `rv_mean`.
pub struct CalculateRvFromSpectrum;

impl Primitive for CalculateRvFromSpectrum {
    fn name(&self) -> &'static str {
        "calculate_rv_from_spectrum"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L1]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L2
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::empty()
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
        _params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let l1 = inputs[0].as_level1().ok_or_else(|| {
            DrpError::Internal("calculate_rv_from_spectrum input slot 0 is not L1".into())
        })?;

        let mut l2 = Level2::new(l1.header.clone());
        l2.provenance = l1.provenance.clone();

        let mut finite_rvs = Vec::new();
        for orderlet in &l1.orderlets {
            let rv = orderlet_rv(orderlet);
            if rv.is_finite() {
                finite_rvs.push(rv);
            }
            l2.append(Measurement {
                name: format!("rv_{}_{:04}", orderlet.fiber, orderlet.order),
                order: Some(orderlet.order),
                value: rv,
            });
        }

        let mean = if finite_rvs.is_empty() {
            f64::NAN
        } else {
            finite_rvs.iter().sum::<f64>() / finite_rvs.len() as f64
        };
        l2.append(Measurement {
            name: "rv_mean".into(),
            order: None,
            value: mean,
        });

        Ok(DataProduct::from(l2))
    }
}
