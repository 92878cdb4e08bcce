//! Name-to-primitive resolution.
//!
//! Recipes refer to primitives strictly by name; the registry is the single
//! lookup table the recipe parser and engine resolve against. Hosts may
//! register additional primitives alongside the built-in set.

use crate::error::DrpError;
use crate::primitives::ingest::{LookupCalibration, ReadLevel0, ReadLevel1};
use crate::primitives::level0::{DivideFlat, ExtractSpectrum, SubtractBias};
use crate::primitives::level1::{
    CalibrateWavelengths, CorrectBarycentricVelocity, CorrectTelluricLines,
    RemoveEmissionLineRegions, RemoveSolarRegions,
};
use crate::primitives::level2::CalculateRvFromSpectrum;
use crate::primitives::Primitive;
use std::collections::BTreeMap;

pub struct PrimitiveRegistry {
    map: BTreeMap<&'static str, Box<dyn Primitive>>,
}

impl PrimitiveRegistry {
    pub fn empty() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// The built-in primitive set: ingestion, Level-0 corrections, Level-1
    /// calibration and cleanup, and the Level-2 measurement.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ReadLevel0));
        registry.register(Box::new(ReadLevel1));
        registry.register(Box::new(LookupCalibration));
        registry.register(Box::new(SubtractBias));
        registry.register(Box::new(DivideFlat));
        registry.register(Box::new(ExtractSpectrum));
        registry.register(Box::new(CalibrateWavelengths));
        registry.register(Box::new(CorrectTelluricLines));
        registry.register(Box::new(CorrectBarycentricVelocity));
        registry.register(Box::new(RemoveEmissionLineRegions));
        registry.register(Box::new(RemoveSolarRegions));
        registry.register(Box::new(CalculateRvFromSpectrum));
        registry
    }

    /// Registers a primitive under its declared name, replacing any previous
    /// registration of the same name.
    pub fn register(&mut self, primitive: Box<dyn Primitive>) {
        self.map.insert(primitive.name(), primitive);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Primitive, DrpError> {
        self.map
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| DrpError::Configuration(format!("unknown primitive '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.map.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataLevel;

    #[test]
    fn test_builtin_set_is_complete() {
        let registry = PrimitiveRegistry::builtin();
        let expected = [
            "read_level0",
            "read_level1",
            "lookup_calibration",
            "subtract_bias",
            "divide_flat",
            "extract_spectrum",
            "calibrate_wavelengths",
            "correct_telluric_lines",
            "correct_wavelength_dependent_barycentric_velocity",
            "remove_emission_line_regions",
            "remove_solar_regions",
            "calculate_rv_from_spectrum",
        ];
        for name in expected {
            assert!(registry.get(name).is_ok(), "missing '{}'", name);
        }
        assert_eq!(registry.names().count(), expected.len());
    }

    #[test]
    fn test_unknown_name_is_a_configuration_error() {
        let registry = PrimitiveRegistry::builtin();
        assert!(matches!(
            registry.get("subtract_bais"),
            Err(DrpError::Configuration(_))
        ));
    }

    #[test]
    fn test_levels_never_regress() {
        // A primitive may keep or raise the data level, never lower it.
        let registry = PrimitiveRegistry::builtin();
        for name in registry.names().collect::<Vec<_>>() {
            let p = registry.get(name).unwrap();
            for input in p.input_levels() {
                assert!(
                    p.output_level() as u8 >= *input as u8,
                    "'{}' lowers the data level",
                    name
                );
            }
        }
    }
}
