//! The primitive contract layer.
//!
//! A primitive is a named, stateless processing unit with a declared
//! input/output level contract, a parameter schema, a validation hook, and an
//! execution contract. The recipe engine owns enforcement: the validation
//! hook runs before `execute`, the returned container's level is checked
//! against the declaration, and context bindings are only updated after
//! success.

use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::DataProduct;
use crate::types::{DataLevel, ParamValue};
use std::collections::BTreeMap;

pub use crate::types::ParamKind;

mod ingest;
mod level0;
mod level1;
mod level2;
mod registry;

pub use registry::PrimitiveRegistry;

//==================================================================================
// Parameter Schema
//==================================================================================

/// Declaration of one recognized named parameter: kind, default, and effect.
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// `None` makes the parameter required.
    pub default: Option<ParamValue>,
    pub help: &'static str,
}

/// The full set of parameters a primitive recognizes.
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Merges recipe-supplied parameters over the declared defaults.
    ///
    /// Unknown names, kind mismatches, and missing required parameters are
    /// all `Configuration` errors; a recipe that spells an option wrong must
    /// fail at parse time rather than silently run with the default.
    pub fn resolve(
        &self,
        given: &BTreeMap<String, ParamValue>,
    ) -> Result<ResolvedParams, DrpError> {
        for name in given.keys() {
            if !self.specs.iter().any(|s| s.name == name) {
                return Err(DrpError::Configuration(format!(
                    "unrecognized parameter '{}'",
                    name
                )));
            }
        }

        let mut values = BTreeMap::new();
        for spec in &self.specs {
            match given.get(spec.name) {
                Some(value) => {
                    if !value.matches(spec.kind) {
                        return Err(DrpError::Configuration(format!(
                            "parameter '{}' expects {} but got {:?}",
                            spec.name, spec.kind, value
                        )));
                    }
                    values.insert(spec.name.to_string(), value.clone());
                }
                None => match &spec.default {
                    Some(default) => {
                        values.insert(spec.name.to_string(), default.clone());
                    }
                    None => {
                        return Err(DrpError::Configuration(format!(
                            "missing required parameter '{}'",
                            spec.name
                        )))
                    }
                },
            }
        }
        Ok(ResolvedParams { values })
    }
}

/// The fully resolved parameter set a primitive executes with. Also the exact
/// record written into provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ResolvedParams {
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    fn get(&self, name: &str) -> Result<&ParamValue, DrpError> {
        self.values.get(name).ok_or_else(|| {
            DrpError::Internal(format!("parameter '{}' missing after schema resolution", name))
        })
    }

    pub fn get_f64(&self, name: &str) -> Result<f64, DrpError> {
        self.get(name)?.as_f64().ok_or_else(|| {
            DrpError::Internal(format!("parameter '{}' is not a float", name))
        })
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, DrpError> {
        self.get(name)?.as_i64().ok_or_else(|| {
            DrpError::Internal(format!("parameter '{}' is not an integer", name))
        })
    }

    pub fn get_str(&self, name: &str) -> Result<&str, DrpError> {
        self.get(name)?.as_str().ok_or_else(|| {
            DrpError::Internal(format!("parameter '{}' is not a string", name))
        })
    }

    pub fn get_float_list(&self, name: &str) -> Result<&[f64], DrpError> {
        self.get(name)?.as_float_list().ok_or_else(|| {
            DrpError::Internal(format!("parameter '{}' is not a float list", name))
        })
    }
}

//==================================================================================
// The Primitive Contract
//==================================================================================

/// An atomic, composable processing unit.
///
/// Primitives are pure functions of (input containers, parameters) apart from
/// logging; any state belongs in the execution context or the containers.
pub trait Primitive: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declared input levels, one entry per input slot.
    fn input_levels(&self) -> &'static [DataLevel];

    /// Declared output level. The engine rejects any returned container whose
    /// validated level differs.
    fn output_level(&self) -> DataLevel;

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::empty()
    }

    /// The input-validation hook, invoked by the engine before `execute`.
    ///
    /// The default checks arity, per-slot level, and each container's own
    /// shape contract. Primitives with stronger preconditions (e.g. a
    /// calibrated wavelength axis) override this and keep the base checks.
    fn validate_inputs(&self, inputs: &[&DataProduct]) -> bool {
        default_input_check(self.input_levels(), inputs)
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError>;
}

/// Arity, per-slot level, and container-contract check shared by all
/// primitives.
pub fn default_input_check(levels: &[DataLevel], inputs: &[&DataProduct]) -> bool {
    inputs.len() == levels.len()
        && inputs
            .iter()
            .zip(levels)
            .all(|(product, level)| product.level() == *level && product.validate())
}
