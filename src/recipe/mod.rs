//! The recipe model: a declarative, ordered description of a reduction run.
//!
//! A recipe names its steps (primitive, input bindings, output binding,
//! parameters) and the final products to persist. Parsing is strict: unknown
//! primitives, unrecognized parameters, and products that no step produces
//! are all rejected before anything executes.

use crate::error::DrpError;
use crate::primitives::PrimitiveRegistry;
use crate::types::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod engine;
#[cfg(test)]
mod engine_tests;

pub use engine::{RecipeEngine, RecipeOutcome, RunReport, StepReport, StepState};

//==================================================================================
// Recipe Model
//==================================================================================

/// One step: run `primitive` on the products bound to `inputs`, bind the
/// result to `output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeStep {
    pub primitive: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub output: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// An optional step that fails leaves its output unbound instead of
    /// aborting the run.
    #[serde(default)]
    pub optional: bool,
}

/// A final product: the binding to persist and the filename to write it
/// under (relative to the configured output directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSpec {
    pub binding: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub products: Vec<ProductSpec>,
}

impl Recipe {
    pub fn from_json(json: &str, registry: &PrimitiveRegistry) -> Result<Self, DrpError> {
        let recipe: Recipe = serde_json::from_str(json)
            .map_err(|e| DrpError::Configuration(format!("invalid recipe JSON: {}", e)))?;
        recipe.validate(registry)?;
        Ok(recipe)
    }

    pub fn from_file(path: &Path, registry: &PrimitiveRegistry) -> Result<Self, DrpError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DrpError::Configuration(format!("cannot read recipe '{}': {}", path.display(), e))
        })?;
        Self::from_json(&json, registry)
    }

    /// Static validation against the primitive registry. Every failure here
    /// is a recipe-authoring mistake, caught before the run starts.
    fn validate(&self, registry: &PrimitiveRegistry) -> Result<(), DrpError> {
        if self.steps.is_empty() {
            return Err(DrpError::Configuration(format!(
                "recipe '{}' has no steps",
                self.name
            )));
        }

        let mut outputs = std::collections::BTreeSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            let primitive = registry.get(&step.primitive).map_err(|_| {
                DrpError::Configuration(format!(
                    "step {} names unknown primitive '{}'",
                    i, step.primitive
                ))
            })?;
            if step.output.is_empty() {
                return Err(DrpError::Configuration(format!(
                    "step {} ('{}') has an empty output binding",
                    i, step.primitive
                )));
            }
            if !outputs.insert(&step.output) {
                return Err(DrpError::Configuration(format!(
                    "step {} rebinds output '{}' already produced by an earlier step",
                    i, step.output
                )));
            }
            if step.inputs.len() != primitive.input_levels().len() {
                return Err(DrpError::Configuration(format!(
                    "step {} ('{}') supplies {} inputs but the primitive takes {}",
                    i,
                    step.primitive,
                    step.inputs.len(),
                    primitive.input_levels().len()
                )));
            }
            // Resolving here surfaces typos and kind mismatches at parse time.
            primitive.param_schema().resolve(&step.params)?;
        }

        for product in &self.products {
            if !self.steps.iter().any(|s| s.output == product.binding) {
                return Err(DrpError::Configuration(format!(
                    "product '{}' references binding '{}' which no step produces",
                    product.filename, product.binding
                )));
            }
        }
        Ok(())
    }
}
