//! The per-run execution context: the variable binding table, the active
//! configuration, and the calibration-registry handle.
//!
//! The context is a single value threaded explicitly through the recipe
//! engine and into each primitive call, never global. One context per run;
//! contexts are never shared across concurrent runs.

use crate::calib::CalibrationRegistry;
use crate::config::DrpConfig;
use crate::error::DrpError;
use crate::models::DataProduct;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct ExecutionContext {
    pub run_id: String,
    pub config: Arc<DrpConfig>,
    bindings: BTreeMap<String, DataProduct>,
    calibrations: Option<Arc<dyn CalibrationRegistry>>,
}

impl ExecutionContext {
    pub fn new(run_id: &str, config: Arc<DrpConfig>) -> Self {
        Self {
            run_id: run_id.to_string(),
            config,
            bindings: BTreeMap::new(),
            calibrations: None,
        }
    }

    pub fn with_calibrations(mut self, registry: Arc<dyn CalibrationRegistry>) -> Self {
        self.calibrations = Some(registry);
        self
    }

    /// Binds a product under a context variable name, replacing any previous
    /// binding. The engine only calls this after a step succeeds.
    pub fn bind(&mut self, name: &str, product: DataProduct) {
        self.bindings.insert(name.to_string(), product);
    }

    /// Resolves a binding strictly by name. An absent name is a
    /// `MissingBinding` error, never a default value.
    pub fn resolve(&self, name: &str) -> Result<&DataProduct, DrpError> {
        self.bindings
            .get(name)
            .ok_or_else(|| DrpError::MissingBinding(name.to_string()))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|k| k.as_str())
    }

    /// The calibration registry, when the host wired one in.
    pub fn calibrations(&self) -> Result<&dyn CalibrationRegistry, DrpError> {
        self.calibrations
            .as_deref()
            .ok_or_else(|| DrpError::Configuration(
                "no calibration registry is configured for this run".into(),
            ))
    }
}
