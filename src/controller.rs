//! The pipeline controller: the host-facing entry point that owns a run
//! end to end.
//!
//! The controller loads the recipe, builds the execution context, drives the
//! engine, and places the declared products. Placement is strict: only a
//! fully successful run writes into the canonical output directory; an
//! aborted run's partial products go to the quarantine directory (when one is
//! configured) and nowhere else.

use crate::calib::CalibrationRegistry;
use crate::config::DrpConfig;
use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::primitives::PrimitiveRegistry;
use crate::recipe::{Recipe, RecipeEngine, RunReport};
use crate::run_event;
use std::path::Path;
use std::sync::Arc;

pub struct PipelineController {
    config: Arc<DrpConfig>,
    registry: PrimitiveRegistry,
    calibrations: Option<Arc<dyn CalibrationRegistry>>,
}

impl PipelineController {
    pub fn new(config: DrpConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: PrimitiveRegistry::builtin(),
            calibrations: None,
        }
    }

    pub fn with_calibrations(mut self, registry: Arc<dyn CalibrationRegistry>) -> Self {
        self.calibrations = Some(registry);
        self
    }

    pub fn config(&self) -> &DrpConfig {
        &self.config
    }

    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.registry
    }

    /// Loads, validates, and runs a recipe file.
    pub fn run_recipe_file(&self, path: &Path) -> Result<RunReport, DrpError> {
        let recipe = Recipe::from_file(path, &self.registry)?;
        self.run(&recipe)
    }

    /// Runs a validated recipe and places its declared products.
    pub fn run(&self, recipe: &Recipe) -> Result<RunReport, DrpError> {
        let run_id = format!("{}-{}", recipe.name, std::process::id());
        let mut ctx = ExecutionContext::new(&run_id, Arc::clone(&self.config));
        if let Some(calibrations) = &self.calibrations {
            ctx = ctx.with_calibrations(Arc::clone(calibrations));
        }

        let report = RecipeEngine::new(&self.registry).run(recipe, &mut ctx);

        if report.succeeded() {
            self.place_products(recipe, &ctx, &self.config.output_dir)?;
        } else if let Some(quarantine) = &self.config.quarantine_dir {
            self.place_products(recipe, &ctx, quarantine)?;
        }
        Ok(report)
    }

    /// Writes every declared product whose binding exists into `dir`. Unbound
    /// bindings (outputs lost to failed steps) are skipped.
    fn place_products(
        &self,
        recipe: &Recipe,
        ctx: &ExecutionContext,
        dir: &Path,
    ) -> Result<(), DrpError> {
        if recipe.products.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(dir)?;
        for product in &recipe.products {
            if !ctx.is_bound(&product.binding) {
                continue;
            }
            let path = dir.join(&product.filename);
            ctx.resolve(&product.binding)?.write_to(&path)?;
            run_event!(
                info,
                "event" = "product_written",
                "run_id" = &ctx.run_id,
                "binding" = &product.binding,
                "path" = path.display()
            );
        }
        Ok(())
    }

    /// Process exit code for a finished run: zero only for full success.
    pub fn exit_code(report: &RunReport) -> i32 {
        if report.succeeded() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataProduct, Header, Level0, CARD_DATE_OBS};
    use crate::recipe::RecipeOutcome;
    use ndarray::array;

    fn write_raw(dir: &Path, name: &str) {
        let mut header = Header::new();
        header.set(CARD_DATE_OBS, "2023-02-21");
        let mut l0 = Level0::new(header);
        l0.add_frame("green", array![[11.0, 22.0], [33.0, 44.0]]);
        DataProduct::from(l0).write_to(&dir.join(name)).unwrap();
    }

    fn quicklook_json() -> &'static str {
        r#"{
            "name": "quicklook",
            "steps": [
                { "primitive": "read_level0", "output": "raw",
                  "params": { "path": "exp0001.edrp" } },
                { "primitive": "extract_spectrum", "inputs": ["raw"], "output": "spectra" },
                { "primitive": "calibrate_wavelengths", "inputs": ["spectra"],
                  "output": "calibrated" },
                { "primitive": "calculate_rv_from_spectrum", "inputs": ["calibrated"],
                  "output": "rv" }
            ],
            "products": [ { "binding": "rv", "filename": "rv.edrp" } ]
        }"#
    }

    fn controller_for(root: &Path) -> PipelineController {
        let mut config = DrpConfig::default();
        config.data_dirs.raw = Some(root.join("raw"));
        config.output_dir = root.join("out");
        config.quarantine_dir = Some(root.join("quarantine"));
        PipelineController::new(config)
    }

    #[test]
    fn test_successful_run_places_products_in_output_dir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("raw")).unwrap();
        write_raw(&root.path().join("raw"), "exp0001.edrp");

        let controller = controller_for(root.path());
        let recipe = Recipe::from_json(quicklook_json(), controller.registry()).unwrap();
        let report = controller.run(&recipe).unwrap();

        assert!(report.succeeded());
        assert_eq!(PipelineController::exit_code(&report), 0);
        let rv = DataProduct::read_from(&root.path().join("out/rv.edrp")).unwrap();
        assert!(rv.as_level2().unwrap().find("rv_mean").is_some());
        assert!(!root.path().join("quarantine").exists());
    }

    #[test]
    fn test_aborted_run_quarantines_partials_and_skips_canonical_output() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("raw")).unwrap();
        write_raw(&root.path().join("raw"), "exp0001.edrp");

        // The second read fails (no such file), aborting before the rv step.
        let json = r#"{
            "name": "broken",
            "steps": [
                { "primitive": "read_level0", "output": "raw",
                  "params": { "path": "exp0001.edrp" } },
                { "primitive": "read_level0", "output": "raw2",
                  "params": { "path": "missing.edrp" } },
                { "primitive": "extract_spectrum", "inputs": ["raw"], "output": "spectra" }
            ],
            "products": [
                { "binding": "raw", "filename": "raw.edrp" },
                { "binding": "spectra", "filename": "spectra.edrp" }
            ]
        }"#;

        let controller = controller_for(root.path());
        let recipe = Recipe::from_json(json, controller.registry()).unwrap();
        let report = controller.run(&recipe).unwrap();

        assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 1 });
        assert_eq!(PipelineController::exit_code(&report), 1);
        // Canonical output stays untouched; the bound partial lands in
        // quarantine, the unbound one is skipped.
        assert!(!root.path().join("out").exists());
        assert!(root.path().join("quarantine/raw.edrp").exists());
        assert!(!root.path().join("quarantine/spectra.edrp").exists());
    }

    #[test]
    fn test_rerun_writes_byte_identical_products() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("raw")).unwrap();
        write_raw(&root.path().join("raw"), "exp0001.edrp");

        let controller = controller_for(root.path());
        let recipe = Recipe::from_json(quicklook_json(), controller.registry()).unwrap();

        controller.run(&recipe).unwrap();
        let first = std::fs::read(root.path().join("out/rv.edrp")).unwrap();
        controller.run(&recipe).unwrap();
        let second = std::fs::read(root.path().join("out/rv.edrp")).unwrap();
        assert_eq!(first, second);
    }
}
