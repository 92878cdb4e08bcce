//! Engine-level tests: full reduction chains, the validation gate, abort
//! semantics, and provenance stamping.

use crate::config::DrpConfig;
use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, Header, Level0};
use crate::primitives::{Primitive, PrimitiveRegistry, ResolvedParams};
use crate::recipe::engine::{describe_input_provenance, describe_params};
use crate::recipe::{Recipe, RecipeEngine, RecipeOutcome, RecipeStep, StepState};
use crate::types::{DataLevel, ParamValue};
use ndarray::array;
use std::collections::BTreeMap;
use std::sync::Arc;

fn ctx() -> ExecutionContext {
    ExecutionContext::new("run-test", Arc::new(DrpConfig::default()))
}

fn l0(frame: ndarray::Array2<f64>) -> DataProduct {
    let mut l0 = Level0::new(Header::new());
    l0.add_frame("green", frame);
    DataProduct::from(l0)
}

fn step(primitive: &str, inputs: &[&str], output: &str) -> RecipeStep {
    RecipeStep {
        primitive: primitive.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        output: output.to_string(),
        params: BTreeMap::new(),
        optional: false,
    }
}

fn recipe(name: &str, steps: Vec<RecipeStep>) -> Recipe {
    Recipe {
        name: name.to_string(),
        steps,
        products: Vec::new(),
    }
}

#[test]
fn test_full_reduction_chain_produces_an_rv() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[11.0, 22.0, 33.0], [44.0, 55.0, 66.0]]));
    ctx.bind("bias", l0(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    ctx.bind("flat", l0(array![[2.0, 2.0, 2.0], [2.0, 2.0, 2.0]]));

    let recipe = recipe(
        "reduce",
        vec![
            step("subtract_bias", &["raw", "bias"], "debiased"),
            step("divide_flat", &["debiased", "flat"], "corrected"),
            step("extract_spectrum", &["corrected"], "spectra"),
            step("calibrate_wavelengths", &["spectra"], "calibrated"),
            step("calculate_rv_from_spectrum", &["calibrated"], "rv"),
        ],
    );

    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert!(report.succeeded());
    assert!(report.steps.iter().all(|s| s.state == StepState::Succeeded));

    // Corrections composed elementwise: (raw - bias) / flat.
    let corrected = ctx.resolve("corrected").unwrap().as_level0().unwrap();
    assert_eq!(
        corrected.frame("green").unwrap(),
        array![[5.0, 10.0, 15.0], [20.0, 25.0, 30.0]]
    );

    let rv = ctx.resolve("rv").unwrap().as_level2().unwrap();
    assert!(rv.find("rv_mean").is_some());
    assert!(rv.find("rv_green_0000").is_some());
    assert!(rv.find("rv_green_0001").is_some());
}

#[test]
fn test_validation_gate_blocks_level_mismatch() {
    // calibrate_wavelengths declares an L1 input; handing it the raw L0
    // exposure must fail in validation, before execution.
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[1.0, 2.0]]));

    let recipe = recipe(
        "bad-level",
        vec![step("calibrate_wavelengths", &["raw"], "calibrated")],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 0 });
    assert_eq!(report.steps[0].state, StepState::Failed);
    let error = report.steps[0].error.as_deref().unwrap();
    assert!(error.contains("Input validation failed"), "{}", error);
    assert!(!ctx.is_bound("calibrated"));
}

#[test]
fn test_invalid_container_fails_validation_before_execution() {
    // An L1 container with no orderlets violates its own shape contract, so
    // the step must fail in the validation gate.
    let mut ctx = ctx();
    ctx.bind(
        "spectra",
        DataProduct::from(crate::models::Level1::new(Header::new())),
    );

    let recipe = recipe(
        "empty-l1",
        vec![step("calibrate_wavelengths", &["spectra"], "calibrated")],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 0 });
    assert!(report.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("Input validation failed"));
    assert!(!ctx.is_bound("calibrated"));
}

#[test]
fn test_uncalibrated_spectra_fail_the_telluric_gate() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[1.0, 2.0], [3.0, 4.0]]));

    // extract_spectrum leaves the NaN wavelength placeholder; applying the
    // telluric correction before calibrate_wavelengths must be rejected.
    let recipe = recipe(
        "premature-telluric",
        vec![
            step("extract_spectrum", &["raw"], "spectra"),
            step("correct_telluric_lines", &["spectra"], "cleaned"),
        ],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 1 });
    assert_eq!(report.steps[0].state, StepState::Succeeded);
    assert_eq!(report.steps[1].state, StepState::Failed);
}

#[test]
fn test_missing_binding_aborts_and_skips_the_rest() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[1.0, 2.0]]));

    let recipe = recipe(
        "dangling",
        vec![
            step("subtract_bias", &["raw", "bias"], "debiased"),
            step("extract_spectrum", &["debiased"], "spectra"),
            step("calibrate_wavelengths", &["spectra"], "calibrated"),
        ],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 0 });
    assert!(report.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("Missing binding 'bias'"));
    assert_eq!(report.steps[1].state, StepState::Aborted);
    assert_eq!(report.steps[2].state, StepState::Aborted);
    assert!(!ctx.is_bound("debiased"));
}

#[test]
fn test_failed_optional_step_leaves_output_unbound_and_continues() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[10.0, 20.0], [30.0, 40.0]]));

    let mut optional_step = step("subtract_bias", &["raw", "bias"], "debiased");
    optional_step.optional = true;

    // The rest of the chain works on the raw exposure; only the optional
    // correction is lost.
    let recipe = recipe(
        "optional-bias",
        vec![
            optional_step,
            step("extract_spectrum", &["raw"], "spectra"),
            step("calibrate_wavelengths", &["spectra"], "calibrated"),
        ],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    assert!(report.succeeded());
    assert_eq!(report.steps[0].state, StepState::Failed);
    assert_eq!(report.steps[1].state, StepState::Succeeded);
    assert_eq!(report.steps[2].state, StepState::Succeeded);
    assert!(!ctx.is_bound("debiased"));
    assert!(ctx.is_bound("calibrated"));
}

/// Declares an L1 output but hands back its L0 input unchanged.
struct MislabeledExtraction;

impl Primitive for MislabeledExtraction {
    fn name(&self) -> &'static str {
        "mislabeled_extraction"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L0]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        _params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        Ok(inputs[0].clone())
    }
}

#[test]
fn test_undeclared_output_level_fails_the_step() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[1.0, 2.0]]));

    let mut registry = PrimitiveRegistry::builtin();
    registry.register(Box::new(MislabeledExtraction));

    let recipe = recipe(
        "mislabeled",
        vec![step("mislabeled_extraction", &["raw"], "spectra")],
    );
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);

    // The primitive executed but its output level contradicts the
    // declaration, so the engine fails the step and binds nothing.
    assert_eq!(report.outcome, RecipeOutcome::Aborted { failed_step: 0 });
    assert_eq!(report.steps[0].state, StepState::Failed);
    assert!(report.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("violates its declared"));
    assert!(!ctx.is_bound("spectra"));
}

#[test]
fn test_failure_context_carries_params_and_input_provenance() {
    let mut ctx = ctx();
    let mut raw = Level0::new(Header::new());
    raw.add_frame("green", array![[10.0, 20.0]]);
    let mut raw = DataProduct::from(raw);
    raw.push_provenance(crate::models::ProvenanceEntry::new(
        "read_level0",
        BTreeMap::new(),
    ));
    ctx.bind("raw", raw);

    let mut failing = step("divide_flat", &["raw", "flat"], "corrected");
    failing
        .params
        .insert("min_flat".to_string(), ParamValue::Float(0.5));

    let registry = PrimitiveRegistry::builtin();
    assert_eq!(describe_params(&registry, &failing), "min_flat=0.5");
    assert_eq!(
        describe_input_provenance(&failing, &ctx),
        "raw=[read_level0]; flat=<unbound>"
    );

    // An unresolvable parameter set falls back to the raw recipe values.
    let mut bad = step("divide_flat", &["raw", "flat"], "corrected");
    bad.params
        .insert("min_flta".to_string(), ParamValue::Float(0.5));
    assert_eq!(describe_params(&registry, &bad), "min_flta=0.5");
}

#[test]
fn test_provenance_records_each_step_with_resolved_params() {
    let mut ctx = ctx();
    ctx.bind("raw", l0(array![[10.0, 20.0], [30.0, 40.0]]));
    ctx.bind("flat", l0(array![[2.0, 2.0], [2.0, 2.0]]));

    let recipe = recipe(
        "traced",
        vec![
            step("divide_flat", &["raw", "flat"], "corrected"),
            step("extract_spectrum", &["corrected"], "spectra"),
        ],
    );
    let registry = PrimitiveRegistry::builtin();
    let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);
    assert!(report.succeeded());

    let prov = ctx.resolve("spectra").unwrap().provenance();
    assert_eq!(prov.len(), 2);
    assert_eq!(prov[0].primitive, "divide_flat");
    assert_eq!(prov[1].primitive, "extract_spectrum");
    // Defaults are recorded as the exact values the step ran with.
    assert_eq!(
        prov[0].params.get("min_flat"),
        Some(&ParamValue::Float(1e-6))
    );
    assert_eq!(
        prov[1].params.get("hk_channel"),
        Some(&ParamValue::Str("hk".into()))
    );
}

#[test]
fn test_rerun_with_same_inputs_is_bitwise_identical() {
    let run = || {
        let mut ctx = ctx();
        ctx.bind("raw", l0(array![[11.0, 22.0, 33.0], [44.0, 55.0, 66.0]]));
        ctx.bind("bias", l0(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        let recipe = recipe(
            "repeatable",
            vec![
                step("subtract_bias", &["raw", "bias"], "debiased"),
                step("extract_spectrum", &["debiased"], "spectra"),
                step("calibrate_wavelengths", &["spectra"], "calibrated"),
                step("calculate_rv_from_spectrum", &["calibrated"], "rv"),
            ],
        );
        let registry = PrimitiveRegistry::builtin();
        let report = RecipeEngine::new(&registry).run(&recipe, &mut ctx);
        assert!(report.succeeded());
        ctx.resolve("rv").unwrap().to_bytes().unwrap()
    };

    assert_eq!(run(), run());
}
