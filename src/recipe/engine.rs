//! The recipe engine: sequential step execution with the
//! validate-execute-check-bind contract and fail-fast abort semantics.

use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, ProvenanceEntry};
use crate::primitives::PrimitiveRegistry;
use crate::recipe::{Recipe, RecipeStep};
use crate::run_event;
use std::fmt;

//==================================================================================
// Run Reporting
//==================================================================================

/// Lifecycle of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    /// The step itself failed. A failed optional step leaves the run going.
    Failed,
    /// Never attempted because an earlier non-optional step failed.
    Aborted,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug)]
pub struct StepReport {
    pub index: usize,
    pub primitive: String,
    pub output: String,
    pub state: StepState,
    pub error: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RecipeOutcome {
    Succeeded,
    Aborted { failed_step: usize },
}

/// The full record of one engine run, step by step.
#[derive(Debug)]
pub struct RunReport {
    pub recipe: String,
    pub run_id: String,
    pub steps: Vec<StepReport>,
    pub outcome: RecipeOutcome,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RecipeOutcome::Succeeded
    }
}

//==================================================================================
// Engine
//==================================================================================

/// Executes recipe steps in order against an execution context.
///
/// Per step: validate inputs, execute, check the output against the declared
/// level, stamp provenance, then bind. A failing non-optional step aborts the
/// rest of the run; a failing optional step only leaves its output unbound.
pub struct RecipeEngine<'r> {
    registry: &'r PrimitiveRegistry,
}

impl<'r> RecipeEngine<'r> {
    pub fn new(registry: &'r PrimitiveRegistry) -> Self {
        Self { registry }
    }

    pub fn run(&self, recipe: &Recipe, ctx: &mut ExecutionContext) -> RunReport {
        let mut reports: Vec<StepReport> = recipe
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepReport {
                index: i,
                primitive: s.primitive.clone(),
                output: s.output.clone(),
                state: StepState::Pending,
                error: None,
            })
            .collect();
        let mut outcome = RecipeOutcome::Succeeded;

        run_event!(
            info,
            "event" = "run_started",
            "run_id" = &ctx.run_id,
            "recipe" = &recipe.name,
            "steps" = reports.len()
        );

        for (i, step) in recipe.steps.iter().enumerate() {
            if matches!(outcome, RecipeOutcome::Aborted { .. }) {
                reports[i].state = StepState::Aborted;
                continue;
            }

            reports[i].state = StepState::Running;
            run_event!(
                info,
                "event" = "step_started",
                "run_id" = &ctx.run_id,
                "step" = i,
                "primitive" = &step.primitive
            );

            match self.run_step(step, ctx) {
                Ok(product) => {
                    ctx.bind(&step.output, product);
                    reports[i].state = StepState::Succeeded;
                    run_event!(
                        info,
                        "event" = "step_succeeded",
                        "run_id" = &ctx.run_id,
                        "step" = i,
                        "primitive" = &step.primitive,
                        "output" = &step.output
                    );
                }
                Err(err) => {
                    reports[i].state = StepState::Failed;
                    reports[i].error = Some(err.to_string());
                    let params = describe_params(self.registry, step);
                    let provenance = describe_input_provenance(step, ctx);
                    if step.optional {
                        run_event!(
                            warn,
                            "event" = "optional_step_failed",
                            "run_id" = &ctx.run_id,
                            "step" = i,
                            "primitive" = &step.primitive,
                            "params" = params,
                            "input_provenance" = provenance,
                            "error" = err
                        );
                    } else {
                        run_event!(
                            error,
                            "event" = "step_failed",
                            "run_id" = &ctx.run_id,
                            "step" = i,
                            "primitive" = &step.primitive,
                            "params" = params,
                            "input_provenance" = provenance,
                            "error" = err
                        );
                        outcome = RecipeOutcome::Aborted { failed_step: i };
                    }
                }
            }
        }

        run_event!(
            info,
            "event" = "run_finished",
            "run_id" = &ctx.run_id,
            "recipe" = &recipe.name,
            "outcome" = match &outcome {
                RecipeOutcome::Succeeded => "succeeded".to_string(),
                RecipeOutcome::Aborted { failed_step } =>
                    format!("aborted at step {}", failed_step),
            }
        );

        RunReport {
            recipe: recipe.name.clone(),
            run_id: ctx.run_id.clone(),
            steps: reports,
            outcome,
        }
    }

    /// One step end to end. Bindings are untouched on any error.
    fn run_step(
        &self,
        step: &RecipeStep,
        ctx: &ExecutionContext,
    ) -> Result<DataProduct, DrpError> {
        let primitive = self.registry.get(&step.primitive)?;
        let params = primitive.param_schema().resolve(&step.params)?;

        let inputs: Vec<&DataProduct> = step
            .inputs
            .iter()
            .map(|name| ctx.resolve(name))
            .collect::<Result<_, _>>()?;

        if !primitive.validate_inputs(&inputs) {
            return Err(DrpError::PrimitiveValidation {
                primitive: step.primitive.clone(),
                reason: "input contract violated (level, shape, or calibration state)".into(),
            });
        }

        let mut product = primitive
            .execute(ctx, &inputs, &params)
            .map_err(|e| e.into_execution_failure(&step.primitive))?;

        if product.level() != primitive.output_level() || !product.validate() {
            return Err(DrpError::Internal(format!(
                "primitive '{}' returned a {} product that violates its declared {} contract",
                step.primitive,
                product.level(),
                primitive.output_level()
            )));
        }

        product.push_provenance(ProvenanceEntry {
            primitive: step.primitive.clone(),
            params: params.values().clone(),
        });
        Ok(product)
    }
}

/// The resolved parameter set of a step, rendered for a failure event. Falls
/// back to the raw recipe parameters when resolution itself was the failure.
pub(super) fn describe_params(registry: &PrimitiveRegistry, step: &RecipeStep) -> String {
    let resolved = registry
        .get(&step.primitive)
        .and_then(|p| p.param_schema().resolve(&step.params));
    let pairs: Vec<String> = match &resolved {
        Ok(params) => params
            .values()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect(),
        Err(_) => step
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect(),
    };
    pairs.join(", ")
}

/// The provenance chain of each input binding of a step, rendered for a
/// failure event. Unresolved bindings are reported as such.
pub(super) fn describe_input_provenance(step: &RecipeStep, ctx: &ExecutionContext) -> String {
    step.inputs
        .iter()
        .map(|name| match ctx.resolve(name) {
            Ok(product) => {
                let chain: Vec<&str> = product
                    .provenance()
                    .iter()
                    .map(|e| e.primitive.as_str())
                    .collect();
                format!("{}=[{}]", name, chain.join(" -> "))
            }
            Err(_) => format!("{}=<unbound>", name),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
