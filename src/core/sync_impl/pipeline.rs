use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::core::context::ExecutionContext;
use crate::core::error::{PipelineError, StepError};
use crate::core::progress::ProgressReporter;
use crate::core::property::{PropertySchema, PropertyValue};
use crate::core::sync_impl::step::{Binding, PipelineStep, StepArgs, StepContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    /// Executing the step at this index.
    Running(usize),
    Completed,
    /// Terminal. The step at this index failed.
    Failed(usize),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::NotStarted => write!(f, "NotStarted"),
            PipelineState::Running(i) => write!(f, "Running({i})"),
            PipelineState::Completed => write!(f, "Completed"),
            PipelineState::Failed(i) => write!(f, "Failed({i})"),
        }
    }
}

/// Runs the ordered child steps of one algorithm execution.
///
/// Steps only read bindings produced by steps added before them, so the run is a
/// single forward pass. A runner is good for exactly one run.
pub struct ChildPipelineRunner {
    owner: String,
    steps: Vec<PipelineStep>,
    produced: HashSet<String>,
    state: PipelineState,
}

impl ChildPipelineRunner {
    /// `owner` names the algorithm in progress events and logs.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            steps: Vec::new(),
            produced: HashSet::new(),
            state: PipelineState::NotStarted,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Appends a step after checking that everything it reads already exists.
    pub fn add_step(&mut self, step: PipelineStep) -> Result<&mut Self, PipelineError> {
        if self.state != PipelineState::NotStarted {
            return Err(PipelineError::NotRestartable {
                state: self.state.to_string(),
            });
        }

        if let Some(reference) = step.step_references().find(|r| !self.produced.contains(*r)) {
            return Err(PipelineError::InvalidStepOrder {
                step: step.name.clone(),
                reference: reference.to_string(),
            });
        }
        if self.produced.contains(&step.output) {
            return Err(PipelineError::DuplicateBinding {
                step: step.name.clone(),
                binding: step.output.clone(),
            });
        }

        self.produced.insert(step.output.clone());
        self.steps.push(step);
        Ok(self)
    }

    /// Executes every step in order and returns the exported bindings.
    ///
    /// The first failing step aborts the run. Intermediates created so far are then
    /// cleaned up in reverse order and the failure is returned as
    /// [`PipelineError::StepFailed`]. Progress counts one event per step, so the
    /// reporter can only overflow if a step is reported twice; that aborts the
    /// same way with [`PipelineError::Progress`].
    pub fn run(
        &mut self,
        inputs: &PropertySchema,
        ctx: &ExecutionContext,
    ) -> Result<BTreeMap<String, PropertyValue>, PipelineError> {
        if self.state != PipelineState::NotStarted {
            return Err(PipelineError::NotRestartable {
                state: self.state.to_string(),
            });
        }

        let mut reporter = ProgressReporter::new(self.steps.len())
            .with_source(self.owner.clone())
            .with_sink(ctx.progress_sink());
        let mut values: HashMap<String, PropertyValue> = HashMap::new();

        for index in 0..self.steps.len() {
            self.state = PipelineState::Running(index);
            let step = &self.steps[index];
            log::debug!("{}: running step {} '{}'", self.owner, index, step.name);

            let outcome = resolve(step, inputs, &values).and_then(|args| {
                let step_ctx = StepContext::new(ctx, &self.owner, &step.name);
                step.logic.execute(&args, &step_ctx)
            });

            let failure = match outcome {
                Ok(value) => {
                    log::debug!("{}: step '{}' bound {} = {}", self.owner, step.name, step.output, value);
                    values.insert(step.output.clone(), value);
                    match reporter.report(format!("{} finished", step.name)) {
                        Ok(_) => continue,
                        Err(e) => PipelineError::from(e),
                    }
                }
                Err(cause) => PipelineError::StepFailed {
                    step: step.name.clone(),
                    index,
                    cause,
                },
            };

            // Any abort leaves the runner failed with its intermediates removed
            self.state = PipelineState::Failed(index);
            reporter.finish();
            self.cleanup(&values, &[], ctx);
            return Err(failure);
        }

        self.state = PipelineState::Completed;
        reporter.finish();

        let mut exported = BTreeMap::new();
        for step in self.steps.iter().filter(|s| !s.intermediate) {
            if let Some(value) = values.get(&step.output) {
                exported.insert(step.output.clone(), value.clone());
            }
        }
        let keep: Vec<&PropertyValue> = exported.values().collect();
        self.cleanup(&values, &keep, ctx);

        Ok(exported)
    }

    /// Best-effort removal of intermediate results, newest first. Failures are logged.
    fn cleanup(
        &self,
        values: &HashMap<String, PropertyValue>,
        keep: &[&PropertyValue],
        ctx: &ExecutionContext,
    ) {
        if !ctx.config().cleanup_intermediates {
            log::debug!("{}: keeping intermediate results", self.owner);
            return;
        }

        for step in self.steps.iter().rev().filter(|s| s.intermediate) {
            let Some(value) = values.get(&step.output) else {
                continue;
            };
            if keep.contains(&value) {
                continue;
            }
            let step_ctx = StepContext::new(ctx, &self.owner, &step.name);
            if let Err(e) = step.logic.cleanup(value, &step_ctx) {
                log::warn!("{}: cleanup of step '{}' failed: {e}", self.owner, step.name);
            }
        }
    }
}

fn resolve(
    step: &PipelineStep,
    inputs: &PropertySchema,
    values: &HashMap<String, PropertyValue>,
) -> Result<StepArgs, StepError> {
    let mut args = StepArgs::new();
    for (param, binding) in &step.bindings {
        let value = match binding {
            Binding::Literal(value) => Some(value.clone()),
            // Unbound optional inputs are simply absent
            Binding::Input(property) => inputs.try_get(property)?.cloned(),
            Binding::Step(name) => Some(
                values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| StepError::MissingArgument(name.clone()))?,
            ),
        };
        if let Some(value) = value {
            args.insert(param.clone(), value);
        }
    }
    Ok(args)
}
