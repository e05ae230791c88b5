use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::core::context::ExecutionContext;
use crate::core::error::StepError;
use crate::core::property::PropertyValue;
use crate::core::registry::AlgorithmRegistry;
use crate::workspace::{Workspace, WorkspaceStore};

/// Where a step argument comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A fixed value chosen when the pipeline was built.
    Literal(PropertyValue),
    /// The current value of a property of the owning algorithm.
    Input(String),
    /// The output binding of an earlier step.
    Step(String),
}

/// Resolved arguments handed to a step, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArgs {
    values: BTreeMap<String, PropertyValue>,
}

impl StepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: impl Into<String>, value: PropertyValue) {
        self.values.insert(param.into(), value);
    }

    pub fn get(&self, param: &str) -> Option<&PropertyValue> {
        self.values.get(param)
    }

    pub fn require(&self, param: &str) -> Result<&PropertyValue, StepError> {
        self.get(param)
            .ok_or_else(|| StepError::MissingArgument(param.to_string()))
    }

    pub fn f64(&self, param: &str) -> Result<f64, StepError> {
        self.require(param)?
            .as_f64()
            .ok_or_else(|| wrong_type(param, "a number"))
    }

    pub fn i64(&self, param: &str) -> Result<i64, StepError> {
        self.require(param)?
            .as_i64()
            .ok_or_else(|| wrong_type(param, "an integer"))
    }

    pub fn bool(&self, param: &str) -> Result<bool, StepError> {
        self.require(param)?
            .as_bool()
            .ok_or_else(|| wrong_type(param, "a boolean"))
    }

    pub fn str(&self, param: &str) -> Result<&str, StepError> {
        self.require(param)?
            .as_str()
            .ok_or_else(|| wrong_type(param, "a string"))
    }

    pub fn f64_array(&self, param: &str) -> Result<&[f64], StepError> {
        self.require(param)?
            .as_f64_array()
            .ok_or_else(|| wrong_type(param, "a float array"))
    }

    /// The name of a workspace argument.
    pub fn workspace_name(&self, param: &str) -> Result<&str, StepError> {
        self.require(param)?
            .as_workspace()
            .ok_or_else(|| wrong_type(param, "a workspace"))
    }

    /// A workspace argument resolved through the run's store.
    pub fn workspace(&self, param: &str, ctx: &StepContext<'_>) -> Result<Arc<Workspace>, StepError> {
        Ok(ctx.store().get(self.workspace_name(param)?)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn wrong_type(param: &str, expected: &'static str) -> StepError {
    StepError::WrongArgumentType {
        name: param.to_string(),
        expected,
    }
}

/// What a running step can see: the execution context plus who it is.
pub struct StepContext<'a> {
    execution: &'a ExecutionContext,
    owner: &'a str,
    step: &'a str,
}

impl<'a> StepContext<'a> {
    pub fn new(execution: &'a ExecutionContext, owner: &'a str, step: &'a str) -> Self {
        Self {
            execution,
            owner,
            step,
        }
    }

    pub fn execution(&self) -> &'a ExecutionContext {
        self.execution
    }

    pub fn store(&self) -> &'a WorkspaceStore {
        self.execution.store()
    }

    pub fn config(&self) -> &'a ExecutionConfig {
        self.execution.config()
    }

    pub fn registry(&self) -> &'a AlgorithmRegistry {
        self.execution.registry()
    }

    /// Name of the algorithm whose pipeline this step belongs to.
    pub fn owner(&self) -> &'a str {
        self.owner
    }

    pub fn step(&self) -> &'a str {
        self.step
    }
}

/// The work done by one pipeline step.
pub trait StepLogic: Send + Sync {
    fn execute(&self, args: &StepArgs, ctx: &StepContext<'_>) -> Result<PropertyValue, StepError>;

    /// Discards a value this step produced once it is no longer needed.
    ///
    /// Removes the workspace from the store when the value is a workspace reference.
    fn cleanup(&self, produced: &PropertyValue, ctx: &StepContext<'_>) -> Result<(), StepError> {
        if let PropertyValue::Workspace(name) = produced {
            ctx.store().remove(name)?;
            log::debug!("{}: removed intermediate workspace '{name}'", ctx.step());
        }
        Ok(())
    }
}

type StepFn = dyn Fn(&StepArgs, &StepContext<'_>) -> Result<PropertyValue, StepError> + Send + Sync;

struct FnStep(Box<StepFn>);

impl StepLogic for FnStep {
    fn execute(&self, args: &StepArgs, ctx: &StepContext<'_>) -> Result<PropertyValue, StepError> {
        (self.0)(args, ctx)
    }
}

/// One named unit of work in a [`ChildPipelineRunner`](super::pipeline::ChildPipelineRunner).
pub struct PipelineStep {
    pub name: String,
    pub bindings: BTreeMap<String, Binding>,
    /// The binding name the result is stored under. Defaults to the step name.
    pub output: String,
    /// Intermediate results are discarded at the end of the run instead of returned.
    pub intermediate: bool,
    pub logic: Box<dyn StepLogic>,
}

impl PipelineStep {
    pub fn new<L: StepLogic + 'static>(name: impl Into<String>, logic: L) -> Self {
        let name = name.into();
        Self {
            output: name.clone(),
            name,
            bindings: BTreeMap::new(),
            intermediate: false,
            logic: Box::new(logic),
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StepArgs, &StepContext<'_>) -> Result<PropertyValue, StepError> + Send + Sync + 'static,
    {
        Self::new(name, FnStep(Box::new(f)))
    }

    pub fn bind(mut self, param: impl Into<String>, binding: Binding) -> Self {
        self.bindings.insert(param.into(), binding);
        self
    }

    pub fn literal(self, param: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.bind(param, Binding::Literal(value.into()))
    }

    /// Binds `param` to the owning algorithm's property of the same name.
    pub fn input(self, param: &str) -> Self {
        self.bind(param, Binding::Input(param.to_string()))
    }

    pub fn from_step(self, param: impl Into<String>, binding: impl Into<String>) -> Self {
        self.bind(param, Binding::Step(binding.into()))
    }

    pub fn output(mut self, binding: impl Into<String>) -> Self {
        self.output = binding.into();
        self
    }

    pub fn intermediate(mut self) -> Self {
        self.intermediate = true;
        self
    }

    /// Names of the step bindings this step reads.
    pub fn step_references(&self) -> impl Iterator<Item = &str> {
        self.bindings.values().filter_map(|b| match b {
            Binding::Step(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl std::fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("bindings", &self.bindings)
            .field("output", &self.output)
            .field("intermediate", &self.intermediate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_output_to_name() {
        let step = PipelineStep::from_fn("Rebin_0", |_, _| Ok(PropertyValue::Integer(0)))
            .input("Params")
            .from_step("InputWorkspace", "Extract_0")
            .literal("PreserveEvents", false)
            .intermediate();

        assert_eq!(step.output, "Rebin_0");
        assert!(step.intermediate);
        assert_eq!(step.step_references().collect::<Vec<_>>(), vec!["Extract_0"]);
        assert_eq!(
            step.bindings.get("Params"),
            Some(&Binding::Input("Params".into()))
        );
    }

    #[test]
    fn test_step_args_typed_access() {
        let mut args = StepArgs::new();
        args.insert("Factor", PropertyValue::Float(2.0));
        args.insert("InputWorkspace", PropertyValue::Workspace("ws".into()));

        assert_eq!(args.f64("Factor").unwrap(), 2.0);
        assert_eq!(args.workspace_name("InputWorkspace").unwrap(), "ws");
        assert!(matches!(args.f64("Missing"), Err(StepError::MissingArgument(_))));
        assert!(matches!(
            args.str("Factor"),
            Err(StepError::WrongArgumentType { expected: "a string", .. })
        ));
    }
}
