use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::core::binder::OutputBinder;
use crate::core::context::{ExecutionContext, ExecutionStatus, HistoryEntry};
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{Direction, PropertySchema, PropertyValue, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, StepArgs, StepContext, StepLogic};
use crate::core::validation::{InputValidator, ValidationResult};

/// A data-reduction algorithm.
///
/// Implementations are stateless: everything an execution needs lives in the
/// property schema and the [`ExecutionContext`].
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32 {
        1
    }

    fn category(&self) -> &str {
        "General"
    }

    fn summary(&self) -> &str {
        ""
    }

    /// Declares every property. Called once per registration or instance.
    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError>;

    /// Adds the cross-property rules checked before each execution.
    fn validate_inputs(&self, _validator: &mut InputValidator, _ctx: &ExecutionContext) {}

    /// Adds the steps of one execution. Output properties are filled from the
    /// exported bindings of the same name.
    fn build_pipeline(
        &self,
        properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError>;
}

/// An algorithm together with its property values: what a host sets up and executes.
pub struct AlgorithmInstance {
    algorithm: Arc<dyn Algorithm>,
    schema: PropertySchema,
    executed: bool,
}

impl AlgorithmInstance {
    /// Initializes a fresh schema for `algorithm`.
    pub fn new(algorithm: Arc<dyn Algorithm>) -> Result<Self, SchemaError> {
        let mut schema = PropertySchema::new();
        algorithm.initialize(&mut schema)?;
        Ok(Self::with_schema(algorithm, schema))
    }

    /// Reuses already initialized declarations.
    pub(crate) fn with_schema(algorithm: Arc<dyn Algorithm>, schema: PropertySchema) -> Self {
        Self {
            algorithm,
            schema,
            executed: false,
        }
    }

    pub fn name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn version(&self) -> u32 {
        self.algorithm.version()
    }

    pub fn algorithm(&self) -> &Arc<dyn Algorithm> {
        &self.algorithm
    }

    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), SchemaError> {
        self.schema.set(name, value)
    }

    /// Sets a property from text, parsed according to its declared type.
    pub fn set_property_str(&mut self, name: &str, text: &str) -> Result<(), SchemaError> {
        let value = self
            .schema
            .descriptor(name)?
            .value_type
            .parse_str(text)
            .map_err(|message| SchemaError::Validator {
                name: name.to_string(),
                message,
            })?;
        self.schema.set(name, value)
    }

    pub fn property(&self, name: &str) -> Result<&PropertyValue, SchemaError> {
        self.schema.get(name)
    }

    /// Checks mandatory properties, then every cross-property rule.
    ///
    /// Output workspace properties count as mandatory: the caller chooses the name.
    pub fn validate(&self, ctx: &ExecutionContext) -> ValidationResult {
        let mut result = ValidationResult::new();
        for name in self.schema.missing_mandatory() {
            result.add_error(name, "Mandatory property is not set");
        }
        for descriptor in self.schema.descriptors() {
            if descriptor.direction == Direction::Output
                && descriptor.value_type == ValueType::Workspace
                && !self.schema.is_bound(&descriptor.name)
            {
                result.add_error(&descriptor.name, "Mandatory property is not set");
            }
        }

        let mut validator = InputValidator::new();
        self.algorithm.validate_inputs(&mut validator, ctx);
        for (field, message) in validator.validate(&self.schema).iter() {
            result.add_error(field, message);
        }
        result
    }

    /// Validates, runs the pipeline and binds the outputs.
    ///
    /// Every validation problem is reported at once as [`AlgorithmError::Invalid`].
    pub fn execute(&mut self, ctx: &ExecutionContext) -> Result<(), AlgorithmError> {
        let name = self.name().to_string();
        let started = Utc::now();
        let timer = Instant::now();
        if ctx.is_child() {
            log::debug!("{name} started (child)");
        } else {
            log::info!("{name} started");
        }

        self.executed = false;
        self.schema.begin_execution();
        let outcome = self.run(ctx);
        self.schema.end_execution();

        let elapsed = timer.elapsed();
        let status = match &outcome {
            Ok(()) => {
                self.executed = true;
                log::info!("{name} successful, Duration {:.2} seconds", elapsed.as_secs_f64());
                ExecutionStatus::Succeeded
            }
            Err(e) => {
                log::error!("Error in execution of algorithm {name}: {e}");
                ExecutionStatus::Failed
            }
        };

        ctx.record_history(&HistoryEntry {
            execution_id: Uuid::new_v4(),
            algorithm: name,
            version: self.version(),
            child: ctx.is_child(),
            started,
            duration_ms: elapsed.as_millis() as u64,
            status,
            properties: self.schema.snapshot(),
        });
        outcome
    }

    /// Executes as a step of another algorithm's pipeline.
    pub fn execute_as_child(&mut self, parent: &ExecutionContext) -> Result<(), AlgorithmError> {
        self.execute(&parent.child())
    }

    fn run(&mut self, ctx: &ExecutionContext) -> Result<(), AlgorithmError> {
        let validation = self.validate(ctx);
        if !validation.is_valid() {
            validation.log_summary(self.name());
            return Err(AlgorithmError::Invalid(validation));
        }

        let mut pipeline = ChildPipelineRunner::new(self.name());
        self.algorithm.build_pipeline(&self.schema, &mut pipeline, ctx)?;
        let results = pipeline.run(&self.schema, ctx)?;
        OutputBinder::bind(results, &mut self.schema)?;
        Ok(())
    }
}

/// A pipeline step that runs a registered algorithm.
///
/// Every step argument is set as the property of the same name. The step result is
/// the child's `output` property.
pub struct ChildAlgorithmStep {
    algorithm: String,
    version: Option<u32>,
    output: String,
}

impl ChildAlgorithmStep {
    pub fn new(algorithm: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            version: None,
            output: output.into(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

impl StepLogic for ChildAlgorithmStep {
    fn execute(&self, args: &StepArgs, ctx: &StepContext<'_>) -> Result<PropertyValue, StepError> {
        let mut child = ctx
            .registry()
            .create(&self.algorithm, self.version)
            .map_err(|e| StepError::Child(Box::new(e.into())))?;
        for (name, value) in args.iter() {
            child.set_property(name, value.clone())?;
        }

        child
            .execute_as_child(ctx.execution())
            .map_err(|e| StepError::Child(Box::new(e)))?;
        Ok(child.property(&self.output)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::property::{PropertyDescriptor, Validator};
    use crate::core::sync_impl::PipelineStep;

    /// Adds `Offset` to `Value`, with an optional `Limit` paired with `Offset`.
    struct AddOffset;

    impl Algorithm for AddOffset {
        fn name(&self) -> &str {
            "AddOffset"
        }

        fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
            schema.declare(PropertyDescriptor::input("Value", ValueType::Float))?;
            schema.declare(
                PropertyDescriptor::input("Offset", ValueType::Float).validator(Validator::bounded(Some(0.0), None)),
            )?;
            schema.declare(PropertyDescriptor::input("Limit", ValueType::Float))?;
            schema.declare(PropertyDescriptor::output("Result", ValueType::Float))?;
            Ok(())
        }

        fn validate_inputs(&self, validator: &mut InputValidator, _ctx: &ExecutionContext) {
            validator.ordered("Offset", "Limit");
        }

        fn build_pipeline(
            &self,
            _properties: &PropertySchema,
            pipeline: &mut ChildPipelineRunner,
            _ctx: &ExecutionContext,
        ) -> Result<(), AlgorithmError> {
            pipeline.add_step(
                PipelineStep::from_fn("add", |args, _| {
                    Ok(PropertyValue::Float(args.f64("Value")? + args.f64("Offset")?))
                })
                .input("Value")
                .input("Offset")
                .output("Result"),
            )?;
            Ok(())
        }
    }

    fn instance() -> AlgorithmInstance {
        AlgorithmInstance::new(Arc::new(AddOffset)).unwrap()
    }

    #[test]
    fn test_execute_binds_outputs() {
        let ctx = ExecutionContext::default();
        let mut alg = instance();
        alg.set_property("Value", 1.5).unwrap();
        alg.set_property_str("Offset", "2").unwrap();

        alg.execute(&ctx).unwrap();
        assert!(alg.is_executed());
        assert_eq!(alg.property("Result").unwrap(), &PropertyValue::Float(3.5));

        // A second execution is a fresh run of the same instance
        alg.set_property("Value", 0.0).unwrap();
        alg.execute(&ctx).unwrap();
        assert_eq!(alg.property("Result").unwrap(), &PropertyValue::Float(2.0));
    }

    #[test]
    fn test_failed_rerun_clears_previous_result() {
        let ctx = ExecutionContext::default();
        let mut alg = instance();
        alg.set_property("Value", 1.0).unwrap();
        alg.set_property("Offset", 1.0).unwrap();
        alg.execute(&ctx).unwrap();
        assert_eq!(alg.property("Result").unwrap(), &PropertyValue::Float(2.0));

        alg.set_property("Limit", 0.5).unwrap();
        assert!(matches!(alg.execute(&ctx), Err(AlgorithmError::Invalid(_))));
        assert!(!alg.is_executed());
        assert!(alg.property("Result").is_err());
    }

    #[test]
    fn test_all_problems_reported_together() {
        let ctx = ExecutionContext::default();
        let mut alg = instance();
        alg.set_property("Offset", 5.0).unwrap();
        alg.set_property("Limit", 1.0).unwrap();

        let result = match alg.execute(&ctx).unwrap_err() {
            AlgorithmError::Invalid(result) => result,
            other => panic!("expected a validation failure, got {other:?}"),
        };
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("Value"), Some("Mandatory property is not set"));
        assert!(result.contains("Offset"));
        assert!(!alg.is_executed());
    }

    #[test]
    fn test_set_property_str_reports_parse_errors() {
        let mut alg = instance();
        assert!(matches!(
            alg.set_property_str("Value", "abc"),
            Err(SchemaError::Validator { .. })
        ));
        assert!(matches!(
            alg.set_property_str("Nope", "1"),
            Err(SchemaError::Unknown(_))
        ));
    }

    #[test]
    fn test_child_algorithm_step() {
        let mut registry = crate::core::registry::AlgorithmRegistry::new();
        registry.register(|| AddOffset).unwrap();
        let ctx = ExecutionContext::new(Arc::new(registry));

        let mut pipeline = ChildPipelineRunner::new("Parent");
        pipeline
            .add_step(
                PipelineStep::new("child", ChildAlgorithmStep::new("AddOffset", "Result"))
                    .literal("Value", 1.0)
                    .literal("Offset", 1.0),
            )
            .unwrap();
        let results = pipeline.run(&PropertySchema::new(), &ctx).unwrap();
        assert_eq!(results.get("child"), Some(&PropertyValue::Float(2.0)));

        let mut failing = ChildPipelineRunner::new("Parent");
        failing
            .add_step(PipelineStep::new("child", ChildAlgorithmStep::new("AddOffset", "Result")))
            .unwrap();
        let err = failing.run(&PropertySchema::new(), &ctx).unwrap_err();
        assert_eq!(err.failed_step(), Some("child"));
    }
}
