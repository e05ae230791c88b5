use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};

use super::{input_workspace, output_workspace, store_output};

/// Multiplies the counts of every spectrum by `Factor`, or adds it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Scale;

impl Algorithm for Scale {
    fn name(&self) -> &str {
        "Scale"
    }

    fn category(&self) -> &str {
        "Arithmetic"
    }

    fn summary(&self) -> &str {
        "Scales or offsets the counts of a workspace by a constant"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(PropertyDescriptor::input("Factor", ValueType::Float).default(1.0))?;
        schema.declare(
            PropertyDescriptor::input(
                "Operation",
                ValueType::Enum(vec!["Multiply".to_string(), "Add".to_string()]),
            )
            .default("Multiply"),
        )?;
        schema.declare(output_workspace())
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Scale", |args, ctx| {
            let input = args.workspace("InputWorkspace", ctx)?;
            let factor = args.f64("Factor")?;
            let output = match args.str("Operation")? {
                "Multiply" => input.map_spectra(|s| Ok(s.scaled(factor)))?,
                "Add" => input.map_spectra(|s| Ok(s.shifted(factor)))?,
                other => return Err(StepError::Failed(format!("unknown operation '{other}'"))),
            };
            store_output(args, ctx, output)
        })
        .input("InputWorkspace")
        .input("Factor")
        .input("Operation")
        .input("OutputWorkspace")
        .output("OutputWorkspace");

        pipeline.add_step(step)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithm::AlgorithmInstance;
    use crate::core::property::PropertyValue;
    use crate::workspace::{Spectrum, Workspace};
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case("Multiply", vec![4.0, 8.0], vec![2.0, 4.0])]
    #[case("Add", vec![4.0, 6.0], vec![1.0, 2.0])]
    fn test_operations(#[case] operation: &str, #[case] y: Vec<f64>, #[case] e: Vec<f64>) {
        let ctx = ExecutionContext::default();
        let spectrum = Spectrum::new(vec![0.0, 1.0], vec![2.0, 4.0], vec![1.0, 2.0]).unwrap();
        ctx.store().add("in", Workspace::new(vec![spectrum]));

        let mut alg = AlgorithmInstance::new(Arc::new(Scale)).unwrap();
        alg.set_property("InputWorkspace", PropertyValue::Workspace("in".into()))
            .unwrap();
        alg.set_property("Factor", 2.0).unwrap();
        alg.set_property("Operation", operation).unwrap();
        alg.set_property("OutputWorkspace", PropertyValue::Workspace("out".into()))
            .unwrap();
        alg.execute(&ctx).unwrap();

        let out = ctx.store().get("out").unwrap();
        assert_eq!(out.spectrum(0).unwrap().y(), y.as_slice());
        assert_eq!(out.spectrum(0).unwrap().e(), e.as_slice());
    }

    #[test]
    fn test_unknown_operation_is_rejected_on_set() {
        let mut alg = AlgorithmInstance::new(Arc::new(Scale)).unwrap();
        assert!(alg.set_property("Operation", "Divide").is_err());
    }
}
