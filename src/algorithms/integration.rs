use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::core::validation::InputValidator;
use crate::workspace::{integrate, Spectrum};

use super::{input_workspace, output_workspace, store_output};

/// Sums the counts of each spectrum over `[RangeLower, RangeUpper]`.
///
/// The output has one single-bin histogram per input spectrum. Unset bounds fall
/// back to that spectrum's own x range.
#[derive(Debug, Default, Clone, Copy)]
pub struct Integration;

impl Algorithm for Integration {
    fn name(&self) -> &str {
        "Integration"
    }

    fn category(&self) -> &str {
        "Arithmetic"
    }

    fn summary(&self) -> &str {
        "Integrates the counts of every spectrum over an x range"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(PropertyDescriptor::input("RangeLower", ValueType::Float).optional())?;
        schema.declare(PropertyDescriptor::input("RangeUpper", ValueType::Float).optional())?;
        schema.declare(output_workspace())
    }

    fn validate_inputs(&self, validator: &mut InputValidator, _ctx: &ExecutionContext) {
        validator.ordered("RangeLower", "RangeUpper");
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Integrate", |args, ctx| {
            let input = args.workspace("InputWorkspace", ctx)?;
            let lower = args.get("RangeLower").and_then(|v| v.as_f64());
            let upper = args.get("RangeUpper").and_then(|v| v.as_f64());

            let output = input.map_spectra(|spectrum| {
                let (first, last) = spectrum.x_range().unwrap_or((0.0, 0.0));
                let (lo, hi) = (lower.unwrap_or(first), upper.unwrap_or(last));
                let (sum, error) = integrate(spectrum, lo, hi);
                Spectrum::histogram(vec![lo, hi], vec![sum], vec![error])
            });
            // A bound outside a spectrum's data leaves lo >= hi
            let output = output.map_err(|e| StepError::Failed(format!("empty integration range: {e}")))?;
            store_output(args, ctx, output)
        })
        .input("InputWorkspace")
        .input("RangeLower")
        .input("RangeUpper")
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
    use crate::workspace::Workspace;
    use std::sync::Arc;

    fn setup() -> (ExecutionContext, AlgorithmInstance) {
        let ctx = ExecutionContext::default();
        let spectrum = Spectrum::histogram(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![3.0, 6.0, 9.0],
            vec![1.0, 1.0, 1.0],
        )
        .unwrap();
        ctx.store().add("in", Workspace::new(vec![spectrum]));

        let mut alg = AlgorithmInstance::new(Arc::new(Integration)).unwrap();
        alg.set_property("InputWorkspace", PropertyValue::Workspace("in".into()))
            .unwrap();
        alg.set_property("OutputWorkspace", PropertyValue::Workspace("sum".into()))
            .unwrap();
        (ctx, alg)
    }

    #[test]
    fn test_full_range_by_default() {
        let (ctx, mut alg) = setup();
        alg.execute(&ctx).unwrap();

        let sum = ctx.store().get("sum").unwrap();
        let spectrum = sum.spectrum(0).unwrap();
        assert_eq!(spectrum.x(), &[0.0, 3.0]);
        assert_eq!(spectrum.y(), &[18.0]);
        assert!((spectrum.e()[0] - 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_partial_bins_contribute_their_fraction() {
        let (ctx, mut alg) = setup();
        alg.set_property("RangeLower", 0.5).unwrap();
        alg.set_property("RangeUpper", 2.0).unwrap();
        alg.execute(&ctx).unwrap();

        let sum = ctx.store().get("sum").unwrap();
        assert_eq!(sum.spectrum(0).unwrap().y(), &[7.5]);
    }

    #[test]
    fn test_reversed_range_is_invalid() {
        let (ctx, mut alg) = setup();
        alg.set_property("RangeLower", 2.0).unwrap();
        alg.set_property("RangeUpper", 1.0).unwrap();
        assert!(alg.validate(&ctx).contains("RangeLower"));
    }

    #[test]
    fn test_lower_bound_past_the_data_fails() {
        let (ctx, mut alg) = setup();
        alg.set_property("RangeLower", 5.0).unwrap();
        assert!(matches!(alg.execute(&ctx), Err(AlgorithmError::Pipeline(_))));
    }
}
