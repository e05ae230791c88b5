use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError};
use crate::core::property::{PropertyDescriptor, PropertySchema, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::workspace::{rebin, rebin_params};

use super::{input_workspace, output_workspace, rebin_params_validator, store_output};

/// Rebins every spectrum of a histogram workspace onto common bin edges.
///
/// `Params` is `x1, dx1, x2[, dx2, x3 ...]`; a negative width gives logarithmic bins.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rebin;

impl Algorithm for Rebin {
    fn name(&self) -> &str {
        "Rebin"
    }

    fn category(&self) -> &str {
        "Transforms"
    }

    fn summary(&self) -> &str {
        "Rebins every spectrum onto new bin boundaries"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(
            PropertyDescriptor::input("Params", ValueType::FloatArray)
                .validator(rebin_params_validator())
                .doc("Bin boundaries and widths: x1, dx1, x2[, dx2, x3 ...]"),
        )?;
        schema.declare(output_workspace())
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Rebin", |args, ctx| {
            let edges = rebin_params(args.f64_array("Params")?)?;
            let input = args.workspace("InputWorkspace", ctx)?;
            log::trace!("{}: {} new bins", ctx.owner(), edges.len() - 1);
            let output = input.map_spectra(|spectrum| rebin(spectrum, &edges))?;
            store_output(args, ctx, output)
        })
        .input("InputWorkspace")
        .input("Params")
        .input("OutputWorkspace")
        .output("OutputWorkspace");

        pipeline.add_step(step)?;
        Ok(())
    }
}
