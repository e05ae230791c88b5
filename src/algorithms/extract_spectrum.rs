use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError};
use crate::core::property::{PropertyDescriptor, PropertySchema, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::core::validation::InputValidator;
use crate::workspace::Workspace;

use super::{input_workspace, output_workspace, store_output};

/// Copies one spectrum of a workspace into a new single-spectrum workspace.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractSpectrum;

impl Algorithm for ExtractSpectrum {
    fn name(&self) -> &str {
        "ExtractSpectrum"
    }

    fn category(&self) -> &str {
        "Transforms"
    }

    fn summary(&self) -> &str {
        "Extracts a single spectrum from a workspace"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(
            PropertyDescriptor::input("WorkspaceIndex", ValueType::Integer)
                .default(0_i64)
                .validator(Validator::bounded(Some(0.0), None)),
        )?;
        schema.declare(output_workspace())
    }

    fn validate_inputs(&self, validator: &mut InputValidator, ctx: &ExecutionContext) {
        let store = ctx.store().clone();
        validator.custom("index in range", move |schema| {
            let name = schema.get_workspace("InputWorkspace").ok()?;
            let index = schema.get_i64("WorkspaceIndex").ok()?;
            match store.get(name) {
                Ok(ws) if index as usize >= ws.spectrum_count() => Some((
                    "WorkspaceIndex".to_string(),
                    format!("index {index} is out of range for {} spectra", ws.spectrum_count()),
                )),
                Ok(_) => None,
                Err(e) => Some(("InputWorkspace".to_string(), e.to_string())),
            }
        });
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Extract", |args, ctx| {
            let input = args.workspace("InputWorkspace", ctx)?;
            let spectrum = input.spectrum(args.i64("WorkspaceIndex")? as usize)?.clone();
            store_output(args, ctx, Workspace::new(vec![spectrum]).with_unit(input.unit()))
        })
        .input("InputWorkspace")
        .input("WorkspaceIndex")
        .input("OutputWorkspace")
        .output("OutputWorkspace");

        pipeline.add_step(step)?;
        Ok(())
    }
}
