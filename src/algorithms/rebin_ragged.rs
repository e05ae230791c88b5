use crate::core::algorithm::{Algorithm, ChildAlgorithmStep};
use crate::core::broadcast::{broadcast, broadcast_with, LengthMismatch};
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError};
use crate::core::property::{PropertyDescriptor, PropertySchema, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::core::validation::{InputValidator, SpectrumCount};
use crate::workspace::{self, Workspace};

use super::{input_workspace, output_workspace, scratch_name, store_output};

/// Rebins each spectrum with its own `XMin`, `XMax` and `Delta`.
///
/// Each array takes 0 values (XMin/XMax default to the spectrum's own range), 1 value
/// shared by every spectrum, or one value per spectrum. Every spectrum is extracted
/// and rebinned by child algorithms, then the results are conjoined in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct RebinRagged;

const PER_SPECTRUM: [&str; 3] = ["XMin", "XMax", "Delta"];

fn expand_error(field: &str) -> impl Fn(LengthMismatch) -> AlgorithmError + '_ {
    move |e| AlgorithmError::invalid(field, e.to_string())
}

impl Algorithm for RebinRagged {
    fn name(&self) -> &str {
        "RebinRagged"
    }

    fn category(&self) -> &str {
        "Transforms"
    }

    fn summary(&self) -> &str {
        "Rebins each spectrum with its own range and bin width"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(
            PropertyDescriptor::input("XMin", ValueType::FloatArray)
                .default(Vec::<f64>::new())
                .validator(Validator::finite_elements())
                .doc("Lower bound per spectrum; the data's own minimum when empty"),
        )?;
        schema.declare(
            PropertyDescriptor::input("XMax", ValueType::FloatArray)
                .default(Vec::<f64>::new())
                .validator(Validator::finite_elements())
                .doc("Upper bound per spectrum; the data's own maximum when empty"),
        )?;
        schema.declare(
            PropertyDescriptor::input("Delta", ValueType::FloatArray)
                .validator(Validator::All(vec![Validator::NonEmpty, Validator::finite_elements()]))
                .doc("Bin width per spectrum; negative for logarithmic bins"),
        )?;
        schema.declare(output_workspace())
    }

    fn validate_inputs(&self, validator: &mut InputValidator, ctx: &ExecutionContext) {
        for array in PER_SPECTRUM {
            validator.per_spectrum(
                array,
                SpectrumCount::FromWorkspace {
                    property: "InputWorkspace".to_string(),
                    store: ctx.store().clone(),
                },
            );
        }
    }

    fn build_pipeline(
        &self,
        properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let input_name = properties.get_workspace("InputWorkspace")?;
        let input = ctx.store().get(input_name)?;
        let n = input.spectrum_count();

        let ranges = (0..n)
            .map(|i| {
                input.x_range(i)?.ok_or_else(|| {
                    AlgorithmError::invalid("InputWorkspace", format!("spectrum {i} has no data"))
                })
            })
            .collect::<Result<Vec<_>, AlgorithmError>>()?;

        let x_min = broadcast_with(properties.get_f64_array("XMin")?, n, |i| ranges[i].0)
            .map_err(expand_error("XMin"))?;
        let x_max = broadcast_with(properties.get_f64_array("XMax")?, n, |i| ranges[i].1)
            .map_err(expand_error("XMax"))?;
        let delta = broadcast(properties.get_f64_array("Delta")?, n, 0.0).map_err(expand_error("Delta"))?;

        for i in 0..n {
            if !(x_min[i].is_finite() && x_max[i].is_finite()) || x_min[i] >= x_max[i] {
                return Err(AlgorithmError::invalid(
                    "XMin",
                    format!("spectrum {i}: XMin ({}) must be less than XMax ({})", x_min[i], x_max[i]),
                ));
            }
            if let Err(e) = workspace::rebin_params(&[x_min[i], delta[i], x_max[i]]) {
                return Err(AlgorithmError::invalid("Delta", format!("spectrum {i}: {e}")));
            }
        }

        let owner = pipeline.owner().to_string();
        for i in 0..n {
            let extracted = format!("ExtractSpectrum_{i}");
            pipeline.add_step(
                PipelineStep::new(&extracted, ChildAlgorithmStep::new("ExtractSpectrum", "OutputWorkspace"))
                    .input("InputWorkspace")
                    .literal("WorkspaceIndex", i as i64)
                    .literal("OutputWorkspace", scratch_name(&owner, &extracted))
                    .intermediate(),
            )?;

            let rebinned = format!("Rebin_{i}");
            pipeline.add_step(
                PipelineStep::new(&rebinned, ChildAlgorithmStep::new("Rebin", "OutputWorkspace"))
                    .from_step("InputWorkspace", &extracted)
                    .literal("Params", vec![x_min[i], delta[i], x_max[i]])
                    .literal("OutputWorkspace", scratch_name(&owner, &rebinned))
                    .intermediate(),
            )?;
        }

        let mut conjoin = PipelineStep::from_fn("Conjoin", move |args, ctx| {
            let parts = (0..n)
                .map(|i| args.workspace(&format!("Spectrum{i}"), ctx))
                .collect::<Result<Vec<_>, _>>()?;
            store_output(args, ctx, Workspace::conjoin(parts.iter().map(|p| p.as_ref())))
        })
        .input("OutputWorkspace")
        .output("OutputWorkspace");
        for i in 0..n {
            conjoin = conjoin.from_step(format!("Spectrum{i}"), format!("Rebin_{i}"));
        }
        pipeline.add_step(conjoin)?;
        Ok(())
    }
}
