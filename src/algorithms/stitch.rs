//! Joins two workspaces that cover neighbouring x ranges.
//!
//! Both sides are rebinned onto common edges, one side is scaled so the integrated
//! counts agree over the overlap, and the overlap bins are averaged.

use crate::core::algorithm::{Algorithm, ChildAlgorithmStep};
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, PropertyValue, Validator, ValueType};
use crate::core::sync_impl::{Binding, ChildPipelineRunner, PipelineStep, StepArgs, StepContext};
use crate::core::validation::InputValidator;
use crate::workspace::{self, Spectrum, Workspace};

use super::{input_workspace, output_workspace, rebin_params_validator, scratch_name, store_output};

#[derive(Debug, Default, Clone, Copy)]
pub struct Stitch;

/// Sum of the counts of every spectrum over `[lo, hi]`.
fn overlap_counts(ws: &Workspace, lo: f64, hi: f64) -> f64 {
    ws.spectra().iter().map(|s| workspace::integrate(s, lo, hi).0).sum()
}

fn scale_factor(args: &StepArgs, ctx: &StepContext<'_>) -> Result<PropertyValue, StepError> {
    if args.bool("UseManualScaleFactor")? {
        return Ok(PropertyValue::Float(args.f64("ManualScaleFactor")?));
    }

    let (lo, hi) = (args.f64("StartOverlap")?, args.f64("EndOverlap")?);
    let lhs = overlap_counts(&*args.workspace("LHS", ctx)?, lo, hi);
    let rhs = overlap_counts(&*args.workspace("RHS", ctx)?, lo, hi);
    let (numerator, denominator) = if args.bool("ScaleRHSWorkspace")? {
        (lhs, rhs)
    } else {
        (rhs, lhs)
    };
    if denominator == 0.0 {
        return Err(StepError::Failed(format!(
            "no counts in the overlap [{lo}, {hi}] of the workspace to scale"
        )));
    }
    let factor = numerator / denominator;
    log::debug!("{}: scale factor {factor}", ctx.owner());
    Ok(PropertyValue::Float(factor))
}

/// Takes low-side bins below the overlap, high-side bins above it and the mean inside.
fn combine_spectra(low: &Spectrum, high: &Spectrum, lo: f64, hi: f64) -> Result<Spectrum, StepError> {
    let mean = workspace::add(low, high)?.scaled(0.5);
    let x = low.x();
    let pick = |i: usize| {
        let centre = if low.is_histogram() {
            0.5 * (x[i] + x[i + 1])
        } else {
            x[i]
        };
        if centre < lo {
            low
        } else if centre > hi {
            high
        } else {
            &mean
        }
    };

    let (y, e): (Vec<f64>, Vec<f64>) = (0..low.len()).map(|i| (pick(i).y()[i], pick(i).e()[i])).unzip();
    Ok(Spectrum::new(x.to_vec(), y, e)?)
}

fn combine(args: &StepArgs, ctx: &StepContext<'_>) -> Result<PropertyValue, StepError> {
    let low = args.workspace("Low", ctx)?;
    let high = args.workspace("High", ctx)?;
    let (lo, hi) = (args.f64("StartOverlap")?, args.f64("EndOverlap")?);

    let spectra = low
        .spectra()
        .iter()
        .zip(high.spectra())
        .map(|(l, h)| combine_spectra(l, h, lo, hi))
        .collect::<Result<Vec<_>, _>>()?;
    store_output(args, ctx, Workspace::new(spectra).with_unit(low.unit()))
}

/// Common bin edges spanning both workspaces, using the first LHS bin width.
fn default_params(lhs: &Workspace, rhs: &Workspace) -> Option<Vec<f64>> {
    let first = lhs.spectrum(0).ok()?;
    let start = first.x_range()?.0;
    let width = first.x().get(1)? - first.x()[0];
    let end = rhs.spectra().iter().filter_map(Spectrum::x_range).map(|r| r.1).reduce(f64::max)?;
    Some(vec![start, width, end])
}

impl Algorithm for Stitch {
    fn name(&self) -> &str {
        "Stitch"
    }

    fn category(&self) -> &str {
        "Reflectometry"
    }

    fn summary(&self) -> &str {
        "Stitches two workspaces together over their overlap"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("LHSWorkspace").doc("Workspace covering the lower x range"))?;
        schema.declare(input_workspace("RHSWorkspace").doc("Workspace covering the upper x range"))?;
        schema.declare(
            PropertyDescriptor::input("StartOverlap", ValueType::Float)
                .optional()
                .validator(Validator::finite())
                .doc("Start of the overlap; the lowest RHS x when unset"),
        )?;
        schema.declare(
            PropertyDescriptor::input("EndOverlap", ValueType::Float)
                .optional()
                .validator(Validator::finite())
                .doc("End of the overlap; the highest LHS x when unset"),
        )?;
        schema.declare(
            PropertyDescriptor::input("Params", ValueType::FloatArray)
                .optional()
                .validator(rebin_params_validator())
                .doc("Rebinning for both sides; spans both with the LHS bin width when unset"),
        )?;
        schema.declare(PropertyDescriptor::input("ScaleRHSWorkspace", ValueType::Boolean).default(true))?;
        schema.declare(PropertyDescriptor::input("UseManualScaleFactor", ValueType::Boolean).default(false))?;
        schema.declare(
            PropertyDescriptor::input("ManualScaleFactor", ValueType::Float)
                .default(1.0)
                .validator(Validator::finite()),
        )?;
        schema.declare(output_workspace())?;
        schema.declare(PropertyDescriptor::output("OutScaleFactor", ValueType::Float).doc("The factor applied"))
    }

    fn validate_inputs(&self, validator: &mut InputValidator, ctx: &ExecutionContext) {
        let store = ctx.store().clone();
        validator
            .paired("StartOverlap", "EndOverlap")
            .ordered("StartOverlap", "EndOverlap")
            .custom("matching spectra", move |schema| {
                let count = |property: &str| {
                    let name = schema.get_workspace(property).ok()?;
                    store.get(name).ok().map(|ws| ws.spectrum_count())
                };
                let (lhs, rhs) = (count("LHSWorkspace")?, count("RHSWorkspace")?);
                (lhs != rhs).then(|| {
                    (
                        "RHSWorkspace".to_string(),
                        format!("has {rhs} spectra, LHSWorkspace has {lhs}"),
                    )
                })
            });
    }

    fn build_pipeline(
        &self,
        properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let lhs = ctx.store().get(properties.get_workspace("LHSWorkspace")?)?;
        let rhs = ctx.store().get(properties.get_workspace("RHSWorkspace")?)?;

        let start = match properties.try_get("StartOverlap")?.and_then(PropertyValue::as_f64) {
            Some(start) => start,
            None => rhs
                .spectra()
                .iter()
                .filter_map(Spectrum::x_range)
                .map(|r| r.0)
                .reduce(f64::min)
                .ok_or_else(|| AlgorithmError::invalid("RHSWorkspace", "workspace holds no data"))?,
        };
        let end = match properties.try_get("EndOverlap")?.and_then(PropertyValue::as_f64) {
            Some(end) => end,
            None => lhs
                .spectra()
                .iter()
                .filter_map(Spectrum::x_range)
                .map(|r| r.1)
                .reduce(f64::max)
                .ok_or_else(|| AlgorithmError::invalid("LHSWorkspace", "workspace holds no data"))?,
        };
        if !(start.is_finite() && end.is_finite()) || start >= end {
            return Err(AlgorithmError::invalid(
                "StartOverlap",
                format!("the workspaces do not overlap ({start} >= {end})"),
            ));
        }

        let params = match properties.try_get("Params")?.and_then(PropertyValue::as_f64_array) {
            Some(params) => params.to_vec(),
            None => default_params(&*lhs, &*rhs)
                .ok_or_else(|| AlgorithmError::invalid("Params", "cannot derive binning from LHSWorkspace"))?,
        };
        if let Err(e) = workspace::rebin_params(&params) {
            return Err(AlgorithmError::invalid("Params", e.to_string()));
        }
        log::debug!("Stitch: overlap [{start}, {end}], params {params:?}");

        let owner = pipeline.owner().to_string();
        for (side, property) in [("LHS", "LHSWorkspace"), ("RHS", "RHSWorkspace")] {
            let step = format!("Rebin{side}");
            pipeline.add_step(
                PipelineStep::new(&step, ChildAlgorithmStep::new("Rebin", "OutputWorkspace"))
                    .bind("InputWorkspace", Binding::Input(property.to_string()))
                    .literal("Params", params.clone())
                    .literal("OutputWorkspace", scratch_name(&owner, &step))
                    .intermediate(),
            )?;
        }

        pipeline.add_step(
            PipelineStep::from_fn("ScaleFactor", scale_factor)
                .from_step("LHS", "RebinLHS")
                .from_step("RHS", "RebinRHS")
                .literal("StartOverlap", start)
                .literal("EndOverlap", end)
                .input("ScaleRHSWorkspace")
                .input("UseManualScaleFactor")
                .input("ManualScaleFactor")
                .output("OutScaleFactor"),
        )?;

        let scale_rhs = properties.get_bool("ScaleRHSWorkspace")?;
        let scaled_side = if scale_rhs { "RebinRHS" } else { "RebinLHS" };
        pipeline.add_step(
            PipelineStep::new("Scale", ChildAlgorithmStep::new("Scale", "OutputWorkspace"))
                .from_step("InputWorkspace", scaled_side)
                .from_step("Factor", "OutScaleFactor")
                .literal("OutputWorkspace", scratch_name(&owner, "Scale"))
                .intermediate(),
        )?;

        let (low, high) = if scale_rhs {
            ("RebinLHS", "Scale")
        } else {
            ("Scale", "RebinRHS")
        };
        pipeline.add_step(
            PipelineStep::from_fn("Combine", combine)
                .from_step("Low", low)
                .from_step("High", high)
                .literal("StartOverlap", start)
                .literal("EndOverlap", end)
                .input("OutputWorkspace")
                .output("OutputWorkspace"),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithm::AlgorithmInstance;
    use crate::core::registry::AlgorithmRegistry;
    use std::sync::Arc;

    fn flat(edges: std::ops::Range<i32>, count: f64) -> Workspace {
        let x: Vec<f64> = edges.map(f64::from).collect();
        let n = x.len() - 1;
        Workspace::new(vec![Spectrum::histogram(x, vec![count; n], vec![count.sqrt(); n]).unwrap()])
    }

    fn setup() -> (ExecutionContext, AlgorithmInstance) {
        let ctx = ExecutionContext::new(Arc::new(AlgorithmRegistry::with_builtins().unwrap()));
        ctx.store().add("low_q", flat(0..9, 4.0));
        ctx.store().add("high_q", flat(5..13, 2.0));

        let mut alg = AlgorithmInstance::new(Arc::new(Stitch)).unwrap();
        alg.set_property("LHSWorkspace", PropertyValue::Workspace("low_q".into()))
            .unwrap();
        alg.set_property("RHSWorkspace", PropertyValue::Workspace("high_q".into()))
            .unwrap();
        alg.set_property("OutputWorkspace", PropertyValue::Workspace("stitched".into()))
            .unwrap();
        (ctx, alg)
    }

    #[test]
    fn test_rhs_is_scaled_onto_lhs() {
        let (ctx, mut alg) = setup();
        alg.execute(&ctx).unwrap();

        assert_eq!(alg.property("OutScaleFactor").unwrap(), &PropertyValue::Float(2.0));
        let stitched = ctx.store().get("stitched").unwrap();
        let spectrum = stitched.spectrum(0).unwrap();
        assert_eq!(spectrum.x_range(), Some((0.0, 12.0)));
        assert!(spectrum.y().iter().all(|y| (y - 4.0).abs() < 1e-12));
        assert_eq!(ctx.store().names(), vec!["high_q", "low_q", "stitched"]);
    }

    #[test]
    fn test_manual_factor_scaling_the_lhs() {
        let (ctx, mut alg) = setup();
        alg.set_property("ScaleRHSWorkspace", false).unwrap();
        alg.set_property("UseManualScaleFactor", true).unwrap();
        alg.set_property("ManualScaleFactor", 0.5).unwrap();
        alg.execute(&ctx).unwrap();

        assert_eq!(alg.property("OutScaleFactor").unwrap(), &PropertyValue::Float(0.5));
        let stitched = ctx.store().get("stitched").unwrap();
        assert!(stitched.spectrum(0).unwrap().y().iter().all(|y| (y - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_overlap_must_be_paired_and_ordered() {
        let (ctx, mut alg) = setup();
        alg.set_property("StartOverlap", 7.0).unwrap();
        let result = alg.validate(&ctx);
        assert_eq!(result.get("EndOverlap"), Some("must be set together with StartOverlap"));

        alg.set_property("EndOverlap", 6.0).unwrap();
        let result = alg.validate(&ctx);
        assert!(result.contains("StartOverlap"));
        assert!(!result.contains("EndOverlap"));
    }

    #[test]
    fn test_spectrum_counts_must_match() {
        let (ctx, alg) = setup();
        ctx.store().add("high_q", Workspace::conjoin([&flat(5..13, 2.0), &flat(5..13, 2.0)]));
        assert!(alg.validate(&ctx).contains("RHSWorkspace"));
    }

    #[test]
    fn test_non_finite_inputs_are_refused() {
        let (_, mut alg) = setup();
        assert!(alg.set_property("StartOverlap", f64::NAN).is_err());
        assert!(alg.set_property("ManualScaleFactor", f64::INFINITY).is_err());
        assert!(alg.set_property("Params", vec![0.0, f64::NAN, 12.0]).is_err());
        assert!(alg.set_property("Params", vec![1e17, 1.0, 1e17 + 1024.0]).is_err());
    }

    #[test]
    fn test_unusable_derived_binning_is_invalid() {
        let (ctx, mut alg) = setup();
        let lhs = Spectrum::histogram(vec![0.0, 1e-6, 1e10], vec![1.0; 2], vec![1.0; 2]).unwrap();
        let rhs = Spectrum::histogram(vec![1.0, 2.0, 1e10], vec![1.0; 2], vec![1.0; 2]).unwrap();
        ctx.store().add("low_q", Workspace::new(vec![lhs]));
        ctx.store().add("high_q", Workspace::new(vec![rhs]));

        let err = alg.execute(&ctx).unwrap_err();
        assert!(matches!(&err, AlgorithmError::Invalid(r) if r.contains("Params")), "{err}");
        assert!(!ctx.store().contains("stitched"));
    }
}
