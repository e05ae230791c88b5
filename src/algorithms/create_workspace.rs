use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::core::validation::InputValidator;
use crate::workspace::{Spectrum, Workspace};

use super::{output_workspace, store_output};

/// Builds a workspace from flat X, Y and E arrays.
///
/// `DataY` is split into `NSpec` equal spectra. `DataX` is either shared by every
/// spectrum or given per spectrum, as points or bin edges. Empty `DataE` means
/// Poisson errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreateWorkspace;

/// Per-spectrum x length, given the total x and y lengths.
fn x_layout(x_len: usize, y_len: usize, n_spec: usize) -> Option<(usize, bool)> {
    if n_spec == 0 || y_len % n_spec != 0 {
        return None;
    }
    let per_y = y_len / n_spec;
    match x_len {
        l if l == per_y || l == per_y + 1 => Some((l, true)),
        l if l == y_len || l == y_len + n_spec => Some((l / n_spec, false)),
        _ => None,
    }
}

impl Algorithm for CreateWorkspace {
    fn name(&self) -> &str {
        "CreateWorkspace"
    }

    fn category(&self) -> &str {
        "Utility"
    }

    fn summary(&self) -> &str {
        "Creates a workspace from arrays of X, Y and E values"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(
            PropertyDescriptor::input("DataX", ValueType::FloatArray)
                .validator(Validator::NonEmpty)
                .doc("X values, shared or for every spectrum in turn"),
        )?;
        schema.declare(
            PropertyDescriptor::input("DataY", ValueType::FloatArray)
                .validator(Validator::NonEmpty)
                .doc("Counts for every spectrum in turn"),
        )?;
        schema.declare(
            PropertyDescriptor::input("DataE", ValueType::FloatArray)
                .default(Vec::<f64>::new())
                .doc("Errors; square roots of the counts when empty"),
        )?;
        schema.declare(
            PropertyDescriptor::input("NSpec", ValueType::Integer)
                .default(1_i64)
                .validator(Validator::bounded(Some(1.0), None)),
        )?;
        schema.declare(PropertyDescriptor::input("UnitX", ValueType::String).default(""))?;
        schema.declare(output_workspace())
    }

    fn validate_inputs(&self, validator: &mut InputValidator, _ctx: &ExecutionContext) {
        validator
            .custom("data shape", |schema| {
                let n_spec = schema.get_i64("NSpec").ok()? as usize;
                let x_len = schema.try_get("DataX").ok()??.array_len()?;
                let y_len = schema.try_get("DataY").ok()??.array_len()?;
                if y_len % n_spec != 0 {
                    return Some((
                        "DataY".into(),
                        format!("{y_len} values cannot be split into {n_spec} spectra"),
                    ));
                }
                match x_layout(x_len, y_len, n_spec) {
                    Some(_) => None,
                    None => Some((
                        "DataX".into(),
                        format!("{x_len} values do not fit {n_spec} spectra of {} counts", y_len / n_spec),
                    )),
                }
            })
            .custom("error length", |schema| {
                let e_len = schema.get_f64_array("DataE").ok()?.len();
                let y_len = schema.try_get("DataY").ok()??.array_len()?;
                (e_len != 0 && e_len != y_len).then(|| {
                    (
                        "DataE".to_string(),
                        format!("expected {y_len} errors, got {e_len}"),
                    )
                })
            });
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Create", |args, ctx| {
            let x = args.f64_array("DataX")?;
            let y = args.f64_array("DataY")?;
            let e = args.f64_array("DataE")?;
            let n_spec = args.i64("NSpec")? as usize;

            let (per_x, shared) = x_layout(x.len(), y.len(), n_spec)
                .ok_or_else(|| StepError::Failed("inconsistent DataX/DataY lengths".to_string()))?;
            let per_y = y.len() / n_spec;

            let spectra = (0..n_spec)
                .map(|i| {
                    let xs = if shared { x.to_vec() } else { x[i * per_x..(i + 1) * per_x].to_vec() };
                    let ys = y[i * per_y..(i + 1) * per_y].to_vec();
                    let es = if e.is_empty() {
                        ys.iter().map(|v| v.abs().sqrt()).collect()
                    } else {
                        e[i * per_y..(i + 1) * per_y].to_vec()
                    };
                    Spectrum::new(xs, ys, es)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let workspace = Workspace::new(spectra).with_unit(args.str("UnitX")?);
            store_output(args, ctx, workspace)
        })
        .input("DataX")
        .input("DataY")
        .input("DataE")
        .input("NSpec")
        .input("UnitX")
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
    use std::sync::Arc;

    #[test]
    fn test_x_layout() {
        assert_eq!(x_layout(3, 4, 2), Some((3, true)));
        assert_eq!(x_layout(2, 4, 2), Some((2, true)));
        assert_eq!(x_layout(4, 4, 2), Some((2, false)));
        assert_eq!(x_layout(6, 4, 2), Some((3, false)));
        assert_eq!(x_layout(5, 4, 2), None);
        assert_eq!(x_layout(3, 3, 2), None);
    }

    #[test]
    fn test_create_two_histograms() {
        let ctx = ExecutionContext::default();
        let mut alg = AlgorithmInstance::new(Arc::new(CreateWorkspace)).unwrap();
        alg.set_property("DataX", vec![0.0, 1.0, 2.0]).unwrap();
        alg.set_property("DataY", vec![1.0, 4.0, 9.0, 16.0]).unwrap();
        alg.set_property("NSpec", 2_i64).unwrap();
        alg.set_property("UnitX", "TOF").unwrap();
        alg.set_property("OutputWorkspace", crate::core::property::PropertyValue::Workspace("ws".into()))
            .unwrap();
        alg.execute(&ctx).unwrap();

        let ws = ctx.store().get("ws").unwrap();
        assert_eq!(ws.spectrum_count(), 2);
        assert_eq!(ws.unit(), "TOF");
        assert_eq!(ws.spectrum(1).unwrap().e(), &[3.0, 4.0]);
    }

    #[test]
    fn test_shape_problems_are_reported_per_field() {
        let ctx = ExecutionContext::default();
        let mut alg = AlgorithmInstance::new(Arc::new(CreateWorkspace)).unwrap();
        alg.set_property("DataX", vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        alg.set_property("DataY", vec![1.0, 4.0, 9.0, 16.0]).unwrap();
        alg.set_property("DataE", vec![1.0]).unwrap();
        alg.set_property("NSpec", 2_i64).unwrap();

        let result = alg.validate(&ctx);
        assert!(result.contains("DataX"));
        assert!(result.contains("DataE"));
        assert!(result.contains("OutputWorkspace"));
    }
}
