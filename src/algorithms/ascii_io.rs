use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError};
use crate::core::property::{PropertyDescriptor, PropertySchema, PropertyValue, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::parsers::ascii;

use super::{input_workspace, output_workspace, store_output};

fn text_file() -> Validator {
    Validator::All(vec![
        Validator::NonEmpty,
        Validator::FileExtension(vec![".txt".into(), ".dat".into(), ".csv".into()]),
    ])
}

/// Loads a workspace from a text file found through the search directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadAscii;

impl Algorithm for LoadAscii {
    fn name(&self) -> &str {
        "LoadAscii"
    }

    fn category(&self) -> &str {
        "DataHandling"
    }

    fn summary(&self) -> &str {
        "Loads a workspace from columns of X, Y and E values"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(PropertyDescriptor::input("Filename", ValueType::String).validator(text_file()))?;
        schema.declare(output_workspace())
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Load", |args, ctx| {
            let path = ctx.config().resolve_file(args.str("Filename")?)?;
            log::debug!("{}: reading {}", ctx.owner(), path.display());
            let workspace = ascii::read_workspace(&path)?;
            store_output(args, ctx, workspace)
        })
        .input("Filename")
        .input("OutputWorkspace")
        .output("OutputWorkspace");

        pipeline.add_step(step)?;
        Ok(())
    }
}

/// Writes a workspace to a text file that [`LoadAscii`] reads back.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaveAscii;

impl Algorithm for SaveAscii {
    fn name(&self) -> &str {
        "SaveAscii"
    }

    fn category(&self) -> &str {
        "DataHandling"
    }

    fn summary(&self) -> &str {
        "Saves a workspace as columns of X, Y and E values"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(input_workspace("InputWorkspace"))?;
        schema.declare(PropertyDescriptor::input("Filename", ValueType::String).validator(text_file()))?;
        schema.declare(
            PropertyDescriptor::input("Precision", ValueType::Integer)
                .default(6_i64)
                .validator(Validator::bounded(Some(0.0), Some(17.0)))
                .doc("Decimal places written"),
        )
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        // The file is the only product; the step result is discarded
        let step = PipelineStep::from_fn("Save", |args, ctx| {
            let workspace = args.workspace("InputWorkspace", ctx)?;
            let filename = args.str("Filename")?;
            ascii::write_workspace(&workspace, filename, args.i64("Precision")? as usize)?;
            Ok(PropertyValue::String(filename.to_string()))
        })
        .input("InputWorkspace")
        .input("Filename")
        .input("Precision")
        .intermediate();

        pipeline.add_step(step)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::core::algorithm::AlgorithmInstance;
    use crate::core::error::{FileError, StepError};
    use crate::workspace::{Spectrum, Workspace};
    use std::sync::Arc;

    #[test]
    fn test_save_then_load_through_search_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::default()
            .with_config(ExecutionConfig::default().with_search_directory(dir.path()));
        let spectrum = Spectrum::histogram(vec![1.0, 2.0, 4.0], vec![5.0, 7.0], vec![0.5, 0.7]).unwrap();
        ctx.store().add("original", Workspace::new(vec![spectrum]).with_unit("TOF"));

        let mut save = AlgorithmInstance::new(Arc::new(SaveAscii)).unwrap();
        save.set_property("InputWorkspace", PropertyValue::Workspace("original".into()))
            .unwrap();
        save.set_property("Filename", dir.path().join("saved.txt").to_string_lossy().as_ref())
            .unwrap();
        save.execute(&ctx).unwrap();

        let mut load = AlgorithmInstance::new(Arc::new(LoadAscii)).unwrap();
        load.set_property("Filename", "saved.txt").unwrap();
        load.set_property("OutputWorkspace", PropertyValue::Workspace("loaded".into()))
            .unwrap();
        load.execute(&ctx).unwrap();

        assert_eq!(ctx.store().get("loaded").unwrap(), ctx.store().get("original").unwrap());
    }

    #[test]
    fn test_wrong_extension_is_rejected_on_set() {
        let mut load = AlgorithmInstance::new(Arc::new(LoadAscii)).unwrap();
        assert!(matches!(
            load.set_property("Filename", "run.nxs"),
            Err(SchemaError::Validator { .. })
        ));
    }

    #[test]
    fn test_missing_file_fails_the_step() {
        let ctx = ExecutionContext::default();
        let mut load = AlgorithmInstance::new(Arc::new(LoadAscii)).unwrap();
        load.set_property("Filename", "does_not_exist.txt").unwrap();
        load.set_property("OutputWorkspace", PropertyValue::Workspace("ws".into()))
            .unwrap();

        let err = load.execute(&ctx).unwrap_err();
        match err {
            AlgorithmError::Pipeline(e) => assert!(matches!(
                e,
                crate::core::error::PipelineError::StepFailed {
                    cause: StepError::File(FileError::NotFound { .. }),
                    ..
                }
            )),
            other => panic!("expected a step failure, got {other:?}"),
        }
        assert!(!ctx.store().contains("ws"));
    }
}
