use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, PropertyValue, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::parsers::user_file::{self, UserFileError};

/// Lists the files a SANS user file refers to.
///
/// With `Resolve` set, every entry is located through the search directories and
/// the full paths are returned instead; the first file that cannot be found fails
/// the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractUserFileDependencies;

fn step_error(e: UserFileError) -> StepError {
    match e {
        UserFileError::File(e) => StepError::File(e),
        other => StepError::Domain(Box::new(other)),
    }
}

impl Algorithm for ExtractUserFileDependencies {
    fn name(&self) -> &str {
        "ExtractUserFileDependencies"
    }

    fn category(&self) -> &str {
        "SANS"
    }

    fn summary(&self) -> &str {
        "Lists the mask, calibration and monitor files a user file depends on"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(PropertyDescriptor::input("Filename", ValueType::String).validator(Validator::NonEmpty))?;
        schema.declare(
            PropertyDescriptor::input("Resolve", ValueType::Boolean)
                .default(false)
                .doc("Return full paths found through the search directories"),
        )?;
        schema.declare(PropertyDescriptor::output("Dependencies", ValueType::StringArray))
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        let step = PipelineStep::from_fn("Extract", |args, ctx| {
            let path = ctx.config().resolve_file(args.str("Filename")?)?;
            let dependencies = user_file::extract_file(&path).map_err(step_error)?;
            log::debug!("{}: {} dependencies in {}", ctx.owner(), dependencies.len(), path.display());

            let files = if args.bool("Resolve")? {
                user_file::resolve(&dependencies, ctx.config())
                    .map_err(step_error)?
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect()
            } else {
                dependencies.into_iter().map(|d| d.file).collect()
            };
            Ok(PropertyValue::StringArray(files))
        })
        .input("Filename")
        .input("Resolve")
        .output("Dependencies");

        pipeline.add_step(step)?;
        Ok(())
    }
}
