use crate::core::algorithm::Algorithm;
use crate::core::context::ExecutionContext;
use crate::core::error::{AlgorithmError, SchemaError, StepError};
use crate::core::property::{PropertyDescriptor, PropertySchema, PropertyValue, Validator, ValueType};
use crate::core::sync_impl::{ChildPipelineRunner, PipelineStep};
use crate::parsers::crystal::{self, CrystalFileError};

/// Reads a POLDI crystal structure file and reports the compounds it defines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadCrystalStructures;

impl Algorithm for LoadCrystalStructures {
    fn name(&self) -> &str {
        "LoadCrystalStructures"
    }

    fn category(&self) -> &str {
        "SINQ\\Poldi"
    }

    fn summary(&self) -> &str {
        "Reads compounds from a POLDI crystal structure file"
    }

    fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
        schema.declare(PropertyDescriptor::input("Filename", ValueType::String).validator(Validator::NonEmpty))?;
        schema.declare(PropertyDescriptor::output("CompoundNames", ValueType::StringArray))?;
        schema.declare(PropertyDescriptor::output("CompoundCount", ValueType::Integer))
    }

    fn build_pipeline(
        &self,
        _properties: &PropertySchema,
        pipeline: &mut ChildPipelineRunner,
        _ctx: &ExecutionContext,
    ) -> Result<(), AlgorithmError> {
        pipeline
            .add_step(
                PipelineStep::from_fn("Parse", |args, ctx| {
                    let path = ctx.config().resolve_file(args.str("Filename")?)?;
                    let compounds = crystal::read_file(&path).map_err(|e| match e {
                        CrystalFileError::File(e) => StepError::File(e),
                        other => StepError::Domain(Box::new(other)),
                    })?;
                    for compound in &compounds {
                        log::debug!(
                            "{}: {} ({}, {} atoms)",
                            ctx.owner(),
                            compound.name,
                            compound.space_group,
                            compound.atoms.len()
                        );
                    }
                    Ok(PropertyValue::StringArray(
                        compounds.into_iter().map(|c| c.name).collect(),
                    ))
                })
                .input("Filename")
                .output("CompoundNames"),
            )?
            .add_step(
                PipelineStep::from_fn("Count", |args, _| {
                    let names = args
                        .require("Names")?
                        .as_string_array()
                        .ok_or_else(|| StepError::WrongArgumentType {
                            name: "Names".to_string(),
                            expected: "a string array",
                        })?;
                    Ok(PropertyValue::Integer(names.len() as i64))
                })
                .from_step("Names", "CompoundNames")
                .output("CompoundCount"),
            )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::core::algorithm::AlgorithmInstance;
    use crate::core::error::{FileError, PipelineError};
    use std::fs;
    use std::sync::Arc;

    const TWO_COMPOUNDS: &str = "\
# Reference samples
Silicon {
    Lattice: 5.43
    Spacegroup: F d -3 m
    Atoms: {
        Si 0.0 0.0 0.0 1.0 0.05
    }
}
Iron {
    Lattice: 2.8665
    Spacegroup: I m -3 m
    Atoms: {
        Fe 0.0 0.0 0.0
    }
}
";

    fn load(dir: &tempfile::TempDir, name: &str) -> (AlgorithmInstance, Result<(), AlgorithmError>) {
        let ctx = ExecutionContext::default()
            .with_config(ExecutionConfig::default().with_search_directory(dir.path()));
        let mut alg = AlgorithmInstance::new(Arc::new(LoadCrystalStructures)).unwrap();
        alg.set_property("Filename", name).unwrap();
        let outcome = alg.execute(&ctx);
        (alg, outcome)
    }

    #[test]
    fn test_lists_compounds_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("samples.dat"), TWO_COMPOUNDS).unwrap();

        let (alg, outcome) = load(&dir, "samples.dat");
        outcome.unwrap();
        assert_eq!(
            alg.property("CompoundNames").unwrap(),
            &PropertyValue::StringArray(vec!["Silicon".into(), "Iron".into()])
        );
        assert_eq!(alg.property("CompoundCount").unwrap(), &PropertyValue::Integer(2));
    }

    #[test]
    fn test_missing_and_malformed_files_differ() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.dat"), "Silicon {\n    Lattice: 1 2\n}\n").unwrap();

        let (_, missing) = load(&dir, "absent.dat");
        assert!(matches!(
            missing,
            Err(AlgorithmError::Pipeline(PipelineError::StepFailed {
                cause: StepError::File(FileError::NotFound { .. }),
                ..
            }))
        ));

        let (_, malformed) = load(&dir, "broken.dat");
        match malformed {
            Err(AlgorithmError::Pipeline(PipelineError::StepFailed {
                cause: StepError::Domain(e),
                ..
            })) => assert!(e.to_string().contains("line 2")),
            other => panic!("expected a content error, got {other:?}"),
        }
    }
}
