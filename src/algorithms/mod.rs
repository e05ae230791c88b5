//! The built-in algorithms.
//!
//! Simple algorithms run a single step. [`RebinRagged`] and [`Stitch`] run other
//! registered algorithms as child steps, so they need a registry that also holds
//! `ExtractSpectrum`, `Rebin` and `Scale`.

mod ascii_io;
mod create_workspace;
mod crystal_structures;
mod extract_spectrum;
mod integration;
mod rebin;
mod rebin_ragged;
mod scale;
mod stitch;
mod user_file_dependencies;

pub use ascii_io::{LoadAscii, SaveAscii};
pub use create_workspace::CreateWorkspace;
pub use crystal_structures::LoadCrystalStructures;
pub use extract_spectrum::ExtractSpectrum;
pub use integration::Integration;
pub use rebin::Rebin;
pub use rebin_ragged::RebinRagged;
pub use scale::Scale;
pub use stitch::Stitch;
pub use user_file_dependencies::ExtractUserFileDependencies;

use uuid::Uuid;

use crate::core::error::{RegistryError, StepError};
use crate::core::property::{PropertyDescriptor, PropertyValue, Validator, ValueType};
use crate::core::registry::AlgorithmRegistry;
use crate::core::sync_impl::{StepArgs, StepContext};
use crate::workspace::{self, Workspace};

pub fn register_builtins(registry: &mut AlgorithmRegistry) -> Result<(), RegistryError> {
    registry.register(|| CreateWorkspace)?;
    registry.register(|| LoadAscii)?;
    registry.register(|| SaveAscii)?;
    registry.register(|| ExtractSpectrum)?;
    registry.register(|| Rebin)?;
    registry.register(|| Scale)?;
    registry.register(|| Integration)?;
    registry.register(|| RebinRagged)?;
    registry.register(|| Stitch)?;
    registry.register(|| LoadCrystalStructures)?;
    registry.register(|| ExtractUserFileDependencies)?;
    Ok(())
}

pub(crate) fn input_workspace(name: &str) -> PropertyDescriptor {
    PropertyDescriptor::input(name, ValueType::Workspace).validator(Validator::NonEmpty)
}

pub(crate) fn output_workspace() -> PropertyDescriptor {
    PropertyDescriptor::output("OutputWorkspace", ValueType::Workspace)
        .validator(Validator::NonEmpty)
        .doc("Name of the workspace to create")
}

/// `x1, dx1, x2[, dx2, x3 ...]` that [`workspace::rebin_params`] turns into edges.
pub(crate) fn rebin_params_validator() -> Validator {
    Validator::All(vec![
        Validator::ArrayLength { min: 3, max: None },
        Validator::finite_elements(),
        Validator::custom("rebin params", |value| {
            let params = value.as_f64_array().unwrap_or_default();
            if params.len() % 2 == 0 {
                return Err("expected an odd number of values".to_string());
            }
            workspace::rebin_params(params).map(|_| ()).map_err(|e| e.to_string())
        }),
    ])
}

/// Stores `workspace` under the `OutputWorkspace` argument and returns the reference.
pub(crate) fn store_output(
    args: &StepArgs,
    ctx: &StepContext<'_>,
    workspace: Workspace,
) -> Result<PropertyValue, StepError> {
    let name = args.workspace_name("OutputWorkspace")?;
    ctx.store().add(name, workspace);
    Ok(PropertyValue::Workspace(name.to_string()))
}

/// A workspace name no user workspace will collide with.
pub(crate) fn scratch_name(owner: &str, label: &str) -> PropertyValue {
    PropertyValue::Workspace(format!("__{owner}_{label}_{}", Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_register_once() {
        let mut registry = AlgorithmRegistry::new();
        register_builtins(&mut registry).unwrap();
        assert_eq!(registry.len(), 11);
        assert!(registry.contains("RebinRagged"));
        assert!(matches!(
            register_builtins(&mut registry),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_rebin_params_validator() {
        let validator = rebin_params_validator();
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, 1.0, 10.0])).is_ok());
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, 1.0])).is_err());
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, 1.0, 5.0, 2.0])).is_err());
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, 0.0, 5.0])).is_err());
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, f64::NAN, 5.0])).is_err());
        assert!(validator.check(&PropertyValue::FloatArray(vec![0.0, 1.0, f64::INFINITY])).is_err());
        assert!(validator.check(&PropertyValue::FloatArray(vec![1e17, 1.0, 1e17 + 1024.0])).is_err());
    }
}
