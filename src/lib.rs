//! # Cadmium
//!
//! A validated, composable framework for writing neutron and muon data-reduction
//! algorithms in Rust.
//!
//! ## Features
//!
//! - **Typed Property Contracts**: Every algorithm declares its inputs and outputs up front
//! - **Batch Validation**: Every cross-property problem is reported at once, keyed by property
//! - **Child Pipelines**: Algorithms compose other registered algorithms as ordered steps
//! - **Explicit Context**: Configuration, workspaces and the registry travel with each run, never as globals
//! - **Background Execution**: Run whole algorithms on tokio's blocking pool and stream their progress
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cadmium::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(AlgorithmRegistry::with_builtins().unwrap());
//! let ctx = ExecutionContext::new(Arc::clone(&registry));
//!
//! let mut create = registry.create("CreateWorkspace", None).unwrap();
//! create.set_property("DataX", vec![0.0, 1.0, 2.0]).unwrap();
//! create.set_property("DataY", vec![5.0, 7.0]).unwrap();
//! create.set_property("OutputWorkspace", PropertyValue::Workspace("ws".into())).unwrap();
//! create.execute(&ctx).unwrap();
//!
//! assert_eq!(ctx.store().get("ws").unwrap().spectrum_count(), 1);
//! ```
//!
//! ## Module Organization
//!
//! - [`algorithms`]: The built-in algorithms
//! - [`workspace`]: Spectra, workspaces and the per-run workspace store
//! - [`parsers`]: Text formats (tabulated data, crystal structures, user files)
//! - [`config`]: Per-run configuration
//! - [`prelude`]: Commonly used types and traits (import with `use cadmium::prelude::*`)
//! - [`sync_prelude`]: Only the synchronous execution types
//! - [`async_prelude`]: Only the background execution types

// ============================================================================
// Core Module
// ============================================================================

mod core;

pub mod algorithms;
pub mod config;
pub mod parsers;
pub mod workspace;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Algorithms and their execution
pub use core::algorithm::{Algorithm, AlgorithmInstance, ChildAlgorithmStep};
pub use core::context::{ExecutionContext, ExecutionStatus, HistoryEntry};
pub use core::registry::{AlgorithmDescription, AlgorithmRegistry};

// Properties
pub use core::property::{Direction, PropertyDescriptor, PropertySchema, PropertyValue, Validator, ValueType};

// Validation
pub use core::broadcast::{broadcast, broadcast_with, classify, Broadcast, LengthMismatch};
pub use core::validation::{
    CustomRule, InputValidator, Ordered, Paired, PerSpectrum, Rule, SpectrumCount, ValidationResult,
};

// Pipelines
pub use core::binder::OutputBinder;
pub use core::sync_impl::{
    Binding, ChildPipelineRunner, PipelineState, PipelineStep, StepArgs, StepContext, StepLogic,
};

// Progress
pub use core::progress::{
    FanOut, LogProgress, MemoryProgress, ProgressEvent, ProgressPhase, ProgressReporter, ProgressSink,
};

// Background execution
pub use core::async_impl::{execute_batch, execute_in_background, progress_channel, ChannelProgress};

// Errors
pub use core::error::{
    AlgorithmError, BindError, ConfigError, FileError, PipelineError, ProgressError, RegistryError,
    SchemaError, StepError,
};

pub use config::ExecutionConfig;
pub use workspace::{Spectrum, Workspace, WorkspaceError, WorkspaceStore};

// ============================================================================
// Prelude Modules - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything you need to declare, compose and run algorithms.
///
/// # Example
/// ```rust
/// use cadmium::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Background
        execute_in_background,
        progress_channel,
        // Core
        Algorithm,
        AlgorithmError,
        AlgorithmInstance,
        AlgorithmRegistry,
        Binding,
        ChildAlgorithmStep,
        ChildPipelineRunner,
        ExecutionConfig,
        ExecutionContext,
        InputValidator,
        PipelineStep,
        PropertyDescriptor,
        PropertySchema,
        PropertyValue,
        SchemaError,
        SpectrumCount,
        StepArgs,
        StepContext,
        StepError,
        StepLogic,
        Validator,
        ValueType,
        // Data
        Spectrum,
        Workspace,
        WorkspaceStore,
    };
}

/// Prelude for hosts that run algorithms on the calling thread only.
///
/// # Example
/// ```rust
/// use cadmium::sync_prelude::*;
/// ```
pub mod sync_prelude {
    pub use super::{
        Algorithm, AlgorithmError, AlgorithmInstance, AlgorithmRegistry, ChildPipelineRunner, ExecutionContext,
        InputValidator, MemoryProgress, PipelineStep, PropertySchema, PropertyValue, Workspace,
    };
}

/// Prelude for hosts that run algorithms in the background.
///
/// # Example
/// ```rust
/// use cadmium::async_prelude::*;
/// ```
pub mod async_prelude {
    pub use super::{
        execute_batch, execute_in_background, progress_channel, AlgorithmError, AlgorithmInstance,
        ChannelProgress, ExecutionContext, ProgressEvent,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
