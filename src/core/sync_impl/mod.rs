//! Synchronous pipeline execution.
//!
//! This module contains the types an algorithm uses to describe and run its
//! child steps:
//! - [`PipelineStep`] and [`StepLogic`] for defining individual steps
//! - [`Binding`] for wiring step arguments to properties, literals or earlier steps
//! - [`ChildPipelineRunner`] for running the steps in order, once

pub mod pipeline;
pub mod step;

pub use pipeline::{ChildPipelineRunner, PipelineState};
pub use step::{Binding, PipelineStep, StepArgs, StepContext, StepLogic};
