//! A small reflectometry-style reduction run end to end.
//!
//! This example demonstrates:
//! - Creating workspaces from plain arrays
//! - Rebinning every spectrum with its own width (RebinRagged)
//! - Stitching two ranges together and reading back the scale factor
//! - Watching progress and collecting validation errors
//!
//! Run with `cargo run --example stitch_reduction`.

use cadmium::prelude::*;
use cadmium::MemoryProgress;
use std::sync::Arc;

// ============================================================================
// Step 1: Two overlapping measurements
// ============================================================================

/// A flat histogram over `[start, end)` with unit-width bins.
fn measurement(
    ctx: &ExecutionContext,
    name: &str,
    start: i32,
    end: i32,
    counts: f64,
) -> Result<(), AlgorithmError> {
    let edges: Vec<f64> = (start..=end).map(f64::from).collect();
    let bins = edges.len() - 1;

    let mut create = ctx.registry().create("CreateWorkspace", None)?;
    create.set_property("DataX", edges)?;
    create.set_property("DataY", vec![counts; 2 * bins])?;
    create.set_property("NSpec", 2_i64)?;
    create.set_property("UnitX", "Wavelength")?;
    create.set_property("OutputWorkspace", PropertyValue::Workspace(name.into()))?;
    create.execute(ctx)
}

fn main() -> Result<(), AlgorithmError> {
    let registry = Arc::new(AlgorithmRegistry::with_builtins()?);
    let progress = Arc::new(MemoryProgress::new());
    let ctx = ExecutionContext::new(Arc::clone(&registry)).with_progress(progress.clone());

    measurement(&ctx, "short", 1, 9, 10.0)?;
    measurement(&ctx, "long", 6, 16, 4.0)?;
    println!("[Setup] Workspaces: {:?}", ctx.store().names());

    // ========================================================================
    // Step 2: A mistake is reported per property, all at once
    // ========================================================================

    let mut ragged = registry.create("RebinRagged", None)?;
    ragged.set_property("InputWorkspace", PropertyValue::Workspace("short".into()))?;
    ragged.set_property("XMax", vec![8.0])?;
    ragged.set_property("Delta", vec![1.0, 2.0, 0.5])?;

    let problems = ragged.validate(&ctx);
    println!("[Validate] {} problem(s):", problems.len());
    for (property, message) in problems.iter() {
        println!("  {property}: {message}");
    }

    // ========================================================================
    // Step 3: Fix the inputs and run
    // ========================================================================

    ragged.set_property("Delta", vec![1.0, 2.0])?;
    ragged.set_property("OutputWorkspace", PropertyValue::Workspace("short_ragged".into()))?;
    ragged.execute(&ctx)?;

    let rebinned = ctx.store().get("short_ragged")?;
    for (i, spectrum) in rebinned.spectra().iter().enumerate() {
        println!("[RebinRagged] spectrum {i}: {} bins", spectrum.len());
    }

    // ========================================================================
    // Step 4: Stitch the two ranges
    // ========================================================================

    let mut stitch = registry.create("Stitch", None)?;
    stitch.set_property("LHSWorkspace", PropertyValue::Workspace("short".into()))?;
    stitch.set_property("RHSWorkspace", PropertyValue::Workspace("long".into()))?;
    stitch.set_property("OutputWorkspace", PropertyValue::Workspace("stitched".into()))?;
    stitch.execute(&ctx)?;

    println!("[Stitch] scale factor = {}", stitch.property("OutScaleFactor")?);
    let stitched = ctx.store().get("stitched")?;
    println!(
        "[Stitch] {} spectra over {:?}",
        stitched.spectrum_count(),
        stitched.x_range(0)?
    );

    println!("\nProgress events:");
    for event in progress.events() {
        println!("  {} {}/{}: {}", event.source, event.current, event.total, event.message);
    }
    println!("Workspaces: {:?}", ctx.store().names());
    Ok(())
}
