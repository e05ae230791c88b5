//! Command line host for the built-in reduction algorithms
//!
//! Lists and describes the registered algorithms, runs a single algorithm with
//! properties given on the command line, or runs a JSON reduction plan in one
//! shared workspace store.
//!
//! # Usage
//!
//! ```text
//! Usage: cadmium <command> [options]
//! ```
//!
//! ## Commands
//!
//! ```bash
//! # Every registered algorithm, by name
//! cadmium list
//!
//! # The properties of one algorithm
//! cadmium describe RebinRagged
//!
//! # Run one algorithm; arrays are comma separated
//! cadmium run LoadAscii -p Filename=run.txt -p OutputWorkspace=ws
//!
//! # Run every step of a plan in order
//! cadmium script plan.json --config config.json
//! ```
//!
//! A plan is a JSON list of steps, each naming an algorithm and its properties:
//!
//! ```json
//! [
//!   { "algorithm": "LoadAscii", "properties": { "Filename": "run.txt", "OutputWorkspace": "run" } },
//!   { "algorithm": "Rebin", "version": 1, "properties": { "InputWorkspace": "run", "Params": [0, 0.1, 5], "OutputWorkspace": "rebinned" } }
//! ]
//! ```

// standard libraries
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// crate modules
use cadmium::{AlgorithmError, AlgorithmInstance, AlgorithmRegistry, Direction, ExecutionConfig, ExecutionContext, ValueType};

// external crates
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::*;
use serde::Deserialize;

#[doc(hidden)]
fn main() -> Result<()> {
    // set up the command line interface and match arguments
    let cli: Cli = Cli::parse();

    // set up logging (+2 to make 'Info' the default)
    let verbosity = cli.verbose as usize + 2;
    logging_init(verbosity, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            debug!("Reading configuration from {}", path.display());
            ExecutionConfig::from_json_file(path)?
        }
        None => ExecutionConfig::default(),
    };
    config.validate()?;

    let registry = Arc::new(AlgorithmRegistry::with_builtins()?);
    let ctx = ExecutionContext::new(Arc::clone(&registry)).with_config(config);

    match cli.command {
        Command::List => list(&registry),
        Command::Describe { name, version } => describe(&registry, &name, version),
        Command::Run {
            name,
            version,
            properties,
        } => {
            let mut alg = registry.create(&name, version)?;
            for assignment in &properties {
                let (key, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Expected Key=Value, got \"{assignment}\""))?;
                alg.set_property_str(key.trim(), value)?;
            }
            execute(&mut alg, &ctx)?;
            print_outputs(&alg);
            Ok(())
        }
        Command::Script { plan } => script(&plan, &registry, &ctx),
    }
}

/// Run and inspect data-reduction algorithms
///
/// Examples
/// --------
///
///  List the available algorithms
///     $ cadmium list
///
///  Run one algorithm
///     $ cadmium run Rebin -p InputWorkspace=ws -p Params=0,1,10 -p OutputWorkspace=out
///
///  Run a reduction plan with extra search directories
///     $ cadmium script plan.json --config config.json
///
#[doc(hidden)]
#[derive(Parser)]
#[command(
    verbatim_doc_comment,
    arg_required_else_help(true),
    before_help(banner()),
    after_help("Typical use: cadmium script plan.json\n\nNOTE: --help shows more detail and examples"),
    term_width(70),
    hide_possible_values(true),
    override_usage("cadmium <command> [options]")
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Execution configuration file (JSON)
    ///
    /// Sets the search directories, the history log and cleanup behaviour.
    /// Defaults are used for anything the file leaves out.
    #[arg(short, long, global = true)]
    #[arg(value_name = "path")]
    config: Option<PathBuf>,

    // * Flags
    /// Verbose logging (-v, -vv)
    ///
    /// If specified, the default log level of INFO is increased to DEBUG (-v)
    /// or TRACE (-vv). Errors and Warnings are always logged unless in quiet
    /// (-q) mode.
    #[arg(short, long, global = true)]
    #[arg(action = clap::ArgAction::Count)]
    verbose: u8,

    /// Supress all log output (overrules --verbose)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[doc(hidden)]
#[derive(Subcommand)]
enum Command {
    /// List every registered algorithm
    List,

    /// Show the properties of an algorithm
    Describe {
        /// Algorithm name
        name: String,

        /// Specific version (latest by default)
        #[arg(long)]
        version: Option<u32>,
    },

    /// Execute one algorithm
    Run {
        /// Algorithm name
        name: String,

        /// Specific version (latest by default)
        #[arg(long)]
        version: Option<u32>,

        /// Property assignment as Key=Value, repeatable
        #[arg(short = 'p', long = "property")]
        #[arg(value_name = "Key=Value")]
        properties: Vec<String>,
    },

    /// Execute a JSON reduction plan
    Script {
        /// Path to the plan file
        plan: PathBuf,
    },
}

/// One entry of a reduction plan
#[doc(hidden)]
#[derive(Debug, Deserialize)]
struct PlanStep {
    algorithm: String,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

/// Sets up logging at runtime to allow for multiple verbosity levels
#[doc(hidden)]
fn logging_init(verbosity: usize, quiet: bool) {
    let result = stderrlog::new()
        .modules(vec![module_path!()])
        .quiet(quiet)
        .verbosity(verbosity)
        .show_level(false)
        .color(stderrlog::ColorChoice::Never)
        .timestamp(stderrlog::Timestamp::Off)
        .init();
    if let Err(e) = result {
        eprintln!("Logging unavailable: {e}");
    }
}

/// Creates a banner for the command line
#[doc(hidden)]
fn banner() -> String {
    let mut s = format!("{:-<1$}\n", "", 70);
    s += &format!("{:^70}\n", "Cadmium :: Reduction Host");
    s += &format!("{:-<1$}", "", 70);
    s
}

#[doc(hidden)]
fn list(registry: &AlgorithmRegistry) -> Result<()> {
    for description in registry.list() {
        println!(
            "{:<30} v{:<3} {:<16} {}",
            description.name, description.version, description.category, description.summary
        );
    }
    Ok(())
}

#[doc(hidden)]
fn describe(registry: &AlgorithmRegistry, name: &str, version: Option<u32>) -> Result<()> {
    let description = registry.describe(name, version)?;
    println!("{} v{} ({})", description.name, description.version, description.category);
    if !description.summary.is_empty() {
        println!("  {}", description.summary);
    }
    for property in &description.properties {
        let default = match &property.default {
            Some(value) => format!(" = {value}"),
            None if property.is_mandatory() => " (mandatory)".to_string(),
            None => String::new(),
        };
        println!(
            "  {:<7} {:<24} {}{default}",
            property.direction.to_string(),
            property.name,
            property.value_type
        );
        if !property.doc.is_empty() {
            println!("          {}", property.doc);
        }
    }
    Ok(())
}

/// Executes and reports validation failures one line per property
#[doc(hidden)]
fn execute(alg: &mut AlgorithmInstance, ctx: &ExecutionContext) -> Result<()> {
    match alg.execute(ctx) {
        Ok(()) => Ok(()),
        Err(AlgorithmError::Invalid(result)) => {
            for (field, message) in result.iter() {
                eprintln!("  {field}: {message}");
            }
            bail!("{} has {} invalid properties", alg.name(), result.len())
        }
        Err(e) => Err(e.into()),
    }
}

/// Prints every output that is not a workspace reference
#[doc(hidden)]
fn print_outputs(alg: &AlgorithmInstance) {
    for descriptor in alg.schema().descriptors() {
        if descriptor.direction == Direction::Input || descriptor.value_type == ValueType::Workspace {
            continue;
        }
        if let Ok(value) = alg.property(&descriptor.name) {
            println!("{} = {value}", descriptor.name);
        }
    }
}

#[doc(hidden)]
fn script(plan: &Path, registry: &AlgorithmRegistry, ctx: &ExecutionContext) -> Result<()> {
    let text = std::fs::read_to_string(plan).with_context(|| format!("Reading plan {}", plan.display()))?;
    let steps: Vec<PlanStep> =
        serde_json::from_str(&text).with_context(|| format!("Parsing plan {}", plan.display()))?;
    info!("Running {} steps from {}", steps.len(), plan.display());

    for (i, step) in steps.iter().enumerate() {
        debug!("  - step {i}: {}", step.algorithm);
        let mut alg = registry.create(&step.algorithm, step.version)?;
        for (key, json) in &step.properties {
            let value_type = alg.schema().descriptor(key)?.value_type.clone();
            let value = value_type
                .from_json(json)
                .map_err(|message| anyhow!("Step {i} ({}): {key}: {message}", step.algorithm))?;
            alg.set_property(key, value)?;
        }
        execute(&mut alg, ctx).with_context(|| format!("Step {i} ({})", step.algorithm))?;
        print_outputs(&alg);
    }

    info!("Workspaces: {}", ctx.store().names().join(", "));
    Ok(())
}
